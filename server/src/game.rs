//! Authoritative game context
//!
//! `Game` owns everything one hosted game consists of: the session lifecycle, the
//! worm registry, the bonus table, the per-connection state and the loaded assets.
//! It never talks to the network itself. Decisions are queued as [`Outgoing`]
//! packets which the scheduler encodes and hands to the transport after the frame.
//!
//! The per-tick rules live in [`crate::rules`].

use crate::bonus::BonusTable;
use crate::config::GameSettings;
use crate::connection::Connection;
use crate::map::CollisionGrid;
use crate::physics::step_body;
use crate::registry::{RegistryError, WormKind, WormProfile, WormRegistry};
use crate::rules::Outcome;
use crate::ruleset::{Ruleset, WeaponRestrictions};
use crate::transport::Destination;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ConnectionId, Packet, Session, SessionState, WormId, MAX_BONUSES};
use std::collections::BTreeMap;
use std::time::Duration;

/// A packet decided by the authority together with who receives it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub destination: Destination,
    pub packet: Packet,
}

/// Things the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    StateChanged(SessionState),
    WormJoined(WormId),
    WormLeft(WormId),
    WormSpawned(WormId),
    WormDown { worm_id: WormId, killer: WormId },
    PickupSpawned(u8),
    PickupRemoved(u8),
    Tagged(WormId),
    RoundOver(Outcome),
}

/// Teardown requested during rule evaluation, applied once the tick returned.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingReset {
    Lobby,
    Stop(String),
}

pub struct Game {
    pub(crate) settings: GameSettings,
    pub(crate) session: Session,
    pub(crate) registry: WormRegistry,
    pub(crate) bonuses: BonusTable,
    pub(crate) connections: BTreeMap<ConnectionId, Connection>,
    pub(crate) grid: Option<Box<dyn CollisionGrid + Send>>,
    pub(crate) ruleset: Option<Ruleset>,
    pub(crate) restrictions: WeaponRestrictions,
    pub(crate) rng: StdRng,

    /// Current game time, simulated while ticking and real otherwise
    pub(crate) now: Duration,
    pub(crate) server_frame: u32,
    pub(crate) game_over: bool,
    pub(crate) game_over_time: Option<Duration>,
    pub(crate) last_bonus_time: Duration,

    pub(crate) outbox: Vec<Outgoing>,
    pub(crate) events: Vec<GameEvent>,
    pub(crate) dropped: Vec<ConnectionId>,
    pub(crate) pending: Option<PendingReset>,
}

impl Game {
    /// Creates an idle game. The seed drives spawn spots, pickups and tag picks.
    pub fn new(settings: GameSettings, seed: u64) -> Self {
        Self {
            registry: WormRegistry::new(settings.dedicated),
            settings,
            session: Session::new(),
            bonuses: BonusTable::new(MAX_BONUSES),
            connections: BTreeMap::new(),
            grid: None,
            ruleset: None,
            restrictions: WeaponRestrictions::new(),
            rng: StdRng::seed_from_u64(seed),
            now: Duration::ZERO,
            server_frame: 0,
            game_over: false,
            game_over_time: None,
            last_bonus_time: Duration::ZERO,
            outbox: Vec::new(),
            events: Vec::new(),
            dropped: Vec::new(),
            pending: None,
        }
    }

    /// Starts hosting and opens the lobby.
    pub fn host(&mut self, local_game: bool) {
        self.session.start_server(local_game);
        info!(
            "Hosting {:?} game (max {} clients)",
            self.settings.mode, self.settings.max_clients
        );
        self.events.push(GameEvent::StateChanged(self.session.state()));
    }

    pub fn load_map<G: CollisionGrid + Send + 'static>(&mut self, grid: G) {
        info!(
            "Loaded map grid {}x{}",
            grid.grid_cols(),
            grid.grid_rows()
        );
        self.grid = Some(Box::new(grid));
    }

    pub fn load_ruleset(&mut self, ruleset: Ruleset, restrictions: WeaponRestrictions) {
        info!("Loaded ruleset with {} weapons", ruleset.len());
        self.ruleset = Some(ruleset);
        self.restrictions = restrictions;
    }

    /// Map and ruleset are both available.
    pub fn assets_ready(&self) -> bool {
        self.grid.is_some() && self.ruleset.is_some()
    }

    pub fn handle_packet(&mut self, from: ConnectionId, packet: Packet) {
        if !self.session.is_server() {
            debug!("Ignoring {} from {}, not hosting", packet.name(), from);
            return;
        }
        if packet.is_from_server() {
            warn!("Dropping server-only {} packet from {}", packet.name(), from);
            return;
        }

        match packet {
            Packet::Connect {
                client_version,
                name,
                team,
            } => self.handle_connect(from, client_version, &name, team),

            Packet::Ready => self.handle_ready(from),

            Packet::Shoot {
                worm_id,
                angle,
                facing_left,
            } => {
                if !self.accept_worm_command(from, worm_id, "Shoot") {
                    return;
                }
                if let Some(worm) = self.registry.get_mut(worm_id) {
                    worm.angle = angle;
                    worm.facing_left = facing_left;
                }
                self.worm_shoot(worm_id);
            }

            Packet::Death { worm_id, killer } => {
                if self.accept_worm_command(from, worm_id, "Death") {
                    self.kill_worm(worm_id, killer);
                }
            }

            Packet::PickupCollected { worm_id, slot } => {
                if self.accept_worm_command(from, worm_id, "PickupCollected") {
                    self.collect_bonus(worm_id, slot);
                }
            }

            Packet::Disconnect => {
                self.handle_disconnect(from);
                self.dropped.push(from);
            }

            // Filtered out above
            _ => {}
        }
    }

    fn handle_connect(&mut self, from: ConnectionId, client_version: u32, name: &str, team: u8) {
        info!(
            "Connection {} joining as '{}' (version: {})",
            from, name, client_version
        );

        // Remove existing connection if present
        if self.connections.contains_key(&from) {
            info!("Connection {} reconnected, dropping its old worms", from);
            self.handle_disconnect(from);
        }

        if self.connections.len() >= self.settings.max_clients {
            self.reject(from, "Server full");
            return;
        }

        let profile = WormProfile::new(name, team, WormKind::Human);
        let (worm_id, team) = match self.registry.create_worm(None, false, &profile, client_version)
        {
            Ok(worm) => {
                worm.owner = Some(from);
                (worm.id, worm.team)
            }
            Err(e) => {
                warn!("Cannot create worm for connection {}: {}", from, e);
                self.reject(from, "No free worm slot");
                return;
            }
        };

        self.connections
            .insert(from, Connection::new(from, client_version));
        self.send_to(
            from,
            Packet::Connected {
                connection_id: from,
                worm_ids: vec![worm_id],
            },
        );

        // Tell the newcomer about everyone already here
        let roster: Vec<Packet> = self
            .registry
            .iter()
            .filter(|w| w.id != worm_id)
            .map(|w| Packet::WormJoined {
                worm_id: w.id,
                name: w.name.clone(),
                team: w.team,
            })
            .collect();
        for packet in roster {
            self.send_to(from, packet);
        }

        self.broadcast(Packet::WormJoined {
            worm_id,
            name: name.to_string(),
            team,
        });
        self.events.push(GameEvent::WormJoined(worm_id));

        match self.session.state() {
            SessionState::Preparing | SessionState::Playing => {
                self.send_to(
                    from,
                    Packet::PrepareGame {
                        mode: self.settings.mode,
                    },
                );
            }
            SessionState::Lobby => {
                let wanted = self.settings.auto_start_players;
                if wanted > 0 && self.connections.len() >= wanted {
                    info!("{} players joined, starting round", self.connections.len());
                    self.request_start();
                }
            }
            _ => {}
        }
    }

    fn handle_ready(&mut self, from: ConnectionId) {
        let Some(connection) = self.connections.get_mut(&from) else {
            warn!("Ready from unknown connection {}", from);
            return;
        };
        connection.game_ready = true;
        debug!("Connection {} is ready", from);

        if self.session.state() == SessionState::Playing {
            self.welcome_late_joiner(from);
        }
    }

    /// Worm commands are only taken from the connection owning the worm, and only
    /// while a round is being played.
    fn accept_worm_command(&self, from: ConnectionId, worm_id: WormId, what: &str) -> bool {
        let owned = self
            .registry
            .get(worm_id)
            .map(|w| w.owner == Some(from))
            .unwrap_or(false);
        if !owned {
            warn!(
                "{} for worm {} rejected: not owned by connection {}",
                what,
                self.registry.worm_name(worm_id),
                from
            );
            return false;
        }
        if self.session.state() != SessionState::Playing {
            debug!("{} ignored outside of a round", what);
            return false;
        }
        true
    }

    fn reject(&mut self, to: ConnectionId, reason: &str) {
        info!("Rejecting connection {}: {}", to, reason);
        self.send_to(
            to,
            Packet::Disconnected {
                reason: reason.to_string(),
            },
        );
        self.dropped.push(to);
    }

    /// Forgets a connection and every worm it owned.
    pub fn handle_disconnect(&mut self, connection: ConnectionId) {
        if self.connections.remove(&connection).is_none() {
            debug!("Disconnect from unknown connection {}", connection);
            return;
        }
        info!("Connection {} left", connection);

        for worm_id in self.registry.ids_of_connection(connection) {
            self.remove_worm(worm_id);
        }
    }

    pub(crate) fn remove_worm(&mut self, worm_id: WormId) {
        match self.registry.remove(worm_id) {
            Ok(_) => {
                self.broadcast(Packet::WormLeft { worm_id });
                self.events.push(GameEvent::WormLeft(worm_id));
            }
            Err(e) => error!("Failed to remove worm: {}", e),
        }
    }

    /// Adds a worm played on this machine, a bot on dedicated servers.
    pub fn add_local_worm(&mut self, profile: &WormProfile) -> Result<WormId, RegistryError> {
        let worm = self
            .registry
            .create_worm(None, true, profile, shared::PROTOCOL_VERSION)?;
        let packet = Packet::WormJoined {
            worm_id: worm.id,
            name: worm.name.clone(),
            team: worm.team,
        };
        let worm_id = worm.id;
        self.broadcast(packet);
        self.events.push(GameEvent::WormJoined(worm_id));
        Ok(worm_id)
    }

    /// Moves the lobby into round preparation and tells every peer to load.
    pub fn request_start(&mut self) -> bool {
        if !self.session.start_game() {
            return false;
        }

        for connection in self.connections.values_mut() {
            connection.game_ready = false;
            connection.shots.clear();
        }
        self.bonuses.clear();
        self.game_over = false;
        self.game_over_time = None;
        self.last_bonus_time = self.now;

        info!("Preparing {:?} round", self.settings.mode);
        self.broadcast(Packet::PrepareGame {
            mode: self.settings.mode,
        });
        self.events
            .push(GameEvent::StateChanged(SessionState::Preparing));
        true
    }

    /// Stops hosting once the current tick is done.
    pub fn request_stop(&mut self, reason: &str) {
        info!("Stop requested: {}", reason);
        self.pending = Some(PendingReset::Stop(reason.to_string()));
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.session.set_paused(paused);
    }

    /// Applies teardown requested while rules were running.
    pub fn apply_pending(&mut self) {
        match self.pending.take() {
            None => {}
            Some(PendingReset::Lobby) => self.goto_lobby(),
            Some(PendingReset::Stop(reason)) => self.shutdown(&reason),
        }
    }

    fn shutdown(&mut self, reason: &str) {
        self.broadcast(Packet::Disconnected {
            reason: reason.to_string(),
        });
        self.dropped.extend(self.connections.keys().copied());
        self.connections.clear();
        self.registry.clear();
        self.bonuses.clear();
        self.game_over = false;
        self.game_over_time = None;
        self.session.stop();
        info!("Server stopped: {}", reason);
        self.events.push(GameEvent::StateChanged(SessionState::Inactive));
    }

    /// Advances the game by one fixed tick. Returns true if the round was simulated.
    pub fn tick(&mut self, dt: Duration) -> bool {
        match self.session.state() {
            SessionState::Preparing => {
                self.check_ready_clients();
                false
            }
            SessionState::Playing if !self.session.is_paused() => {
                self.server_frame = self.server_frame.wrapping_add(1);
                self.simulate_worms(dt);
                self.simulate_game(dt);
                true
            }
            _ => false,
        }
    }

    fn simulate_worms(&mut self, dt: Duration) {
        let dt = dt.as_secs_f32();
        let grid = self.grid.as_deref();
        let ruleset = self.ruleset.as_ref();

        for worm in self.registry.iter_mut().filter(|w| w.alive) {
            if let Some(grid) = grid {
                step_body(&mut worm.position, &mut worm.velocity, grid, dt);
            }
            if let Some(ruleset) = ruleset {
                worm.weapon.simulate(dt, ruleset);
            }
        }
    }

    /// Queues each connection's shot list together with the frame counter.
    ///
    /// `sim_time` is the simulated time of the last tick, the same axis the
    /// shots are stamped on.
    pub fn flush_frame(&mut self, sim_time: Duration) {
        if self.session.state() != SessionState::Playing {
            return;
        }

        let server_frame = self.server_frame;
        let server_time_ms = sim_time.as_millis() as u64;
        for connection in self.connections.values_mut() {
            self.outbox.push(Outgoing {
                destination: Destination::Connection(connection.id),
                packet: Packet::Frame {
                    server_frame,
                    server_time_ms,
                    shots: connection.shots.take(),
                },
            });
        }
    }

    pub(crate) fn broadcast(&mut self, packet: Packet) {
        self.outbox.push(Outgoing {
            destination: Destination::Broadcast,
            packet,
        });
    }

    pub(crate) fn send_to(&mut self, connection: ConnectionId, packet: Packet) {
        self.outbox.push(Outgoing {
            destination: Destination::Connection(connection),
            packet,
        });
    }

    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn server_frame(&self) -> u32 {
        self.server_frame
    }

    pub fn alive_worms(&self) -> Vec<WormId> {
        self.registry.alive_ids()
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn game_over_time(&self) -> Option<Duration> {
        self.game_over_time
    }

    pub fn registry(&self) -> &WormRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut WormRegistry {
        &mut self.registry
    }

    pub fn bonuses(&self) -> &BonusTable {
        &self.bonuses
    }

    pub fn bonuses_mut(&mut self) -> &mut BonusTable {
        &mut self.bonuses
    }

    pub fn restrictions_mut(&mut self) -> &mut WeaponRestrictions {
        &mut self.restrictions
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Connections the game decided to drop since the last call.
    pub fn take_dropped(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.dropped)
    }
}
