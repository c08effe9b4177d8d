//! Server game rules
//!
//! Everything here runs on the authority only. Each decision that changes what
//! peers see is queued as exactly one packet in the same tick it is made, either
//! broadcast or addressed to a single connection.

use crate::bonus::Bonus;
use crate::game::{Game, GameEvent, PendingReset};
use crate::physics::Vector2;
use crate::registry::{Lives, WeaponSlot};
use crate::ruleset::WeaponKind;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{
    ConnectionId, GameMode, Packet, PickupKind, SessionState, Shot, WormId, MAX_TEAMS, NO_WINNER,
};
use std::time::Duration;

/// Health restored by a health pickup.
const HEALTH_BONUS: f32 = 30.0;
const MAX_HEALTH: f32 = 100.0;

/// Team the VIPs play on in VIP mode.
const VIP_TEAM: u8 = 2;
/// Team that wins once every VIP is out.
const VIP_ATTACKERS: u8 = 1;

/// Result of a finished round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Worm(WormId),
    Team(u8),
    Nobody,
}

impl Outcome {
    /// Winner as carried by `RoundOver`.
    pub fn wire_value(self) -> i16 {
        match self {
            Outcome::Worm(id) => id as i16,
            Outcome::Team(team) => team as i16,
            Outcome::Nobody => NO_WINNER,
        }
    }
}

impl Game {
    /// Picks a spawn position that is not inside rock.
    ///
    /// Starts at a random cell and walks the grid row by row, wrapping around at the
    /// end. If every cell is rock the random start cell is used anyway.
    pub fn find_spot(&mut self) -> Option<Vector2> {
        let grid = self.grid.as_deref()?;
        let cols = grid.grid_cols();
        let total = cols * grid.grid_rows();
        if total == 0 {
            return None;
        }

        let start = self.rng.gen_range(0..total);
        for step in 0..total {
            let cell = (start + step) % total;
            let (x, y) = (cell % cols, cell / cols);
            if !grid.is_solid(x, y) {
                return Some(grid.cell_center(x, y));
            }
        }
        Some(grid.cell_center(start % cols, start / cols))
    }

    fn spawn_position(&mut self) -> Vector2 {
        self.find_spot().unwrap_or_else(|| {
            warn!("No map loaded, spawning at the origin");
            Vector2::ZERO
        })
    }

    /// Brings a worm to life at a free spot and tells everyone.
    pub fn spawn_worm(&mut self, worm_id: WormId) -> bool {
        if self.game_over {
            return false;
        }
        let position = self.spawn_position();
        let Some(worm) = self.registry.get_mut(worm_id) else {
            return false;
        };
        if worm.lives.is_out() {
            return false;
        }
        worm.spawn(position);

        let (x, y) = position.to_wire();
        debug!("Spawned worm {} at ({}, {})", worm.display_name(), x, y);
        self.broadcast(Packet::SpawnActor { worm_id, x, y });
        self.events.push(GameEvent::WormSpawned(worm_id));
        true
    }

    /// Repeats the spawn of every living worm to one connection.
    pub fn spawn_worms_for(&mut self, connection: ConnectionId) {
        let spawns: Vec<Packet> = self
            .registry
            .iter()
            .filter(|w| w.alive)
            .map(|w| {
                let (x, y) = w.position.to_wire();
                Packet::SpawnActor {
                    worm_id: w.id,
                    x,
                    y,
                }
            })
            .collect();
        for packet in spawns {
            self.send_to(connection, packet);
        }
    }

    /// A peer that finished loading while the round is already running.
    pub(crate) fn welcome_late_joiner(&mut self, connection: ConnectionId) {
        info!("Connection {} joined a running round", connection);
        self.send_to(connection, Packet::BeginMatch);
        self.spawn_worms_for(connection);

        let lives = Lives::from_setting(self.settings.lives);
        for worm_id in self.registry.ids_of_connection(connection) {
            if let Some(worm) = self.registry.get_mut(worm_id) {
                if worm.is_prepared() {
                    continue;
                }
                worm.lives = lives;
                worm.vip = self.settings.mode == GameMode::Vip && worm.team == VIP_TEAM;
            }
            self.arm_worm(worm_id);
            if self.registry.prepare(worm_id).is_ok() {
                self.spawn_worm(worm_id);
            }
        }
    }

    /// Per-tick round bookkeeping: respawns, tag time, pickups and the win check.
    pub(crate) fn simulate_game(&mut self, dt: Duration) {
        if self.session.state() != SessionState::Playing {
            return;
        }

        // Scoreboard shown long enough, back to the lobby
        if let Some(over) = self.game_over_time {
            if self.now.saturating_sub(over) > self.settings.game_over_wait {
                if self.pending.is_none() {
                    self.pending = Some(PendingReset::Lobby);
                }
                return;
            }
        }

        let tag_mode = self.settings.mode == GameMode::Tag;
        for worm_id in self.registry.ids() {
            let Some(worm) = self.registry.get_mut(worm_id) else {
                continue;
            };
            if tag_mode && worm.tag_it && worm.alive {
                worm.tag_time += dt.as_secs_f32();
            }

            let waiting = worm.in_round() && !worm.alive;
            if waiting && self.now.saturating_sub(worm.time_of_death) > self.settings.respawn_delay
            {
                self.spawn_worm(worm_id);
            }
        }

        if self.settings.bonuses_on {
            for slot in self.bonuses.expired(self.now, self.settings.bonus_life) {
                self.bonuses.take(slot);
                debug!("Pickup in slot {} expired", slot);
                self.broadcast(Packet::DestroyPickup { slot });
                self.events.push(GameEvent::PickupRemoved(slot));
            }

            if !self.game_over
                && self.now.saturating_sub(self.last_bonus_time) > self.settings.bonus_frequency
            {
                self.spawn_bonus();
                self.last_bonus_time = self.now;
            }
        }

        self.recheck_game();
    }

    /// Drops a pickup into the first free slot. Does nothing if the table is full.
    pub fn spawn_bonus(&mut self) -> Option<u8> {
        if self.bonuses.is_full() {
            debug!("No free pickup slot");
            return None;
        }

        let position = self.spawn_position();
        let weapon_crate = self.rng.gen_bool(0.5);
        let kind = match self.random_weapon() {
            Some(weapon) if weapon_crate => PickupKind::Weapon {
                weapon: weapon as u8,
            },
            _ => PickupKind::Health,
        };

        let slot = self.bonuses.insert(Bonus {
            position,
            kind,
            spawn_time: self.now,
        })?;

        let (x, y) = position.to_wire();
        debug!("Spawned {:?} pickup in slot {}", kind, slot);
        self.broadcast(Packet::SpawnPickup { kind, slot, x, y });
        self.events.push(GameEvent::PickupSpawned(slot));
        Some(slot)
    }

    /// A random weapon index, moved forward past banned weapons.
    ///
    /// Gives up after one pass and keeps the first pick if everything is banned.
    fn random_weapon(&mut self) -> Option<usize> {
        let count = self.ruleset.as_ref().map(|r| r.len()).unwrap_or(0);
        if count == 0 {
            return None;
        }
        let original = self.rng.gen_range(0..count);
        let ruleset = self.ruleset.as_ref()?;

        let mut weapon = original;
        loop {
            let banned = ruleset
                .weapon(weapon)
                .map(|w| self.restrictions.is_banned(&w.name))
                .unwrap_or(false);
            if !banned {
                return Some(weapon);
            }
            weapon = (weapon + 1) % count;
            if weapon == original {
                return Some(original);
            }
        }
    }

    /// Gives a worm a freshly loaded random weapon.
    fn arm_worm(&mut self, worm_id: WormId) {
        let Some(weapon) = self.random_weapon() else {
            return;
        };
        let Some(ruleset) = self.ruleset.as_ref() else {
            return;
        };
        if let Some(worm) = self.registry.get_mut(worm_id) {
            worm.weapon = WeaponSlot::loaded(weapon, &self.restrictions, ruleset);
        }
    }

    /// A worm touched a pickup.
    pub fn collect_bonus(&mut self, worm_id: WormId, slot: u8) -> bool {
        let alive = self.registry.get(worm_id).map(|w| w.alive).unwrap_or(false);
        if !alive {
            warn!(
                "Dead or unknown worm {} cannot collect pickups",
                self.registry.worm_name(worm_id)
            );
            return false;
        }
        let Some(bonus) = self.bonuses.take(slot) else {
            debug!("Pickup slot {} is already empty", slot);
            return false;
        };

        if let Some(worm) = self.registry.get_mut(worm_id) {
            match bonus.kind {
                PickupKind::Health => {
                    worm.health = (worm.health + HEALTH_BONUS).min(MAX_HEALTH);
                }
                PickupKind::Weapon { weapon } => {
                    if let Some(ruleset) = self.ruleset.as_ref() {
                        worm.weapon =
                            WeaponSlot::loaded(weapon as usize, &self.restrictions, ruleset);
                    }
                }
            }
        }

        self.broadcast(Packet::DestroyPickup { slot });
        self.events.push(GameEvent::PickupRemoved(slot));
        true
    }

    /// Fires the worm's current weapon if the slot allows it.
    ///
    /// Every connection gets the shot in its shot list, stamped with the current
    /// simulated time.
    pub fn worm_shoot(&mut self, worm_id: WormId) -> bool {
        let vip_mode = self.settings.mode == GameMode::Vip;
        let Some(ruleset) = self.ruleset.as_ref() else {
            warn!("Cannot shoot before a ruleset is loaded");
            return false;
        };
        let Some(worm) = self.registry.get_mut(worm_id) else {
            return false;
        };
        if worm.vip && vip_mode {
            return false;
        }

        let slot = &mut worm.weapon;
        if slot.reloading || slot.last_fire > 0.0 || !slot.enabled {
            return false;
        }
        let Some(weapon) = slot.weapon.and_then(|i| ruleset.weapon(i)) else {
            warn!(
                "Worm {} is trying to shoot with an uninitialized weapon",
                worm.display_name()
            );
            return false;
        };

        slot.last_fire = weapon.rate_of_fire;

        let mut angle = worm.angle;
        if worm.facing_left {
            angle = 180.0 - angle;
        }
        let angle = angle.rem_euclid(360.0) as u16 % 360;

        let speed = match weapon.kind {
            WeaponKind::Beam => 0.0,
            WeaponKind::Projectile => worm.velocity.magnitude(),
        };

        slot.charge -= weapon.drain / 100.0;
        if slot.charge <= 0.0 {
            slot.charge = 0.0;
            slot.reloading = true;
        }

        let shot = Shot {
            time_ms: self.now.as_millis() as u64,
            worm_id,
            speed,
            angle,
        };
        for connection in self.connections.values_mut() {
            connection.shots.push(shot);
        }
        true
    }

    /// Records a death reported for a worm.
    pub fn kill_worm(&mut self, worm_id: WormId, killer: WormId) -> bool {
        let now = self.now;
        let Some(worm) = self.registry.get_mut(worm_id) else {
            warn!("Death of unknown worm {}", worm_id);
            return false;
        };
        if !worm.alive {
            debug!("Worm {} is already dead", worm.display_name());
            return false;
        }

        worm.alive = false;
        worm.time_of_death = now;
        worm.deaths += 1;
        worm.lives = worm.lives.after_death();
        let was_it = worm.tag_it;
        if worm.lives.is_out() {
            info!("Worm {} is out", worm.display_name());
        }

        if killer != worm_id {
            if let Some(k) = self.registry.get_mut(killer) {
                k.kills += 1;
            }
        }

        self.broadcast(Packet::WormDown { worm_id, killer });
        self.events.push(GameEvent::WormDown { worm_id, killer });

        // In tag the victim of whoever is "it" takes over
        if self.settings.mode == GameMode::Tag && killer != worm_id && !was_it {
            let killer_was_it = self
                .registry
                .get(killer)
                .map(|k| k.tag_it)
                .unwrap_or(false);
            let victim_out = self
                .registry
                .get(worm_id)
                .map(|w| w.lives.is_out())
                .unwrap_or(true);
            if killer_was_it && !victim_out {
                self.tag_worm(worm_id);
            }
        }
        true
    }

    /// Makes one worm "it". Every other worm loses the flag first.
    pub fn tag_worm(&mut self, worm_id: WormId) -> bool {
        if self.session.state() != SessionState::Playing || !self.registry.contains(worm_id) {
            return false;
        }

        for worm in self.registry.iter_mut() {
            worm.tag_it = false;
        }
        let Some(worm) = self.registry.get_mut(worm_id) else {
            return false;
        };
        worm.tag_it = true;
        let tag_time = worm.tag_time;
        info!("Worm {} is it", worm.display_name());

        self.broadcast(Packet::TagUpdate { worm_id, tag_time });
        self.events.push(GameEvent::Tagged(worm_id));
        true
    }

    /// Tags the worm that was "it" for the shortest time, picking randomly among ties.
    ///
    /// Worms that joined the running round but are not in play yet are never picked.
    pub fn tag_random_worm(&mut self) -> Option<WormId> {
        let candidates: Vec<(WormId, f32)> = self
            .registry
            .iter()
            .filter(|w| w.in_round())
            .map(|w| (w.id, w.tag_time))
            .collect();
        let lowest = candidates
            .iter()
            .map(|(_, time)| *time)
            .fold(f32::INFINITY, f32::min);
        let tied: Vec<WormId> = candidates
            .iter()
            .filter(|(_, time)| *time == lowest)
            .map(|(id, _)| *id)
            .collect();

        let chosen = *tied.choose(&mut self.rng)?;
        self.tag_worm(chosen).then_some(chosen)
    }

    /// Decides whether the round is over and announces the winner once.
    pub fn recheck_game(&mut self) {
        if self.session.state() != SessionState::Playing {
            return;
        }

        if self.game_over {
            return;
        }

        if self.settings.mode == GameMode::Tag && !self.registry.iter().any(|w| w.tag_it) {
            self.tag_random_worm();
        }
        let Some(outcome) = self.evaluate_outcome() else {
            return;
        };

        self.game_over = true;
        self.game_over_time = Some(self.now);
        info!("Round over, winner {:?}", outcome);
        self.broadcast(Packet::RoundOver {
            winner: outcome.wire_value(),
        });
        self.events.push(GameEvent::RoundOver(outcome));
    }

    /// Winner of the round if it is over under the current mode.
    ///
    /// Only worms prepared for the round count; a late joiner that has not
    /// reported ready yet neither keeps the round alive nor wins it.
    fn evaluate_outcome(&self) -> Option<Outcome> {
        let remaining: Vec<WormId> = self
            .registry
            .iter()
            .filter(|w| w.in_round())
            .map(|w| w.id)
            .collect();

        let mut team_count = [0usize; MAX_TEAMS];
        let mut vips = 0;
        for worm in self.registry.iter().filter(|w| w.in_round()) {
            team_count[worm.team as usize % MAX_TEAMS] += 1;
            if worm.vip {
                vips += 1;
            }
        }

        match self.settings.mode {
            GameMode::Deathmatch => (remaining.len() < 2).then(|| match remaining.first() {
                Some(&id) => Outcome::Worm(id),
                None => Outcome::Nobody,
            }),

            GameMode::TeamDeathmatch => {
                let teams_left: Vec<usize> = (0..MAX_TEAMS).filter(|&t| team_count[t] > 0).collect();
                (teams_left.len() <= 1).then(|| match teams_left.first() {
                    Some(&team) => Outcome::Team(team as u8),
                    None => Outcome::Nobody,
                })
            }

            GameMode::Vip => {
                if vips == 0 {
                    return Some(Outcome::Team(VIP_ATTACKERS));
                }
                // Only defenders and attackers decide the round
                let teams_left: Vec<usize> = (0..2).filter(|&t| team_count[t] > 0).collect();
                (teams_left.len() <= 1).then(|| match teams_left.first() {
                    Some(&team) => Outcome::Team(team as u8),
                    None => Outcome::Nobody,
                })
            }

            GameMode::Tag => (remaining.len() < 2).then(|| {
                // Everyone who played counts, not only survivors
                let mut best: Option<(WormId, f32)> = None;
                for worm in self.registry.iter().filter(|w| w.is_prepared()) {
                    if best.map(|(_, time)| worm.tag_time > time).unwrap_or(true) {
                        best = Some((worm.id, worm.tag_time));
                    }
                }
                best.map(|(id, _)| Outcome::Worm(id))
                    .unwrap_or(Outcome::Nobody)
            }),
        }
    }

    /// Starts the round once every connected peer finished loading.
    pub(crate) fn check_ready_clients(&mut self) {
        if self.session.state() != SessionState::Preparing || !self.assets_ready() {
            return;
        }
        if self.connections.values().all(|c| c.game_ready) {
            self.begin_match();
        }
    }

    fn begin_match(&mut self) {
        let lives = Lives::from_setting(self.settings.lives);
        let vip_mode = self.settings.mode == GameMode::Vip;

        let ids = self.registry.ids();
        for &worm_id in &ids {
            if let Some(worm) = self.registry.get_mut(worm_id) {
                worm.lives = lives;
                worm.alive = false;
                worm.tag_it = false;
                worm.tag_time = 0.0;
                worm.kills = 0;
                worm.deaths = 0;
                worm.vip = vip_mode && worm.team == VIP_TEAM;
            }
            self.arm_worm(worm_id);
            if let Err(e) = self.registry.prepare(worm_id) {
                warn!("Cannot prepare worm: {}", e);
            }
        }

        self.game_over = false;
        self.game_over_time = None;
        self.last_bonus_time = self.now;
        self.session.begin_playing();
        info!("Round started with {} worms", ids.len());
        self.broadcast(Packet::BeginMatch);
        self.events.push(GameEvent::StateChanged(SessionState::Playing));

        for worm_id in ids {
            self.spawn_worm(worm_id);
        }

        if self.settings.mode == GameMode::Tag {
            self.tag_random_worm();
        }
    }

    /// Ends the post-round display and reopens the lobby.
    pub(crate) fn goto_lobby(&mut self) {
        self.broadcast(Packet::ReturnToLobby);

        for worm_id in self.registry.ids() {
            self.registry.unprepare(worm_id);
            if let Some(worm) = self.registry.get_mut(worm_id) {
                worm.tag_it = false;
                worm.tag_time = 0.0;
                worm.alive = false;
            }
        }
        for connection in self.connections.values_mut() {
            connection.game_ready = false;
            connection.shots.clear();
        }
        self.bonuses.clear();
        self.game_over = false;
        self.game_over_time = None;

        self.session.return_to_lobby();
        info!("Returned to lobby");
        self.events.push(GameEvent::StateChanged(SessionState::Lobby));
    }
}
