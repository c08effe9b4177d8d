//! Dual-clock fixed-tick scheduler
//!
//! The outer loop runs at whatever rate the process manages. Each outer frame the
//! scheduler catches the simulation clock up with real time in fixed ticks, so the
//! game always advances in identical steps. When the simulation has fallen too far
//! behind, the missed span is skipped instead of simulated.

use crate::clock::{floor_to_tick, TimeSource};
use crate::game::Game;
use crate::transport::Transport;
use log::{debug, error, warn};
use shared::{audit_server, decode, encode};
use std::time::Duration;

/// Outer frames between two connectivity audits.
const AUDIT_INTERVAL_FRAMES: u64 = 100;
/// Server frames between two performance log lines.
const PERF_LOG_FRAMES: u32 = 100;

/// What one outer frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Ticks handed to the game
    pub ticks_run: u32,
    /// Ticks skipped by fast-forwarding
    pub ticks_skipped: u32,
    pub server_frame: u32,
    /// Real time since the previous frame
    pub delta: Duration,
}

pub struct Scheduler<C: TimeSource> {
    clock: C,
    tick: Duration,
    high_delay: Duration,
    serious_delay: Duration,
    real_time: Duration,
    sim_time: Duration,
    frames: u64,
}

impl<C: TimeSource> Scheduler<C> {
    pub fn new(clock: C, tick: Duration, high_delay: Duration, serious_delay: Duration) -> Self {
        Self {
            clock,
            tick,
            high_delay,
            serious_delay,
            real_time: Duration::ZERO,
            sim_time: Duration::ZERO,
            frames: 0,
        }
    }

    /// Aligns both clocks with the time source, dropping any backlog.
    pub fn start(&mut self) {
        self.real_time = self.clock.now();
        self.sim_time = floor_to_tick(self.real_time, self.tick);
    }

    pub fn real_time(&self) -> Duration {
        self.real_time
    }

    pub fn sim_time(&self) -> Duration {
        self.sim_time
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick
    }

    fn delay(&self) -> Duration {
        self.real_time.saturating_sub(self.sim_time)
    }

    /// The simulation lags behind real time noticeably.
    pub fn high_simulation_delay(&self) -> bool {
        self.delay() > self.high_delay
    }

    /// The simulation lags so much that missed ticks get skipped.
    pub fn serious_simulation_delay(&self) -> bool {
        self.delay() > self.serious_delay
    }

    /// Runs one outer frame: inbound packets, catch-up ticks, outbound packets.
    pub fn frame<T: Transport>(&mut self, game: &mut Game, transport: &mut T) -> FrameReport {
        let now = self.clock.now();
        let delta = now.saturating_sub(self.real_time);
        self.real_time = now;
        self.frames += 1;

        let mut report = FrameReport {
            delta,
            ..FrameReport::default()
        };

        // Inbound packets see the simulated time of the last tick
        game.set_time(self.sim_time);
        for (from, bytes) in transport.poll_received() {
            match decode(&bytes) {
                Ok(packet) => game.handle_packet(from, packet),
                Err(e) => warn!("Dropping datagram from connection {}: {}", from, e),
            }
        }
        for connection in transport.poll_disconnected() {
            game.handle_disconnect(connection);
        }

        while self.sim_time + self.tick <= self.real_time {
            if self.serious_simulation_delay() {
                let delay = self.delay();
                let skip = floor_to_tick(delay, self.tick);
                warn!(
                    "Simulation is {:?} behind, skipping {} ticks",
                    delay,
                    skip.as_micros() / self.tick.as_micros().max(1)
                );
                report.ticks_skipped += (skip.as_micros() / self.tick.as_micros().max(1)) as u32;
                self.sim_time += skip;
                continue;
            }

            game.set_time(self.sim_time);
            if game.tick(self.tick) {
                report.ticks_run += 1;
                if game.server_frame() % PERF_LOG_FRAMES == 0 {
                    debug!(
                        "Frame {}: {} worms alive, sim {:?} behind",
                        game.server_frame(),
                        game.alive_worms().len(),
                        self.delay()
                    );
                }
            }
            self.sim_time += self.tick;
        }

        // Downstream work sees real time again
        game.set_time(self.real_time);
        game.apply_pending();
        game.flush_frame(self.sim_time);

        for outgoing in game.take_outbox() {
            match encode(&outgoing.packet) {
                Ok(bytes) => transport.send(outgoing.destination, bytes),
                Err(e) => error!("Failed to encode {}: {}", outgoing.packet.name(), e),
            }
        }
        for connection in game.take_dropped() {
            transport.disconnect(connection);
        }

        if self.frames % AUDIT_INTERVAL_FRAMES == 0 {
            if let Some(problem) = audit_server(transport.is_running(), game.state()) {
                warn!("{}", problem);
            }
        }

        report.server_frame = game.server_frame();
        report
    }

    /// Waits until `ready` reports true, polling every tick.
    pub async fn wait_until_ready<F: FnMut() -> bool>(&self, mut ready: F) {
        let mut polls: u64 = 0;
        while !ready() {
            if polls % 100 == 0 {
                debug!("Waiting for map and ruleset");
            }
            polls += 1;
            tokio::time::sleep(self.tick).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::GameSettings;
    use crate::map::GridMap;
    use crate::registry::{WormKind, WormProfile};
    use crate::ruleset::{Ruleset, WeaponRestrictions};
    use crate::transport::{Destination, LoopbackTransport};
    use shared::{Packet, SessionState};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn scheduler(clock: &ManualClock) -> Scheduler<ManualClock> {
        Scheduler::new(clock.clone(), ms(10), ms(100), ms(200))
    }

    fn playing_game() -> Game {
        let mut game = Game::new(GameSettings::default(), 3);
        game.load_map(GridMap::arena(10, 10, 10.0, 10.0));
        game.load_ruleset(Ruleset::standard(), WeaponRestrictions::new());
        game.host(false);
        for name in ["a", "b"] {
            game.add_local_worm(&WormProfile::new(name, 0, WormKind::Bot))
                .unwrap();
        }
        game.request_start();
        game
    }

    #[test]
    fn test_ticks_follow_real_time() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = playing_game();
        let mut transport = LoopbackTransport::new();
        scheduler.start();

        // First tick begins the match
        clock.advance(ms(10));
        scheduler.frame(&mut game, &mut transport);
        assert_eq!(game.state(), SessionState::Playing);

        clock.advance(ms(35));
        let report = scheduler.frame(&mut game, &mut transport);
        assert_eq!(report.ticks_run, 3);
        assert_eq!(report.server_frame, 3);
        assert_eq!(scheduler.sim_time(), ms(40));
        assert_eq!(report.delta, ms(35));

        clock.advance(ms(5));
        let report = scheduler.frame(&mut game, &mut transport);
        assert_eq!(report.ticks_run, 1);
        assert_eq!(scheduler.sim_time(), ms(50));
    }

    #[test]
    fn test_frame_stamped_with_simulated_time() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = playing_game();
        let mut transport = LoopbackTransport::new();
        game.handle_packet(
            7,
            Packet::Connect {
                client_version: 1,
                name: "watcher".to_string(),
                team: 0,
            },
        );
        game.handle_packet(7, Packet::Ready);
        scheduler.start();
        clock.advance(ms(10));
        scheduler.frame(&mut game, &mut transport);
        transport.clear_sent();

        // Real time lands between two ticks
        clock.advance(ms(15));
        scheduler.frame(&mut game, &mut transport);

        let stamps: Vec<u64> = transport
            .sent_packets()
            .into_iter()
            .filter_map(|(_, p)| match p {
                Packet::Frame { server_time_ms, .. } => Some(server_time_ms),
                _ => None,
            })
            .collect();
        assert_eq!(scheduler.real_time(), ms(25));
        assert_eq!(stamps, vec![20]);
    }

    #[test]
    fn test_stall_is_fast_forwarded() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = playing_game();
        let mut transport = LoopbackTransport::new();
        scheduler.start();
        clock.advance(ms(10));
        scheduler.frame(&mut game, &mut transport);
        let before = game.server_frame();

        clock.advance(ms(500));
        let report = scheduler.frame(&mut game, &mut transport);

        assert_eq!(report.ticks_run, 0);
        assert_eq!(report.ticks_skipped, 50);
        assert_eq!(game.server_frame(), before);
        assert_eq!(scheduler.sim_time(), ms(510));
        assert_eq!(scheduler.sim_time().as_millis() % 10, 0);
    }

    #[test]
    fn test_fast_forward_lands_on_tick_boundary() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = playing_game();
        let mut transport = LoopbackTransport::new();
        scheduler.start();

        clock.set(ms(437));
        scheduler.frame(&mut game, &mut transport);
        assert_eq!(scheduler.sim_time(), ms(430));
        assert_eq!(game.server_frame(), 0);
    }

    #[test]
    fn test_moderate_lag_is_simulated() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = playing_game();
        let mut transport = LoopbackTransport::new();
        scheduler.start();
        clock.advance(ms(10));
        scheduler.frame(&mut game, &mut transport);

        clock.advance(ms(150));
        let report = scheduler.frame(&mut game, &mut transport);
        assert_eq!(report.ticks_run, 15);
        assert_eq!(report.ticks_skipped, 0);
    }

    #[test]
    fn test_delay_flags() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        scheduler.start();
        assert!(!scheduler.high_simulation_delay());

        clock.set(ms(150));
        scheduler.real_time = clock.now();
        assert!(scheduler.high_simulation_delay());
        assert!(!scheduler.serious_simulation_delay());

        clock.set(ms(250));
        scheduler.real_time = clock.now();
        assert!(scheduler.serious_simulation_delay());
    }

    #[test]
    fn test_lobby_ticks_do_not_count() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = Game::new(GameSettings::default(), 1);
        game.host(false);
        let mut transport = LoopbackTransport::new();
        scheduler.start();

        clock.advance(ms(100));
        let report = scheduler.frame(&mut game, &mut transport);
        assert_eq!(report.ticks_run, 0);
        assert_eq!(report.server_frame, 0);
        assert_eq!(scheduler.sim_time(), ms(100));
    }

    #[test]
    fn test_inbound_and_outbound_packets() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = Game::new(GameSettings::default(), 1);
        game.host(false);
        let mut transport = LoopbackTransport::new();
        scheduler.start();

        transport.deliver(
            4,
            &Packet::Connect {
                client_version: 1,
                name: "alice".to_string(),
                team: 0,
            },
        );
        transport.deliver_raw(4, vec![0xde, 0xad]);
        scheduler.frame(&mut game, &mut transport);

        let sent = transport.sent_packets();
        assert_eq!(
            sent[0],
            (
                Destination::Connection(4),
                Packet::Connected {
                    connection_id: 4,
                    worm_ids: vec![0],
                }
            )
        );
    }

    #[test]
    fn test_transport_timeouts_remove_worms() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut game = Game::new(GameSettings::default(), 1);
        game.host(false);
        let mut transport = LoopbackTransport::new();
        scheduler.start();

        transport.deliver(
            4,
            &Packet::Connect {
                client_version: 1,
                name: "alice".to_string(),
                team: 0,
            },
        );
        scheduler.frame(&mut game, &mut transport);
        assert_eq!(game.registry().len(), 1);

        transport.drop_connection(4);
        scheduler.frame(&mut game, &mut transport);
        assert!(game.registry().is_empty());
    }

    #[test]
    fn test_rejected_connection_is_disconnected() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let settings = GameSettings {
            max_clients: 1,
            ..GameSettings::default()
        };
        let mut game = Game::new(settings, 1);
        game.host(false);
        let mut transport = LoopbackTransport::new();
        scheduler.start();

        for id in [1, 2] {
            transport.deliver(
                id,
                &Packet::Connect {
                    client_version: 1,
                    name: format!("p{}", id),
                    team: 0,
                },
            );
        }
        scheduler.frame(&mut game, &mut transport);
        assert_eq!(
            transport.connection_status(2),
            shared::ConnectionStatus::Disconnected
        );
        assert_eq!(
            transport.connection_status(1),
            shared::ConnectionStatus::Connected
        );
    }

    #[test]
    fn test_wait_until_ready() {
        let clock = ManualClock::new();
        let scheduler = scheduler(&clock);
        let mut polls = 0;
        tokio_test::block_on(async {
            tokio::time::timeout(
                Duration::from_secs(1),
                scheduler.wait_until_ready(|| {
                    polls += 1;
                    polls > 3
                }),
            )
            .await
            .expect("barrier never released");
        });
        assert_eq!(polls, 4);
    }
}
