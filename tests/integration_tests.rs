//! Integration tests for the authoritative game server
//!
//! These tests drive whole rounds through the scheduler with a manual clock and an
//! in-memory transport, and talk to a real server over UDP.

use server::clock::ManualClock;
use server::config::GameSettings;
use server::map::GridMap;
use server::ruleset::{Ruleset, WeaponRestrictions};
use server::scheduler::Scheduler;
use server::transport::{Destination, LoopbackTransport};
use server::Game;
use shared::{GameMode, Packet, SessionState, WormId};
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Server game with assets loaded, hosting and waiting in the lobby.
fn hosted_game(settings: GameSettings) -> Game {
    let mut game = Game::new(settings, 7);
    game.load_map(GridMap::arena(16, 16, 8.0, 8.0));
    game.load_ruleset(Ruleset::standard(), WeaponRestrictions::new());
    game.host(false);
    game
}

struct Harness {
    clock: ManualClock,
    scheduler: Scheduler<ManualClock>,
    transport: LoopbackTransport,
    game: Game,
}

impl Harness {
    fn new(settings: GameSettings) -> Self {
        let clock = ManualClock::new();
        let mut scheduler = Scheduler::new(
            clock.clone(),
            settings.tick,
            settings.high_delay,
            settings.serious_delay,
        );
        scheduler.start();
        Self {
            clock,
            scheduler,
            transport: LoopbackTransport::new(),
            game: hosted_game(settings),
        }
    }

    /// Advances real time by one tick and runs one outer frame.
    fn step(&mut self) {
        self.clock.advance(ms(10));
        self.scheduler.frame(&mut self.game, &mut self.transport);
    }

    fn steps(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    fn connect(&mut self, connection: u32, name: &str) {
        self.transport.deliver(
            connection,
            &Packet::Connect {
                client_version: shared::PROTOCOL_VERSION,
                name: name.to_string(),
                team: 0,
            },
        );
    }

    fn broadcasts(&self) -> Vec<Packet> {
        self.transport
            .sent_packets()
            .into_iter()
            .filter(|(dest, _)| *dest == Destination::Broadcast)
            .map(|(_, packet)| packet)
            .collect()
    }

    /// Connects `players` peers and plays until the round started.
    fn start_round(&mut self, players: u32) {
        for connection in 1..=players {
            self.connect(connection, &format!("player{}", connection));
        }
        self.step();
        assert_eq!(self.game.state(), SessionState::Preparing);

        for connection in 1..=players {
            self.transport.deliver(connection, &Packet::Ready);
        }
        self.step();
        assert_eq!(self.game.state(), SessionState::Playing);
    }
}

fn deathmatch_settings(players: usize) -> GameSettings {
    GameSettings {
        mode: GameMode::Deathmatch,
        lives: Some(0),
        bonuses_on: false,
        auto_start_players: players,
        game_over_wait: Duration::from_secs(1),
        ..GameSettings::default()
    }
}

/// ROUND LIFECYCLE TESTS
mod round_tests {
    use super::*;

    /// Last survivor of a one-life deathmatch wins, announced exactly once
    #[test]
    fn last_worm_standing_wins_once() {
        let mut harness = Harness::new(deathmatch_settings(4));
        harness.start_round(4);

        let worm_of = |connection: u32| -> WormId {
            harness
                .game
                .registry()
                .ids_of_connection(connection)
                .first()
                .copied()
                .unwrap()
        };
        let survivor = worm_of(4);
        let victims: Vec<(u32, WormId)> = (1..=3).map(|c| (c, worm_of(c))).collect();

        for (connection, worm_id) in victims {
            harness.transport.deliver(
                connection,
                &Packet::Death {
                    worm_id,
                    killer: survivor,
                },
            );
        }
        harness.steps(20);

        let results: Vec<Packet> = harness
            .broadcasts()
            .into_iter()
            .filter(|p| matches!(p, Packet::RoundOver { .. }))
            .collect();
        assert_eq!(
            results,
            vec![Packet::RoundOver {
                winner: survivor as i16
            }]
        );
        assert!(harness.game.is_game_over());
        assert_eq!(harness.game.registry().get(survivor).unwrap().kills, 3);
    }

    /// After the scoreboard wait every peer is sent back to the lobby
    #[test]
    fn round_returns_to_lobby() {
        let mut harness = Harness::new(deathmatch_settings(2));
        harness.start_round(2);

        let victim = harness.game.registry().ids_of_connection(1)[0];
        let killer = harness.game.registry().ids_of_connection(2)[0];
        harness
            .transport
            .deliver(1, &Packet::Death { worm_id: victim, killer });
        harness.steps(5);
        assert!(harness.game.is_game_over());

        harness.steps(110);

        assert_eq!(harness.game.state(), SessionState::Lobby);
        let lobby_returns = harness
            .broadcasts()
            .into_iter()
            .filter(|p| *p == Packet::ReturnToLobby)
            .count();
        assert_eq!(lobby_returns, 1);
        assert!(harness.game.alive_worms().is_empty());
    }

    /// Round does not start until every peer finished loading
    #[test]
    fn round_waits_for_all_peers() {
        let mut harness = Harness::new(deathmatch_settings(3));
        for connection in 1..=3 {
            harness.connect(connection, "waiting");
        }
        harness.step();

        harness.transport.deliver(1, &Packet::Ready);
        harness.transport.deliver(2, &Packet::Ready);
        harness.steps(10);
        assert_eq!(harness.game.state(), SessionState::Preparing);

        harness.transport.deliver(3, &Packet::Ready);
        harness.step();
        assert_eq!(harness.game.state(), SessionState::Playing);

        let spawns = harness
            .broadcasts()
            .into_iter()
            .filter(|p| matches!(p, Packet::SpawnActor { .. }))
            .count();
        assert_eq!(spawns, 3);
    }

    /// Peer leaving mid-round is removed and can decide the round
    #[test]
    fn disconnect_decides_round() {
        let mut harness = Harness::new(deathmatch_settings(2));
        harness.start_round(2);
        let stayer = harness.game.registry().ids_of_connection(2)[0];

        harness.transport.deliver(1, &Packet::Disconnect);
        harness.steps(3);

        assert_eq!(harness.game.registry().len(), 1);
        assert!(harness
            .broadcasts()
            .contains(&Packet::RoundOver { winner: stayer as i16 }));
    }
}

/// CLIENT MIRROR TESTS
mod client_mirror_tests {
    use super::*;
    use client::game::{ClientWorld, Winner};

    /// A peer fed with everything addressed to it ends up agreeing with the server
    #[test]
    fn client_world_follows_server() {
        let mut harness = Harness::new(deathmatch_settings(2));
        harness.start_round(2);
        let victim = harness.game.registry().ids_of_connection(1)[0];
        let killer = harness.game.registry().ids_of_connection(2)[0];
        harness
            .transport
            .deliver(1, &Packet::Death { worm_id: victim, killer });
        harness.steps(3);

        let mut world = ClientWorld::new();
        let mut replies = Vec::new();
        for (dest, packet) in harness.transport.sent_packets() {
            if matches!(dest, Destination::Broadcast | Destination::Connection(2)) {
                replies.extend(world.apply(packet));
            }
        }

        assert_eq!(replies, vec![Packet::Ready]);
        assert_eq!(world.state(), SessionState::Playing);
        assert_eq!(world.own_worms, vec![killer]);
        assert_eq!(world.worms.len(), 2);
        assert_eq!(world.active_worm(), Some(killer));
        assert_eq!(world.worms[&killer].kills, 1);
        assert_eq!(world.winner, Some(Winner::Worm(killer)));
        assert_eq!(world.server_frame, harness.game.server_frame());
    }
}

/// PICKUP TESTS
mod pickup_tests {
    use super::*;
    use server::bonus::Bonus;
    use server::physics::Vector2;
    use shared::PickupKind;

    /// A full pickup table turns a spawn into a silent no-op
    #[test]
    fn full_table_spawns_nothing() {
        let settings = GameSettings {
            bonuses_on: true,
            bonus_frequency: Duration::from_millis(50),
            ..deathmatch_settings(2)
        };
        let mut harness = Harness::new(settings);
        harness.start_round(2);

        let capacity = harness.game.bonuses().capacity();
        for _ in 0..capacity {
            let now = harness.game.now();
            harness.game.bonuses_mut().insert(Bonus {
                position: Vector2::new(8.0, 8.0),
                kind: PickupKind::Health,
                spawn_time: now,
            });
        }
        assert!(harness.game.bonuses().is_full());
        harness.transport.clear_sent();

        assert_eq!(harness.game.spawn_bonus(), None);
        harness.steps(10);

        assert!(harness.game.bonuses().is_full());
        assert!(!harness
            .broadcasts()
            .iter()
            .any(|p| matches!(p, Packet::SpawnPickup { .. })));
    }

    /// Pickups spawn on schedule and are announced with their slot
    #[test]
    fn pickups_spawn_on_schedule() {
        let settings = GameSettings {
            bonuses_on: true,
            bonus_frequency: Duration::from_millis(100),
            ..deathmatch_settings(2)
        };
        let mut harness = Harness::new(settings);
        harness.start_round(2);

        harness.steps(25);

        let slots: Vec<u8> = harness
            .broadcasts()
            .into_iter()
            .filter_map(|p| match p {
                Packet::SpawnPickup { slot, .. } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![0, 1]);
        assert_eq!(harness.game.bonuses().len(), 2);
    }
}

/// SCHEDULER TESTS
mod scheduler_tests {
    use super::*;

    /// A long stall is skipped instead of being simulated tick by tick
    #[test]
    fn stall_skips_simulation() {
        let mut harness = Harness::new(deathmatch_settings(2));
        harness.start_round(2);
        let frame_before = harness.game.server_frame();

        harness.clock.advance(ms(500));
        let report = harness
            .scheduler
            .frame(&mut harness.game, &mut harness.transport);

        assert_eq!(report.ticks_run, 0);
        assert_eq!(report.ticks_skipped, 50);
        assert_eq!(harness.game.server_frame(), frame_before);
        assert_eq!(
            harness.scheduler.sim_time().as_millis() % 10,
            0,
            "simulation time stays on the tick grid"
        );

        harness.step();
        assert_eq!(harness.game.server_frame(), frame_before + 1);
    }

    /// Every playing frame carries the frame counter to each peer
    #[test]
    fn frame_packets_follow_ticks() {
        let mut harness = Harness::new(deathmatch_settings(2));
        harness.start_round(2);
        harness.transport.clear_sent();

        harness.steps(5);

        let frames: Vec<u32> = harness
            .transport
            .sent_packets()
            .into_iter()
            .filter_map(|(dest, p)| match (dest, p) {
                (Destination::Connection(1), Packet::Frame { server_frame, .. }) => {
                    Some(server_frame)
                }
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 5);
        assert!(frames.windows(2).all(|w| w[1] == w[0] + 1));
    }
}

/// NETWORK TESTS
mod network_tests {
    use super::*;
    use server::network::Server;
    use shared::{decode, encode, MAX_PACKET_SIZE};
    use tokio::net::UdpSocket;

    async fn recv_until<F: Fn(&Packet) -> bool>(socket: &UdpSocket, wanted: F) -> Packet {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            let (len, _) = socket.recv_from(&mut buffer).await.unwrap();
            let packet = decode(&buffer[..len]).unwrap();
            if wanted(&packet) {
                return packet;
            }
        }
    }

    /// Tests a full handshake and round start against a real UDP server
    #[tokio::test]
    async fn udp_round_start() {
        let settings = GameSettings {
            auto_start_players: 1,
            map_cols: 16,
            map_rows: 16,
            ..GameSettings::default()
        };
        let mut server = Server::new("127.0.0.1:0", settings, 11).await.unwrap();
        let server_addr = server.local_addr();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let peer = async {
            let connect = Packet::Connect {
                client_version: shared::PROTOCOL_VERSION,
                name: "udp".to_string(),
                team: 0,
            };
            // Resend until the server finished loading and answers
            let connected = loop {
                socket
                    .send_to(&encode(&connect).unwrap(), server_addr)
                    .await
                    .unwrap();
                let answer = tokio::time::timeout(
                    Duration::from_millis(500),
                    recv_until(&socket, |p| matches!(p, Packet::Connected { .. })),
                )
                .await;
                if let Ok(packet) = answer {
                    break packet;
                }
            };

            recv_until(&socket, |p| matches!(p, Packet::PrepareGame { .. })).await;
            socket
                .send_to(&encode(&Packet::Ready).unwrap(), server_addr)
                .await
                .unwrap();
            recv_until(&socket, |p| *p == Packet::BeginMatch).await;
            let spawn = recv_until(&socket, |p| matches!(p, Packet::SpawnActor { .. })).await;
            (connected, spawn)
        };

        let (connected, spawn) = tokio::select! {
            result = server.run() => panic!("server stopped early: {:?}", result.err()),
            result = tokio::time::timeout(Duration::from_secs(10), peer) => {
                result.expect("round did not start over UDP")
            }
        };

        let worm_id = match connected {
            Packet::Connected { worm_ids, .. } => worm_ids[0],
            other => panic!("Expected Connected, got {:?}", other),
        };
        match spawn {
            Packet::SpawnActor { worm_id: spawned, .. } => assert_eq!(spawned, worm_id),
            other => panic!("Expected SpawnActor, got {:?}", other),
        }
        assert_eq!(server.game().state(), SessionState::Playing);
    }
}
