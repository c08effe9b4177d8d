//! Server network layer: UDP transport and the main server loop
//!
//! Socket I/O runs in two tokio tasks connected to the game side by unbounded
//! channels. The game side never awaits the network; it drains whatever the
//! receiver task queued and pushes outgoing datagrams to the sender task.

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::clock::SystemClock;
use crate::config::GameSettings;
use crate::game::Game;
use crate::map::GridMap;
use crate::ruleset::{Ruleset, WeaponRestrictions};
use crate::scheduler::Scheduler;
use crate::transport::{Destination, Transport};
use log::{debug, error, info, warn};
use shared::{encode, ConnectionId, ConnectionStatus, Packet, SessionState, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Side length of one collision cell of the generated arena, in pixels.
const CELL_SIZE: f32 = 8.0;

/// Datagram as it travels between the game side and the socket tasks
type Datagram = (SocketAddr, Vec<u8>);

/// UDP implementation of [`Transport`]
pub struct UdpTransport {
    local_addr: SocketAddr,
    clients: ClientManager,
    timeout: Duration,
    inbound_rx: mpsc::UnboundedReceiver<Datagram>,
    outbound_tx: mpsc::UnboundedSender<Datagram>,
    running: Arc<AtomicBool>,
}

impl UdpTransport {
    pub async fn bind(addr: &str, max_clients: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        Self::spawn_network_receiver(Arc::clone(&socket), inbound_tx, Arc::clone(&running));
        Self::spawn_network_sender(socket, outbound_rx);

        Ok(Self {
            local_addr,
            clients: ClientManager::new(max_clients),
            timeout: CLIENT_TIMEOUT,
            inbound_rx,
            outbound_tx,
            running,
        })
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(
        socket: Arc<UdpSocket>,
        inbound_tx: mpsc::UnboundedSender<Datagram>,
        running: Arc<AtomicBool>,
    ) {
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if inbound_tx.send((addr, buffer[..len].to_vec())).is_err() {
                            debug!("Game side gone, stopping receiver");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });
    }

    /// Spawns task that processes the outgoing datagram queue
    fn spawn_network_sender(socket: Arc<UdpSocket>, mut outbound_rx: mpsc::UnboundedReceiver<Datagram>) {
        tokio::spawn(async move {
            while let Some((addr, bytes)) = outbound_rx.recv().await {
                if let Err(e) = socket.send_to(&bytes, addr).await {
                    error!("Failed to send datagram to {}: {}", addr, e);
                }
            }
        });
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Overrides how long a silent peer is kept.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    fn queue(&self, addr: SocketAddr, bytes: Vec<u8>) {
        if self.outbound_tx.send((addr, bytes)).is_err() {
            error!("Failed to queue datagram for {}: sender task stopped", addr);
        }
    }

    /// Turns away a peer the address book has no room for.
    fn refuse(&self, addr: SocketAddr) {
        let packet = Packet::Disconnected {
            reason: "Server full".to_string(),
        };
        match encode(&packet) {
            Ok(bytes) => self.queue(addr, bytes),
            Err(e) => error!("Failed to encode refusal: {}", e),
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, destination: Destination, bytes: Vec<u8>) {
        match destination {
            Destination::Connection(id) => match self.clients.addr_of(id) {
                Some(addr) => self.queue(addr, bytes),
                None => debug!("Dropping datagram for closed connection {}", id),
            },
            Destination::Broadcast => {
                for (_, addr) in self.clients.get_client_addrs() {
                    self.queue(addr, bytes.clone());
                }
            }
        }
    }

    fn poll_received(&mut self) -> Vec<(ConnectionId, Vec<u8>)> {
        let mut received = Vec::new();

        while let Ok((addr, bytes)) = self.inbound_rx.try_recv() {
            let id = match self.clients.find_client_by_addr(addr) {
                Some(id) => id,
                None => match self.clients.add_client(addr) {
                    Some(id) => id,
                    None => {
                        warn!("Refusing datagram from {}: server full", addr);
                        self.refuse(addr);
                        continue;
                    }
                },
            };
            self.clients.touch(id);
            received.push((id, bytes));
        }

        received
    }

    fn connection_status(&self, id: ConnectionId) -> ConnectionStatus {
        if self.clients.contains(id) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn poll_disconnected(&mut self) -> Vec<ConnectionId> {
        self.clients.check_timeouts(self.timeout)
    }

    fn disconnect(&mut self, id: ConnectionId) {
        self.clients.remove_client(id);
    }
}

/// Main server coordinating networking and game simulation
pub struct Server {
    game: Game,
    scheduler: Scheduler<SystemClock>,
    transport: UdpTransport,
    settings: GameSettings,
}

impl Server {
    pub async fn new(
        addr: &str,
        settings: GameSettings,
        seed: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        settings.validate()?;

        // One spare slot so a full game can still answer newcomers itself
        let transport = UdpTransport::bind(addr, settings.max_clients + 1).await?;
        let scheduler = Scheduler::new(
            SystemClock::new(),
            settings.tick,
            settings.high_delay,
            settings.serious_delay,
        );

        Ok(Server {
            game: Game::new(settings.clone(), seed),
            scheduler,
            transport,
            settings,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    /// Loads the arena and ruleset off the game task, then waits for them.
    async fn load_assets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (cols, rows) = (self.settings.map_cols, self.settings.map_rows);
        let loader = tokio::task::spawn_blocking(move || {
            (GridMap::arena(cols, rows, CELL_SIZE, CELL_SIZE), Ruleset::standard())
        });

        self.scheduler
            .wait_until_ready(|| loader.is_finished())
            .await;
        let (grid, ruleset) = loader.await?;

        self.game.load_map(grid);
        self.game.load_ruleset(ruleset, WeaponRestrictions::new());
        Ok(())
    }

    /// Main server loop
    ///
    /// Runs until the game stops itself or the socket tasks die.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.game.host(!self.settings.dedicated);
        self.load_assets().await?;

        let mut frame_interval = interval(self.settings.min_frame_time().max(Duration::from_millis(1)));
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.scheduler.start();

        info!("Server started successfully");

        loop {
            frame_interval.tick().await;

            let report = self.scheduler.frame(&mut self.game, &mut self.transport);
            for event in self.game.take_events() {
                debug!("Game event: {:?}", event);
            }

            if self.scheduler.high_simulation_delay() {
                debug!(
                    "Frame took {:?}, simulation lagging at frame {}",
                    report.delta, report.server_frame
                );
            }

            if self.game.state() == SessionState::Inactive {
                info!("Server shutting down");
                break;
            }
            if !self.transport.is_running() {
                return Err("network receiver stopped".into());
            }
        }

        Ok(())
    }
}
