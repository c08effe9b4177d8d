use crate::game::ClientWorld;
use log::{debug, error, info, warn};
use shared::{audit_client, decode, encode, ConnectionStatus, Packet, SessionState, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant};

/// How often an unanswered Connect is repeated.
const CONNECT_RETRY: Duration = Duration::from_secs(1);
/// Give up if the server never answers.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    name: String,
    team: u8,
    status: ConnectionStatus,
    world: ClientWorld,

    /// Fire the active worm this often while playing, if set
    fire_interval: Option<Duration>,
    last_shot: Instant,
    aim: f32,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        name: &str,
        team: u8,
        fire_interval_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            name: name.to_string(),
            team,
            status: ConnectionStatus::Disconnected,
            world: ClientWorld::new(),
            fire_interval: (fire_interval_ms > 0).then(|| Duration::from_millis(fire_interval_ms)),
            last_shot: Instant::now(),
            aim: 0.0,
        })
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server {} as {}...", self.server_addr, self.name);
        self.status = ConnectionStatus::Connecting;

        let packet = Packet::Connect {
            client_version: shared::PROTOCOL_VERSION,
            name: self.name.clone(),
            team: self.team,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), Box<dyn std::error::Error>> {
        debug!("Received {}", packet.name());

        match &packet {
            Packet::Connected { .. } | Packet::ReturnToLobby => {
                self.status = ConnectionStatus::Connected;
            }
            Packet::BeginMatch => self.status = ConnectionStatus::Playing,
            Packet::Disconnected { .. } => self.status = ConnectionStatus::Disconnected,
            _ => {}
        }

        if let Some(reply) = self.world.apply(packet) {
            self.send_packet(&reply).await?;
        }
        Ok(())
    }

    /// Sends a shot for the active worm when the fire interval elapsed.
    async fn maybe_fire(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(every) = self.fire_interval else {
            return Ok(());
        };
        if self.world.state() != SessionState::Playing || self.last_shot.elapsed() < every {
            return Ok(());
        }
        let Some(worm_id) = self.world.active_worm() else {
            return Ok(());
        };

        self.aim = (self.aim + 15.0) % 90.0;
        self.last_shot = Instant::now();
        self.send_packet(&Packet::Shoot {
            worm_id,
            angle: self.aim,
            facing_left: worm_id % 2 == 1,
        })
        .await
    }

    fn audit(&self) {
        if let Some(mismatch) = audit_client(self.status, self.world.state()) {
            warn!("{}", mismatch);
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;
        let started = Instant::now();

        let mut retry_interval = interval(CONNECT_RETRY);
        let mut game_interval = interval(Duration::from_millis(shared::FIXED_FRAME_TIME_MS));
        let mut audit_interval = interval(Duration::from_secs(1));

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) if from == self.server_addr => match decode(&buffer[..len]) {
                            Ok(packet) => self.handle_packet(packet).await?,
                            Err(e) => warn!("Dropping malformed packet: {}", e),
                        },
                        Ok((_, from)) => debug!("Ignoring datagram from {}", from),
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = retry_interval.tick() => {
                    if self.status == ConnectionStatus::Connecting {
                        if started.elapsed() > CONNECT_TIMEOUT {
                            return Err("Server did not answer".into());
                        }
                        self.connect().await?;
                    }
                },

                _ = game_interval.tick() => {
                    self.maybe_fire().await?;
                },

                _ = audit_interval.tick() => self.audit(),
            }

            if self.status == ConnectionStatus::Disconnected {
                break;
            }
        }

        Ok(())
    }

    /// Tells the server we are leaving.
    pub async fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.status != ConnectionStatus::Disconnected {
            self.send_packet(&Packet::Disconnect).await?;
            self.status = ConnectionStatus::Disconnected;
            self.world.session.stop();
        }
        Ok(())
    }
}
