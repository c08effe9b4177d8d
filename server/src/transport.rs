//! Packet channel between the authority and its peers
//!
//! The game never touches sockets directly. It reads whatever datagrams are already
//! queued and hands outgoing bytes to the transport, which buffers them itself.

use shared::{encode, ConnectionId, ConnectionStatus, Packet};
use std::collections::{BTreeMap, VecDeque};

/// Where an outgoing packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Connection(ConnectionId),
    Broadcast,
}

pub trait Transport {
    /// Queues bytes for delivery. Never blocks.
    fn send(&mut self, destination: Destination, bytes: Vec<u8>);

    /// Drains every datagram received since the last call. Never blocks.
    fn poll_received(&mut self) -> Vec<(ConnectionId, Vec<u8>)>;

    fn connection_status(&self, id: ConnectionId) -> ConnectionStatus;

    /// True while the transport is bound and serving peers.
    fn is_running(&self) -> bool;

    /// Connections the transport dropped on its own, for example after a timeout.
    fn poll_disconnected(&mut self) -> Vec<ConnectionId> {
        Vec::new()
    }

    /// Forgets a connection after the game decided to drop it.
    fn disconnect(&mut self, id: ConnectionId);
}

/// In-process transport that records everything sent through it.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    inbound: VecDeque<(ConnectionId, Vec<u8>)>,
    sent: Vec<(Destination, Vec<u8>)>,
    connections: BTreeMap<ConnectionId, ConnectionStatus>,
    dropped: Vec<ConnectionId>,
    running: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Registers a peer and queues its packet as if it arrived over the wire.
    pub fn deliver(&mut self, from: ConnectionId, packet: &Packet) {
        self.connections
            .entry(from)
            .or_insert(ConnectionStatus::Connected);
        if let Ok(bytes) = encode(packet) {
            self.inbound.push_back((from, bytes));
        }
    }

    pub fn deliver_raw(&mut self, from: ConnectionId, bytes: Vec<u8>) {
        self.inbound.push_back((from, bytes));
    }

    /// Simulates the transport losing a peer.
    pub fn drop_connection(&mut self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            self.dropped.push(id);
        }
    }

    /// Decoded copies of everything sent so far, oldest first.
    pub fn sent_packets(&self) -> Vec<(Destination, Packet)> {
        self.sent
            .iter()
            .filter_map(|(dest, bytes)| shared::decode(bytes).ok().map(|p| (*dest, p)))
            .collect()
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, destination: Destination, bytes: Vec<u8>) {
        self.sent.push((destination, bytes));
    }

    fn poll_received(&mut self) -> Vec<(ConnectionId, Vec<u8>)> {
        self.inbound.drain(..).collect()
    }

    fn connection_status(&self, id: ConnectionId) -> ConnectionStatus {
        self.connections
            .get(&id)
            .copied()
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn poll_disconnected(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.dropped)
    }

    fn disconnect(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }
}
