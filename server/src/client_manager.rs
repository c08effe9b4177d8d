//! Address book of the UDP transport
//!
//! Maps peer socket addresses to connection IDs, enforces the connection limit
//! and notices peers that went silent. The game itself only ever sees
//! connection IDs.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Peers silent for longer than this are dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A remote peer known to the transport
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any datagram from this peer
    pub last_seen: Instant,
    /// Datagrams received from this peer
    pub packets_received: u64,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            packets_received: 0,
        }
    }

    /// Records activity from the peer.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.packets_received += 1;
    }

    /// Returns true if nothing was heard from the peer within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all peers known to the transport
///
/// IDs are never reused while the server runs, so a late datagram from a dropped
/// peer cannot be mistaken for one from its successor.
pub struct ClientManager {
    /// Known peers indexed by connection ID
    clients: HashMap<ConnectionId, Client>,
    /// Next available connection ID
    next_client_id: ConnectionId,
    /// Maximum number of concurrent peers allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to register a new peer
    ///
    /// Returns the new connection ID, or None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        // Enforce server capacity limits
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Connection {} opened from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Forgets a peer. Returns false if it was already gone.
    pub fn remove_client(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Connection {} closed ({})", client.id, client.addr);
            true
        } else {
            false
        }
    }

    /// Finds a connection ID by network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: ConnectionId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|c| c.addr)
    }

    pub fn contains(&self, client_id: ConnectionId) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Marks a peer as alive. Returns false for unknown IDs.
    pub fn touch(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
            true
        } else {
            false
        }
    }

    /// Removes peers that have been silent longer than `timeout`
    ///
    /// Returns the removed connection IDs so the game can clean up after them.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        // Remove timed-out clients
        for client_id in &timed_out {
            self.remove_client(*client_id);
        }

        timed_out
    }

    /// All connection IDs with their addresses, used to fan out broadcasts
    pub fn get_client_addrs(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently known peers
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.packets_received, 0);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        client.touch();
        assert!(!client.is_timed_out(Duration::from_secs(1)));
        assert_eq!(client.packets_received, 1);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut manager = ClientManager::new(2);
        let first = manager.add_client(test_addr()).unwrap();
        assert!(manager.remove_client(first));
        assert!(!manager.remove_client(first));

        let second = manager.add_client(test_addr()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));
        assert_eq!(manager.addr_of(client_id1), Some(test_addr()));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_check_timeouts() {
        let mut manager = ClientManager::new(2);
        let stale = manager.add_client(test_addr()).unwrap();
        let fresh = manager.add_client(test_addr2()).unwrap();
        manager.clients.get_mut(&stale).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        assert_eq!(manager.check_timeouts(CLIENT_TIMEOUT), vec![stale]);
        assert!(manager.contains(fresh));
        assert!(!manager.touch(stale));
    }
}
