//! Peer Registry
//!
//! In-memory list of peer addresses announced through the HTTP API.
//! Mutation and reads go through the surrounding lock; each access
//! holds it only for the duration of an append or a snapshot.

/// Registry of announced peer addresses
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Vec<String>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a peer address
    pub fn add(&mut self, addr: String) {
        self.peers.push(addr);
    }

    /// Snapshot of all registered addresses, in announcement order
    pub fn list(&self) -> Vec<String> {
        self.peers.clone()
    }

    /// Number of registered addresses
    pub fn count(&self) -> usize {
        self.peers.len()
    }
}
