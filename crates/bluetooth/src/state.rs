//! Link state tracker.
//!
//! Tracks the connected central and whether the storage task has
//! acknowledged the suspend request for this connection. Requests are only
//! served once both hold.

use platform::PeerAddress;

/// Connection bookkeeping for the transfer task.
#[derive(Debug, Default)]
pub struct LinkState {
    peer: Option<PeerAddress>,
    storage_released: bool,
    connections: u32,
}

impl LinkState {
    /// Create a new, disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection from `address`. Storage must be released again
    /// for every new connection.
    pub fn on_connected(&mut self, address: PeerAddress) {
        self.peer = Some(address);
        self.storage_released = false;
        self.connections = self.connections.saturating_add(1);
    }

    /// Record that the peer has gone.
    pub fn on_disconnected(&mut self) {
        self.peer = None;
        self.storage_released = false;
    }

    /// Storage has closed its handles and suspended.
    pub fn on_storage_released(&mut self) {
        if self.peer.is_some() {
            self.storage_released = true;
        }
    }

    /// Returns `true` if a peer is currently connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.peer.is_some()
    }

    /// Returns the peer's address, or `None` when disconnected.
    #[must_use]
    pub fn peer_address(&self) -> Option<PeerAddress> {
        self.peer
    }

    /// Connected and storage released: requests may touch the medium.
    #[must_use]
    pub fn ready_to_serve(&self) -> bool {
        self.peer.is_some() && self.storage_released
    }

    /// Connections seen since boot.
    #[must_use]
    pub fn connections(&self) -> u32 {
        self.connections
    }
}
