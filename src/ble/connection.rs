//! Connection bookkeeping.
//!
//! Tracks which centrals are currently connected to the peripheral. Membership
//! follows the radio stack's connect/disconnect events only; the registry never
//! infers a disconnection on its own.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

/// Opaque identifier of a connected central (its link-layer address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer identifier from the address reported by the radio stack.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as reported by the radio stack.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerId {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection state of a peer as reported by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Link being established.
    Connecting,
    /// Connected.
    Connected,
    /// Link being torn down.
    Disconnecting,
}

impl ConnectionState {
    /// Create from the radio stack's profile state code.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::Connected),
            3 => Some(Self::Disconnecting),
            _ => None,
        }
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

#[derive(Debug, Clone)]
struct PeerEntry {
    peer: PeerId,
    connected_at: DateTime<Utc>,
}

/// The set of currently connected peers.
///
/// Entries keep insertion order so fan-out iterates deterministically. All
/// access goes through one mutex: a snapshot is an atomic view, and
/// [`ConnectionRegistry::with_connected`] lets a caller act on a peer only while
/// it is still a member.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: Mutex<Vec<PeerEntry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection. Returns `false` if the peer was already present.
    pub fn on_connect(&self, peer: PeerId) -> bool {
        let mut peers = self.peers.lock();
        if peers.iter().any(|entry| entry.peer == peer) {
            debug!("Peer {} already registered", peer);
            return false;
        }

        debug!("Registering peer {}", peer);
        peers.push(PeerEntry {
            peer,
            connected_at: Utc::now(),
        });
        true
    }

    /// Record a disconnection. Returns `false` if the peer was not present.
    pub fn on_disconnect(&self, peer: &PeerId) -> bool {
        let mut peers = self.peers.lock();
        let before = peers.len();
        peers.retain(|entry| entry.peer != *peer);

        let removed = peers.len() != before;
        if removed {
            debug!("Removed peer {}", peer);
        }
        removed
    }

    /// Point-in-time copy of the members, in connection order.
    pub fn snapshot(&self) -> Vec<PeerId> {
        self.peers
            .lock()
            .iter()
            .map(|entry| entry.peer.clone())
            .collect()
    }

    /// Run `f` while holding the registry lock, only if `peer` is still connected.
    ///
    /// A disconnect event cannot be applied while `f` runs, so `f` never acts on
    /// a peer the registry has already dropped. `f` must not call back into the
    /// registry.
    pub fn with_connected<R>(&self, peer: &PeerId, f: impl FnOnce() -> R) -> Option<R> {
        let peers = self.peers.lock();
        if peers.iter().any(|entry| entry.peer == *peer) {
            Some(f())
        } else {
            None
        }
    }

    /// When the peer's current connection was registered.
    pub fn connected_since(&self, peer: &PeerId) -> Option<DateTime<Utc>> {
        self.peers
            .lock()
            .iter()
            .find(|entry| entry.peer == *peer)
            .map(|entry| entry.connected_at)
    }

    /// Remove every member and return them in connection order.
    pub fn drain(&self) -> Vec<PeerId> {
        self.peers
            .lock()
            .drain(..)
            .map(|entry| entry.peer)
            .collect()
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// Check if no peer is connected.
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}
