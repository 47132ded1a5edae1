//! Single-slot tracking of the connected peer.
//!
//! Only one peer is served at a time. A connect overwrites whatever was there
//! (last writer wins); a disconnect only clears the slot if it names the peer
//! currently held.

use crate::protocol::Subscription;
use log::{debug, info};
use std::fmt;

/// Default ATT MTU before any exchange.
pub const DEFAULT_ATT_MTU: u16 = 23;

/// ATT notification header (opcode + handle).
const ATT_NOTIFY_HEADER: u16 = 3;

/// Identity of a remote peer as reported by the radio stack (its address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Per-connection state for the tracked peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLink {
    /// Who is connected.
    pub peer: PeerId,
    /// Last value written to the CCCD.
    pub subscription: Subscription,
    /// Negotiated ATT MTU.
    pub mtu: u16,
}

impl PeerLink {
    fn new(peer: PeerId) -> Self {
        Self {
            peer,
            subscription: Subscription::Disabled,
            mtu: DEFAULT_ATT_MTU,
        }
    }

    /// Largest value a single notification can carry on this link.
    pub fn max_notify_payload(&self) -> usize {
        usize::from(self.mtu.saturating_sub(ATT_NOTIFY_HEADER))
    }
}

/// Records which single peer is connected.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connected: Option<PeerLink>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `peer`, replacing any previous peer without reconciliation.
    pub fn on_connect(&mut self, peer: PeerId) {
        if let Some(previous) = &self.connected {
            if previous.peer != peer {
                info!("Peer {} replaces {}", peer, previous.peer);
            }
        } else {
            info!("Peer {} connected", peer);
        }
        self.connected = Some(PeerLink::new(peer));
    }

    /// Clear the slot if `peer` is the tracked one.
    ///
    /// Returns `false` for a stale or unknown peer; that is not an error.
    pub fn on_disconnect(&mut self, peer: &PeerId) -> bool {
        match &self.connected {
            Some(link) if &link.peer == peer => {
                info!("Peer {} disconnected", peer);
                self.connected = None;
                true
            }
            Some(link) => {
                debug!("Ignoring disconnect from {} (tracking {})", peer, link.peer);
                false
            }
            None => {
                debug!("Ignoring disconnect from {} (nothing tracked)", peer);
                false
            }
        }
    }

    /// Record a CCCD write. Returns `false` if `peer` is not tracked.
    pub fn on_subscription(&mut self, peer: &PeerId, subscription: Subscription) -> bool {
        match self.link_mut(peer) {
            Some(link) => {
                debug!("Peer {} subscription: {:?}", peer, subscription);
                link.subscription = subscription;
                true
            }
            None => false,
        }
    }

    /// Record a negotiated MTU. Returns `false` if `peer` is not tracked.
    pub fn on_mtu_changed(&mut self, peer: &PeerId, mtu: u16) -> bool {
        match self.link_mut(peer) {
            Some(link) => {
                debug!("Peer {} MTU {}", peer, mtu);
                link.mtu = mtu;
                true
            }
            None => false,
        }
    }

    /// The tracked peer, if any.
    pub fn connected(&self) -> Option<&PeerId> {
        self.connected.as_ref().map(|link| &link.peer)
    }

    /// Full link state for the tracked peer.
    pub fn link(&self) -> Option<&PeerLink> {
        self.connected.as_ref()
    }

    /// Whether `peer` is the one currently tracked.
    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected() == Some(peer)
    }

    fn link_mut(&mut self, peer: &PeerId) -> Option<&mut PeerLink> {
        self.connected.as_mut().filter(|link| &link.peer == peer)
    }
}
