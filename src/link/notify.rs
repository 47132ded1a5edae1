//! Credential delivery over the command characteristic.
//!
//! # Payload Format
//!
//! ```text
//! {"ssid":"<escaped>","password":"<escaped>"}
//! ```
//!
//! UTF-8, no whitespace. Escaping: `\\`, `\"`, `\n`, `\r`, `\t`, `\b`, `\f`
//! use short forms; any other character below U+0020 becomes `\u00xx`
//! (lower-case hex); everything else, including non-ASCII, passes through.
//! This is exactly serde_json's string escaping.

use super::connection::{ConnectionTracker, PeerId};
use crate::credentials::CredentialPair;
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Platform side of the link: push values and answer writes.
pub trait LinkTransport {
    /// Set the characteristic value to `value` and notify `peer`.
    fn notify(&mut self, peer: &PeerId, value: &[u8]) -> Result<(), TransportError>;

    /// Answer a write request that asked for a response with an ATT status code.
    fn send_response(&mut self, peer: &PeerId, att_code: u8) -> Result<(), TransportError>;
}

/// Lower-level send failure reported by the platform stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The stack refused the operation.
    Rejected(String),
    /// The connection handle is gone.
    NotConnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "stack rejected send: {}", msg),
            Self::NotConnected => write!(f, "connection handle no longer valid"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Why a credential delivery did not reach the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The target is not the tracked peer, or nothing is tracked.
    NoConnectedPeer,
    /// The payload could not be built.
    PayloadEncoding(String),
    /// The notify call itself failed.
    TransportRejected(TransportError),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConnectedPeer => write!(f, "no connected device"),
            Self::PayloadEncoding(msg) => write!(f, "payload encoding failed: {}", msg),
            Self::TransportRejected(_) => write!(f, "transport rejected notification"),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TransportRejected(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct WireCredentials<'a> {
    ssid: &'a str,
    password: &'a str,
}

/// Encoded notification bytes. Zeroed on drop since they hold the password.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct NotificationPayload(Vec<u8>);

impl NotificationPayload {
    /// Encode a validated pair.
    pub fn encode(pair: &CredentialPair) -> Result<Self, DeliveryError> {
        let wire = WireCredentials {
            ssid: &pair.ssid,
            password: &pair.password,
        };
        serde_json::to_vec(&wire)
            .map(Self)
            .map_err(|e| DeliveryError::PayloadEncoding(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NotificationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationPayload({} bytes)", self.0.len())
    }
}

/// Push `pair` to `peer`.
///
/// The tracked-peer check happens before any transport I/O. `pair` must
/// already have passed [`crate::credentials::validate`].
pub fn deliver<T: LinkTransport>(
    transport: &mut T,
    tracker: &ConnectionTracker,
    peer: &PeerId,
    pair: &CredentialPair,
) -> Result<(), DeliveryError> {
    let Some(link) = tracker.link().filter(|link| &link.peer == peer) else {
        warn!("Delivery to {} aborted: no connected device", peer);
        return Err(DeliveryError::NoConnectedPeer);
    };

    let payload = NotificationPayload::encode(pair)?;

    if !link.subscription.is_enabled() {
        warn!("Peer {} has not enabled notifications; sending anyway", peer);
    }
    if payload.len() > link.max_notify_payload() {
        warn!(
            "Payload is {} bytes but MTU {} carries {}; peer may see it truncated",
            payload.len(),
            link.mtu,
            link.max_notify_payload()
        );
    }

    transport.notify(peer, payload.as_bytes()).map_err(|e| {
        warn!("Notify to {} failed: {}", peer, e);
        DeliveryError::TransportRejected(e)
    })?;

    info!("Credentials for {:?} delivered to {}", pair.ssid, peer);
    Ok(())
}
