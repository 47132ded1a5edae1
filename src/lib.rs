//! Hotspot BLE peripheral library.
//!
//! A BLE peripheral that accepts a one-byte enable/disable command, then
//! fetches the local hotspot's credentials with bounded retries and notifies
//! them back to the requesting peer as JSON.
//!
//! Everything except [`ble`] is platform-independent and tested on the host.

pub mod config;
pub mod credentials;
pub mod link;
pub mod peripheral;
pub mod protocol;
pub mod retry;
pub mod runtime;

#[cfg(feature = "esp32")]
pub mod ble;

#[cfg(test)]
mod testutil;

// Re-export commonly used items
pub use config::{ConfigError, PeripheralConfig, RetryConfig};
pub use credentials::{validate, CredentialPair, CredentialSource, InvalidReason, Validation};
pub use link::{AdvertiseError, Advertiser, AdvertiserState, DeliveryError, LinkTransport, PeerId};
pub use peripheral::{LogListener, Peripheral, PeripheralListener, PeripheralStatus, WriteRequest};
pub use protocol::{AckOutcome, AckStatus, Command};
pub use retry::{CredentialFailure, SequenceOutcome, MAX_ATTEMPTS};
pub use runtime::{
    event_channel, ForwardError, LinkEvent, PeripheralHandle, PeripheralRuntime, RuntimeClosed,
};
