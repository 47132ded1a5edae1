//! Radio link: who is connected, discoverability, and pushing values out.
//!
//! # Components
//!
//! - [`connection`] - single-slot connected peer tracking
//! - [`advertiser`] - advertising start/stop lifecycle
//! - [`notify`] - credential payload encoding and delivery

mod advertiser;
mod connection;
mod notify;

pub use advertiser::{
    AdvertisementData, AdvertiseError, Advertiser, AdvertiserState, AdvertisingBackend,
};
pub use connection::{ConnectionTracker, PeerId, PeerLink, DEFAULT_ATT_MTU};
pub use notify::{deliver, DeliveryError, LinkTransport, NotificationPayload, TransportError};
