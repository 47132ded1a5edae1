//! Hotspot credentials: the pair, its validation, and where it comes from.
//!
//! # Components
//!
//! - [`pair`] - `CredentialPair` and the pure `validate` function
//! - [`source`] - primary/legacy credential source strategy

mod pair;
mod source;

pub use pair::{
    validate, CredentialPair, InvalidReason, Validation, ValidationWarning, MAX_SSID_LEN,
    MIN_PASSWORD_LEN,
};
pub use source::{CredentialSource, FetchCredentials, FetchResult, SourceError, SourceKind};
