//! Hotspot credential pair and its validation rules.
//!
//! # Example
//!
//! ```
//! use hotspot_ble::credentials::{validate, CredentialPair, InvalidReason, Validation};
//!
//! let pair = CredentialPair::new("HomeAP", "hunter22");
//! assert!(validate(&pair).is_valid());
//!
//! let short = CredentialPair::new("HomeAP", "1234567");
//! assert_eq!(validate(&short), Validation::Invalid(InvalidReason::PasswordTooShort));
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11. Longer SSIDs are only warned about.
pub const MAX_SSID_LEN: usize = 32;

/// Minimum WPA2 pre-shared key length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hotspot SSID and password as reported by the platform.
///
/// Zeroed on drop. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CredentialPair {
    /// Network name.
    pub ssid: String,
    /// Pre-shared key.
    pub password: String,
}

impl CredentialPair {
    /// Create a pair without validating it.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hard rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// SSID is empty.
    EmptySsid,
    /// Password shorter than [`MIN_PASSWORD_LEN`].
    PasswordTooShort,
    /// SSID or password contains U+0000.
    ContainsNullByte,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySsid => write!(f, "SSID is empty"),
            Self::PasswordTooShort => {
                write!(f, "password shorter than {} characters", MIN_PASSWORD_LEN)
            }
            Self::ContainsNullByte => write!(f, "credentials contain a null byte"),
        }
    }
}

impl std::error::Error for InvalidReason {}

/// Soft findings that are logged but do not block delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationWarning {
    /// SSID longer than the 802.11 limit.
    SsidTooLong { len: usize, max: usize },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID is {} bytes (802.11 max {})", len, max)
            }
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Safe to send; may carry soft warnings.
    Valid { warnings: Vec<ValidationWarning> },
    /// Must not be sent.
    Invalid(InvalidReason),
}

impl Validation {
    /// True for [`Validation::Valid`], regardless of warnings.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Judge whether a fetched pair is well-formed enough to send to a peer.
///
/// Checks run in a fixed order and the first hard failure wins:
/// empty SSID, short password, then embedded null bytes.
pub fn validate(pair: &CredentialPair) -> Validation {
    if pair.ssid.is_empty() {
        return Validation::Invalid(InvalidReason::EmptySsid);
    }
    if pair.password.chars().count() < MIN_PASSWORD_LEN {
        return Validation::Invalid(InvalidReason::PasswordTooShort);
    }
    if pair.ssid.contains('\0') || pair.password.contains('\0') {
        return Validation::Invalid(InvalidReason::ContainsNullByte);
    }

    let mut warnings = Vec::new();
    if pair.ssid.len() > MAX_SSID_LEN {
        warnings.push(ValidationWarning::SsidTooLong {
            len: pair.ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    Validation::Valid { warnings }
}
