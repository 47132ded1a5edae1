//! Where hotspot credentials come from.
//!
//! The platform exposes the running hotspot's SSID and password through one of
//! two paths. The strategy is chosen once at startup by probing what the
//! platform supports, never re-decided per fetch.

use super::pair::CredentialPair;
use log::{debug, warn};
use std::fmt;

/// Result of asking a backend for the current pair.
pub type FetchResult = Result<Option<CredentialPair>, SourceError>;

/// Something that can report the current hotspot credentials.
///
/// `Ok(None)` means the hotspot is not up yet. Both that and `Err` are
/// transient from the retry sequence's point of view.
pub trait FetchCredentials {
    fn fetch(&mut self) -> FetchResult;
}

impl<F> FetchCredentials for F
where
    F: FnMut() -> FetchResult,
{
    fn fetch(&mut self) -> FetchResult {
        self()
    }
}

/// Failure reported by a credential backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The backend is not usable on this platform build.
    Unsupported(String),
    /// The platform call failed.
    Platform(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(msg) => write!(f, "credential source unsupported: {}", msg),
            Self::Platform(msg) => write!(f, "credential source failed: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// Which backend a [`CredentialSource`] is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Primary,
    LegacyFallback,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::LegacyFallback => write!(f, "legacy-fallback"),
        }
    }
}

/// Credential source strategy, selected once by [`CredentialSource::probe`].
pub enum CredentialSource {
    /// Official platform API for reading the local hotspot configuration.
    Primary(Box<dyn FetchCredentials>),
    /// Best-effort path for platforms without the official API. It reads
    /// undocumented platform state and may break on any OS update; treat
    /// every result from it as unverified.
    LegacyFallback(Box<dyn FetchCredentials>),
}

impl CredentialSource {
    /// Pick the backend based on a capability probe.
    ///
    /// Only the chosen constructor is invoked.
    pub fn probe<P, L>(primary_supported: bool, primary: P, fallback: L) -> Self
    where
        P: FnOnce() -> Box<dyn FetchCredentials>,
        L: FnOnce() -> Box<dyn FetchCredentials>,
    {
        if primary_supported {
            debug!("Credential source: primary API");
            Self::Primary(primary())
        } else {
            warn!("Credential source: primary API unavailable, using legacy fallback");
            Self::LegacyFallback(fallback())
        }
    }

    /// Which backend is in use.
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Primary(_) => SourceKind::Primary,
            Self::LegacyFallback(_) => SourceKind::LegacyFallback,
        }
    }

    /// Ask the backend for the current pair.
    ///
    /// Errors are logged and folded into `None`.
    pub fn fetch(&mut self) -> Option<CredentialPair> {
        let kind = self.kind();
        let backend = match self {
            Self::Primary(backend) | Self::LegacyFallback(backend) => backend,
        };
        match backend.fetch() {
            Ok(Some(pair)) => Some(pair),
            Ok(None) => {
                debug!("Credential source ({}) has no pair yet", kind);
                None
            }
            Err(e) => {
                warn!("Credential source ({}) error: {}", kind, e);
                None
            }
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialSource").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(ssid: &'static str) -> Box<dyn FetchCredentials> {
        Box::new(move || -> FetchResult { Ok(Some(CredentialPair::new(ssid, "password123"))) })
    }

    #[test]
    fn test_probe_prefers_primary() {
        let mut source = CredentialSource::probe(true, || fixed("primary"), || fixed("legacy"));
        assert_eq!(source.kind(), SourceKind::Primary);
        assert_eq!(source.fetch().unwrap().ssid, "primary");
    }

    #[test]
    fn test_probe_falls_back() {
        let mut source = CredentialSource::probe(false, || fixed("primary"), || fixed("legacy"));
        assert_eq!(source.kind(), SourceKind::LegacyFallback);
        assert_eq!(source.fetch().unwrap().ssid, "legacy");
    }

    #[test]
    fn test_probe_only_builds_chosen_backend() {
        let _source = CredentialSource::probe(
            true,
            || fixed("primary"),
            || panic!("fallback must not be constructed"),
        );
    }

    #[test]
    fn test_error_is_treated_as_absent() {
        let mut source = CredentialSource::Primary(Box::new(|| -> FetchResult {
            Err(SourceError::Platform("hotspot service not bound".into()))
        }));
        assert!(source.fetch().is_none());
    }

    #[test]
    fn test_not_ready_is_absent() {
        let mut source = CredentialSource::Primary(Box::new(|| -> FetchResult { Ok(None) }));
        assert!(source.fetch().is_none());
    }
}
