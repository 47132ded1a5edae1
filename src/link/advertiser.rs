//! Advertising lifecycle: make the peripheral discoverable, or stop.
//!
//! Start failures are reported to the caller and never retried here; the
//! surrounding system decides whether to try again.

use crate::protocol::SERVICE_UUID;
use log::{info, warn};
use std::fmt;
use uuid::Uuid;

/// Payload placed in the advertisement / scan response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementData {
    /// Complete local name.
    pub device_name: String,
    /// Advertised 128-bit service.
    pub service_uuid: Uuid,
}

impl AdvertisementData {
    /// Advertisement for the hotspot control service.
    pub fn for_service(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            service_uuid: SERVICE_UUID,
        }
    }
}

/// Platform hook that actually drives the radio.
pub trait AdvertisingBackend {
    fn start_advertising(&mut self, data: &AdvertisementData) -> Result<(), AdvertiseError>;
    fn stop_advertising(&mut self) -> Result<(), AdvertiseError>;
}

/// Why advertising could not start or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseError {
    AlreadyStarted,
    DataTooLarge,
    FeatureUnsupported,
    InternalError,
    TooManyAdvertisers,
    /// The platform refused the radio operation for lack of permission.
    PermissionDenied,
    /// Any platform code not covered above.
    Unknown(i32),
}

// NimBLE host return codes (ble_hs.h)
const BLE_HS_EALREADY: i32 = 2;
const BLE_HS_EMSGSIZE: i32 = 4;
const BLE_HS_ENOTSUP: i32 = 8;
const BLE_HS_EOS: i32 = 11;
const BLE_HS_ECONTROLLER: i32 = 12;
const BLE_HS_EBUSY: i32 = 15;
const BLE_HS_EUNKNOWN: i32 = 17;
const BLE_HS_EAUTHOR: i32 = 24;

impl AdvertiseError {
    /// Map a NimBLE host return code from an advertising call.
    pub fn from_platform_code(code: i32) -> Self {
        match code {
            BLE_HS_EALREADY => Self::AlreadyStarted,
            BLE_HS_EMSGSIZE => Self::DataTooLarge,
            BLE_HS_ENOTSUP => Self::FeatureUnsupported,
            BLE_HS_EOS | BLE_HS_ECONTROLLER | BLE_HS_EUNKNOWN => Self::InternalError,
            BLE_HS_EBUSY => Self::TooManyAdvertisers,
            BLE_HS_EAUTHOR => Self::PermissionDenied,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for AdvertiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "advertising already started"),
            Self::DataTooLarge => write!(f, "advertisement data too large"),
            Self::FeatureUnsupported => write!(f, "advertising not supported by this radio"),
            Self::InternalError => write!(f, "internal radio error"),
            Self::TooManyAdvertisers => write!(f, "no advertising instance available"),
            Self::PermissionDenied => write!(f, "permission to advertise denied"),
            Self::Unknown(code) => write!(f, "unknown advertise error (code {})", code),
        }
    }
}

impl std::error::Error for AdvertiseError {}

/// Advertiser lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserState {
    Idle,
    Advertising,
}

/// Idle ↔ Advertising state machine over a platform backend.
pub struct Advertiser<B> {
    backend: B,
    data: AdvertisementData,
    state: AdvertiserState,
}

impl<B: AdvertisingBackend> Advertiser<B> {
    pub fn new(backend: B, data: AdvertisementData) -> Self {
        Self {
            backend,
            data,
            state: AdvertiserState::Idle,
        }
    }

    /// Begin advertising. A failure leaves the advertiser idle.
    pub fn start(&mut self) -> Result<(), AdvertiseError> {
        if self.state == AdvertiserState::Advertising {
            warn!("Advertising start requested while already advertising");
            return Err(AdvertiseError::AlreadyStarted);
        }

        match self.backend.start_advertising(&self.data) {
            Ok(()) => {
                info!(
                    "Advertising as {:?} (service {})",
                    self.data.device_name, self.data.service_uuid
                );
                self.state = AdvertiserState::Advertising;
                Ok(())
            }
            Err(e) => {
                warn!("Advertising failed to start: {}", e);
                self.state = AdvertiserState::Idle;
                Err(e)
            }
        }
    }

    /// Stop advertising. No-op when already idle.
    pub fn stop(&mut self) -> Result<(), AdvertiseError> {
        if self.state == AdvertiserState::Idle {
            return Ok(());
        }
        self.backend.stop_advertising()?;
        info!("Advertising stopped");
        self.state = AdvertiserState::Idle;
        Ok(())
    }

    pub fn state(&self) -> AdvertiserState {
        self.state
    }

    pub fn data(&self) -> &AdvertisementData {
        &self.data
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        starts: usize,
        stops: usize,
        fail_start: Option<AdvertiseError>,
    }

    impl AdvertisingBackend for FakeBackend {
        fn start_advertising(&mut self, _data: &AdvertisementData) -> Result<(), AdvertiseError> {
            self.starts += 1;
            match self.fail_start {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn stop_advertising(&mut self) -> Result<(), AdvertiseError> {
            self.stops += 1;
            Ok(())
        }
    }

    fn advertiser(backend: FakeBackend) -> Advertiser<FakeBackend> {
        Advertiser::new(backend, AdvertisementData::for_service("Hotspot"))
    }

    #[test]
    fn test_start_stop_cycle() {
        let mut adv = advertiser(FakeBackend::default());
        assert_eq!(adv.state(), AdvertiserState::Idle);

        adv.start().unwrap();
        assert_eq!(adv.state(), AdvertiserState::Advertising);

        adv.stop().unwrap();
        assert_eq!(adv.state(), AdvertiserState::Idle);
        assert_eq!(adv.backend().starts, 1);
        assert_eq!(adv.backend().stops, 1);
    }

    #[test]
    fn test_double_start_is_already_started() {
        let mut adv = advertiser(FakeBackend::default());
        adv.start().unwrap();
        assert_eq!(adv.start(), Err(AdvertiseError::AlreadyStarted));
        assert_eq!(adv.backend().starts, 1);
        assert_eq!(adv.state(), AdvertiserState::Advertising);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut adv = advertiser(FakeBackend::default());
        assert!(adv.stop().is_ok());
        assert_eq!(adv.backend().stops, 0);
    }

    #[test]
    fn test_failed_start_stays_idle_and_can_retry() {
        let mut adv = advertiser(FakeBackend {
            fail_start: Some(AdvertiseError::PermissionDenied),
            ..Default::default()
        });
        assert_eq!(adv.start(), Err(AdvertiseError::PermissionDenied));
        assert_eq!(adv.state(), AdvertiserState::Idle);

        // Manual retry by the caller goes back to the backend
        assert_eq!(adv.start(), Err(AdvertiseError::PermissionDenied));
        assert_eq!(adv.backend().starts, 2);
    }

    #[test]
    fn test_platform_codes() {
        assert_eq!(AdvertiseError::from_platform_code(2), AdvertiseError::AlreadyStarted);
        assert_eq!(AdvertiseError::from_platform_code(4), AdvertiseError::DataTooLarge);
        assert_eq!(AdvertiseError::from_platform_code(8), AdvertiseError::FeatureUnsupported);
        assert_eq!(AdvertiseError::from_platform_code(12), AdvertiseError::InternalError);
        assert_eq!(AdvertiseError::from_platform_code(15), AdvertiseError::TooManyAdvertisers);
        assert_eq!(AdvertiseError::from_platform_code(24), AdvertiseError::PermissionDenied);
        assert_eq!(AdvertiseError::from_platform_code(42), AdvertiseError::Unknown(42));
    }

    #[test]
    fn test_advertisement_uses_service_uuid() {
        let data = AdvertisementData::for_service("Hotspot");
        assert_eq!(data.service_uuid, SERVICE_UUID);
    }
}
