//! Host simulation of the hotspot BLE peripheral.
//!
//! Runs the real event loop with a logging link transport and a fake hotspot
//! that comes up on the second credential fetch, then plays a peer session
//! against it: connect, subscribe, a junk write, enable, wait for the
//! credentials, disable, disconnect.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug HOTSPOT_BLE_RETRY_BASE_MS=500 cargo run --bin host-sim
//! ```

use hotspot_ble::credentials::FetchResult;
use hotspot_ble::link::{AdvertisementData, AdvertisingBackend, TransportError};
use hotspot_ble::protocol::CCCD_UUID;
use hotspot_ble::{
    event_channel, AdvertiseError, Advertiser, CredentialPair, CredentialSource, LinkTransport,
    LogListener, PeerId, PeripheralConfig, PeripheralHandle, PeripheralRuntime, RuntimeClosed,
    WriteRequest, MAX_ATTEMPTS,
};
use log::{error, info};
use std::time::Duration;

const SIM_PEER: &str = "5C:F3:70:00:00:01";
const SIM_MTU: u16 = 185;

/// Prints what would go over the air.
struct SimTransport;

impl LinkTransport for SimTransport {
    fn notify(&mut self, peer: &PeerId, value: &[u8]) -> Result<(), TransportError> {
        info!("[air] notify {} ({} bytes)", peer, value.len());
        Ok(())
    }

    fn send_response(&mut self, peer: &PeerId, att_code: u8) -> Result<(), TransportError> {
        info!("[air] write response to {}: {:#04x}", peer, att_code);
        Ok(())
    }
}

struct SimAdvertising;

impl AdvertisingBackend for SimAdvertising {
    fn start_advertising(&mut self, data: &AdvertisementData) -> Result<(), AdvertiseError> {
        info!("[air] advertising {:?}", data.device_name);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), AdvertiseError> {
        info!("[air] advertising off");
        Ok(())
    }
}

/// Hotspot that is not up on the first fetch.
fn sim_hotspot() -> impl FnMut() -> FetchResult {
    let mut fetches = 0u32;
    move || {
        fetches += 1;
        if fetches == 1 {
            Ok(None)
        } else {
            Ok(Some(CredentialPair::new("SimNet", "sim-pass-123")))
        }
    }
}

async fn peer_session(
    handle: &PeripheralHandle,
    config: &PeripheralConfig,
) -> Result<(), RuntimeClosed> {
    let peer = PeerId::from(SIM_PEER);

    handle.connect(peer.clone()).await?;
    handle.mtu_changed(peer.clone(), SIM_MTU).await?;
    handle
        .descriptor_write(peer.clone(), CCCD_UUID, vec![0x01, 0x00])
        .await?;

    let ack = handle.write(WriteRequest::command(peer.clone(), [0x42])).await?;
    info!("Junk byte answered with {:?} ({})", ack, ack.status());

    let ack = handle.write(WriteRequest::command(peer.clone(), [0x01])).await?;
    info!("Enable answered with {:?}", ack);

    // Long enough for every attempt of one sequence
    let total: u32 = (1..=u32::from(MAX_ATTEMPTS)).sum();
    tokio::time::sleep(config.retry.base_delay * total + Duration::from_millis(200)).await;

    let ack = handle.write(WriteRequest::command(peer.clone(), [0x00])).await?;
    info!("Disable answered with {:?}", ack);

    handle.disconnect(peer).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== Hotspot BLE host simulation ===");

    let config = match PeripheralConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Device {:?}, retry base {:?}",
        config.device_name, config.retry.base_delay
    );

    let mut advertiser = Advertiser::new(
        SimAdvertising,
        AdvertisementData::for_service(config.device_name.clone()),
    );
    if let Err(e) = advertiser.start() {
        error!("Advertising failed: {}", e);
    }

    let source = CredentialSource::probe(
        true,
        || Box::new(sim_hotspot()),
        || Box::new(|| -> FetchResult { Ok(None) }),
    );
    let (handle, queue) = event_channel(config.event_queue_depth);
    let runtime = PeripheralRuntime::new(&config, queue, SimTransport, source, LogListener);

    let driver = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            result = peer_session(&handle, &config) => {
                if let Err(e) = result {
                    error!("Session aborted: {}", e);
                }
            }
        }
        handle.shutdown();
    };

    let (peripheral, ()) = tokio::join!(runtime.run(), driver);
    info!("Final status: {:?}", peripheral.status());

    if let Err(e) = advertiser.stop() {
        error!("Advertising stop failed: {}", e);
    }
    info!("Simulation complete");
}
