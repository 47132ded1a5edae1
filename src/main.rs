//! Hotspot BLE peripheral firmware binary.
//!
//! Credentials are baked in at build time through `HOTSPOT_SSID` and
//! `HOTSPOT_PASSWORD`; without them the board advertises but never has a
//! pair to hand out.

#[cfg(feature = "esp32")]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    use hotspot_ble::ble::{HotspotGattServer, NimbleAdvertising};
    use hotspot_ble::credentials::{FetchResult, SourceError};
    use hotspot_ble::link::AdvertisementData;
    use hotspot_ble::{
        event_channel, Advertiser, CredentialPair, CredentialSource, LogListener,
        PeripheralConfig, PeripheralRuntime,
    };
    use log::{error, info};

    info!("=== Hotspot BLE peripheral starting ===");

    let config = PeripheralConfig::default();
    let (handle, queue) = event_channel(config.event_queue_depth);
    let gatt = HotspotGattServer::register(handle);

    let baked = option_env!("HOTSPOT_SSID").zip(option_env!("HOTSPOT_PASSWORD"));
    let source = CredentialSource::probe(
        baked.is_some(),
        move || {
            Box::new(move || -> FetchResult {
                Ok(baked.map(|(ssid, password)| CredentialPair::new(ssid, password)))
            })
        },
        || {
            Box::new(|| -> FetchResult {
                Err(SourceError::Unsupported("no credentials compiled in".into()))
            })
        },
    );

    let mut advertiser = Advertiser::new(
        NimbleAdvertising,
        AdvertisementData::for_service(config.device_name.clone()),
    );
    if let Err(e) = advertiser.start() {
        // Not fatal: the event loop still runs and advertising can be retried
        error!("Advertising failed: {}", e);
    }

    let runtime = PeripheralRuntime::new(&config, queue, gatt, source, LogListener);
    runtime.run().await;

    if let Err(e) = advertiser.stop() {
        error!("Advertising stop failed: {}", e);
    }
    info!("Shutdown complete");
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-sim' to exercise the peripheral on the host.");
}
