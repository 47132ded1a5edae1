//! NimBLE GATT server for the hotspot control service.
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: Hotspot Control
//! └── Command (Read, Write, Notify)
//!     └── CCCD - managed by NimBLE, surfaced through on_subscribe
//! ```
//!
//! NimBLE callbacks run on the host task. They only translate and forward
//! into the peripheral event loop through a [`PeripheralHandle`]; all
//! decisions are made there.
//!
//! # Lock ordering
//!
//! The host task calls `on_write` and `on_subscribe` with the characteristic
//! mutex held, and the loop takes that same mutex to notify. So the host task
//! never waits on the loop: every forward is a `try_send`, and writes are
//! acked from [`WriteRequest::classify`] instead of a round-trip. The loop
//! may block on the characteristic; the host task may not block on the loop.

use crate::link::{
    AdvertisementData, AdvertiseError, AdvertisingBackend, LinkTransport, PeerId, TransportError,
    DEFAULT_ATT_MTU,
};
use crate::peripheral::WriteRequest;
use crate::protocol::{ATT_SUCCESS, CCCD_UUID, COMMAND_CHAR_UUID};
use crate::runtime::{LinkEvent, PeripheralHandle};
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEError, NimbleProperties,
    NimbleSub,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Same value as [`crate::protocol::SERVICE_UUID`], in NimBLE's form.
const SERVICE_BLE_UUID: BleUuid = uuid128!("5a1c0001-7b3e-4f0d-9c62-a8e41d0b93f7");

/// Same value as [`crate::protocol::COMMAND_CHAR_UUID`].
const COMMAND_BLE_UUID: BleUuid = uuid128!("5a1c0002-7b3e-4f0d-9c62-a8e41d0b93f7");

/// A live connection as last reported to the loop.
#[derive(Debug, Clone, Copy)]
struct Conn {
    handle: u16,
    mtu: u16,
}

/// Peer address to live connection.
type ConnTable = Arc<Mutex<HashMap<PeerId, Conn>>>;

/// The registered GATT server. Doubles as the peripheral's link transport and
/// advertising backend.
pub struct HotspotGattServer {
    command: Arc<NimbleMutex<BLECharacteristic>>,
    connections: ConnTable,
}

impl HotspotGattServer {
    /// Register the service and wire every callback to `handle`.
    pub fn register(handle: PeripheralHandle) -> Self {
        let device = BLEDevice::take();
        let server = device.get_server();
        let connections = ConnTable::default();

        let conns = connections.clone();
        let events = handle.clone();
        server.on_connect(move |_server, desc| {
            let peer = PeerId::new(desc.address().to_string());
            let mtu = desc.mtu();
            if let Ok(mut table) = conns.lock() {
                table.insert(
                    peer.clone(),
                    Conn {
                        handle: desc.conn_handle(),
                        mtu,
                    },
                );
            }
            if let Err(e) = events.try_connect(peer, mtu) {
                warn!("BLE connect dropped: {}", e);
            }
        });

        let conns = connections.clone();
        let events = handle.clone();
        server.on_disconnect(move |desc, reason| {
            let peer = PeerId::new(desc.address().to_string());
            debug!("Disconnect from {}: {:?}", peer, reason);
            if let Ok(mut table) = conns.lock() {
                table.remove(&peer);
            }
            forward(&events, LinkEvent::Disconnected(peer));
        });

        let service = server.create_service(SERVICE_BLE_UUID);
        let command = service.lock().create_characteristic(
            COMMAND_BLE_UUID,
            NimbleProperties::READ | NimbleProperties::WRITE | NimbleProperties::NOTIFY,
        );

        let conns = connections.clone();
        let events = handle.clone();
        command.lock().on_write(move |args| {
            let peer = PeerId::new(args.desc().address().to_string());
            forward_mtu(&conns, &events, &peer, args.desc().mtu());
            let request = WriteRequest {
                peer,
                characteristic: COMMAND_CHAR_UUID,
                value: args.recv_data().to_vec(),
                // NimBLE sends the ATT response itself once this returns
                response_needed: false,
            };
            let att_code = match events.try_write(request) {
                Ok(outcome) => outcome.att_code(),
                Err(e) => {
                    warn!("Dropping write: {}", e);
                    e.att_code()
                }
            };
            if att_code != ATT_SUCCESS {
                args.reject_with_error_code(att_code);
            }
        });

        let conns = connections.clone();
        let events = handle;
        command.lock().on_subscribe(move |_char, desc, sub| {
            let peer = PeerId::new(desc.address().to_string());
            // Clients exchange MTU before subscribing
            forward_mtu(&conns, &events, &peer, desc.mtu());
            let value: [u8; 2] = if sub.contains(NimbleSub::INDICATE) {
                [0x02, 0x00]
            } else if sub.contains(NimbleSub::NOTIFY) {
                [0x01, 0x00]
            } else {
                [0x00, 0x00]
            };
            forward(
                &events,
                LinkEvent::DescriptorWrite {
                    peer,
                    descriptor: CCCD_UUID,
                    value: value.to_vec(),
                    response_needed: false,
                },
            );
        });

        info!("Hotspot GATT service registered");
        Self {
            command,
            connections,
        }
    }

    fn conn_handle(&self, peer: &PeerId) -> Option<u16> {
        Some(self.connections.lock().ok()?.get(peer)?.handle)
    }
}

fn forward(handle: &PeripheralHandle, event: LinkEvent) {
    if let Err(e) = handle.try_send(event) {
        warn!("BLE event dropped: {}", e);
    }
}

/// Report `mtu` to the loop if it changed since the last report.
fn forward_mtu(conns: &ConnTable, handle: &PeripheralHandle, peer: &PeerId, mtu: u16) {
    let changed = match conns.lock() {
        Ok(mut table) => match table.get_mut(peer) {
            Some(conn) if conn.mtu != mtu => {
                conn.mtu = mtu;
                true
            }
            _ => false,
        },
        Err(_) => mtu != DEFAULT_ATT_MTU,
    };
    if changed {
        forward(
            handle,
            LinkEvent::MtuChanged {
                peer: peer.clone(),
                mtu,
            },
        );
    }
}

impl LinkTransport for HotspotGattServer {
    fn notify(&mut self, peer: &PeerId, value: &[u8]) -> Result<(), TransportError> {
        let conn_handle = self.conn_handle(peer).ok_or(TransportError::NotConnected)?;
        // Safe to wait here: host callbacks holding this lock never wait on us
        self.command
            .lock()
            .notify_with(value, conn_handle)
            .map_err(|e| TransportError::Rejected(format!("{:?}", e)))
    }

    fn send_response(&mut self, peer: &PeerId, att_code: u8) -> Result<(), TransportError> {
        // Write responses are produced inside the on_write callback
        debug!("ATT status {:#04x} for {} handled by NimBLE", att_code, peer);
        Ok(())
    }
}

/// Advertising through the shared NimBLE advertiser.
#[derive(Debug, Default)]
pub struct NimbleAdvertising;

impl AdvertisingBackend for NimbleAdvertising {
    fn start_advertising(&mut self, data: &AdvertisementData) -> Result<(), AdvertiseError> {
        let advertising = BLEDevice::take().get_advertising();
        advertising
            .lock()
            .set_data(
                BLEAdvertisementData::new()
                    .name(&data.device_name)
                    .add_service_uuid(SERVICE_BLE_UUID),
            )
            .map_err(advertise_error)?;
        advertising.lock().start().map_err(advertise_error)
    }

    fn stop_advertising(&mut self) -> Result<(), AdvertiseError> {
        BLEDevice::take()
            .get_advertising()
            .lock()
            .stop()
            .map_err(advertise_error)
    }
}

fn advertise_error(err: BLEError) -> AdvertiseError {
    AdvertiseError::from_platform_code(err.code() as i32)
}
