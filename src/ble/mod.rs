//! ESP32 radio glue (NimBLE).
//!
//! Only compiled with the `esp32` feature. Everything here adapts NimBLE
//! callbacks and calls onto the platform-independent peripheral.

mod gatt;

pub use gatt::{HotspotGattServer, NimbleAdvertising};
