//! Wire protocol for the hotspot command channel.
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: Hotspot Control
//! └── Command (Read, Write, Notify)
//!     ├── write: 1-byte command (0x01 enable, 0x00 disable)
//!     ├── notify: {"ssid":"...","password":"..."} after enable
//!     └── CCCD (0x2902) - peer subscribes to notifications here
//! ```
//!
//! Only the first byte of a write is interpreted. Any byte other than the two
//! command values is ignored and never dispatched.

use std::fmt;
use uuid::Uuid;

/// Hotspot control service.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x5a1c_0001_7b3e_4f0d_9c62_a8e4_1d0b_93f7);

/// Command/notify characteristic.
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0x5a1c_0002_7b3e_4f0d_9c62_a8e4_1d0b_93f7);

/// Client Characteristic Configuration Descriptor (0x2902 on the Bluetooth base UUID).
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// Command byte: enable the hotspot and deliver its credentials.
pub const CMD_ENABLE: u8 = 0x01;

/// Command byte: disable the hotspot.
pub const CMD_DISABLE: u8 = 0x00;

/// ATT status: success.
pub const ATT_SUCCESS: u8 = 0x00;

/// ATT status: request not supported (unrecognised command byte).
pub const ATT_REQUEST_NOT_SUPPORTED: u8 = 0x06;

/// ATT status: invalid attribute value length (empty write).
pub const ATT_INVALID_LENGTH: u8 = 0x0D;

/// ATT status: unlikely error (write landed on the wrong attribute).
pub const ATT_UNLIKELY_ERROR: u8 = 0x0E;

/// ATT status: insufficient resources (event queue full).
pub const ATT_INSUFFICIENT_RESOURCES: u8 = 0x11;

/// A command received on the command characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Turn the hotspot on and start the credential handshake.
    Enable,
    /// Turn the hotspot off.
    Disable,
}

impl Command {
    /// Decode a command byte. Returns `None` for anything but 0x00/0x01.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_ENABLE => Some(Self::Enable),
            CMD_DISABLE => Some(Self::Disable),
            _ => None,
        }
    }

    /// Wire value of this command.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Enable => CMD_ENABLE,
            Self::Disable => CMD_DISABLE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "enable"),
            Self::Disable => write!(f, "disable"),
        }
    }
}

/// Why a write was rejected before its payload was looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The write targeted an attribute other than the command characteristic.
    WrongChannel,
    /// The write carried no bytes.
    EmptyPayload,
}

/// Result of handling a write on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// A command was recognised and dispatched.
    Accepted(Command),
    /// Right channel, but the byte is not a command. Nothing was dispatched.
    Ignored(u8),
    /// Wrong channel or empty payload.
    Rejected(RejectReason),
}

impl AckOutcome {
    /// Status returned to a peer that asked for a write response.
    ///
    /// Ignored writes are answered with a failure so the peer can tell an
    /// unknown command apart from a dispatched one.
    pub fn status(&self) -> AckStatus {
        match self {
            Self::Accepted(_) => AckStatus::Success,
            Self::Ignored(_) | Self::Rejected(_) => AckStatus::Failure,
        }
    }

    /// ATT status code carried in the write response.
    pub fn att_code(&self) -> u8 {
        match self {
            Self::Accepted(_) => ATT_SUCCESS,
            Self::Ignored(_) => ATT_REQUEST_NOT_SUPPORTED,
            Self::Rejected(RejectReason::EmptyPayload) => ATT_INVALID_LENGTH,
            Self::Rejected(RejectReason::WrongChannel) => ATT_UNLIKELY_ERROR,
        }
    }
}

/// Success/failure acknowledgment sent back for a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Success,
    Failure,
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Value a peer writes to the CCCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// `00 00`
    Disabled,
    /// `01 00`
    Notify,
    /// `02 00`
    Indicate,
}

impl Subscription {
    /// Decode a little-endian CCCD value.
    pub fn from_cccd(value: &[u8]) -> Option<Self> {
        match value {
            [0x00, 0x00] => Some(Self::Disabled),
            [0x01, 0x00] => Some(Self::Notify),
            [0x02, 0x00] => Some(Self::Indicate),
            _ => None,
        }
    }

    /// Whether pushes will reach the peer.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}
