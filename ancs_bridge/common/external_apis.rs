use std::fmt;

use async_trait::async_trait;

use crate::common::error::Result;
use crate::observer::ancs::constants::{
    ANCS_SERVICE, CONTROL_POINT_CHAR, DATA_SOURCE_CHAR, NOTIFICATION_SOURCE_CHAR,
};

/// Address or platform handle of the remote device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        PeerId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    NotificationSource,
    ControlPoint,
    DataSource,
}

impl Characteristic {
    pub fn uuid(self) -> &'static str {
        match self {
            Characteristic::NotificationSource => NOTIFICATION_SOURCE_CHAR,
            Characteristic::ControlPoint => CONTROL_POINT_CHAR,
            Characteristic::DataSource => DATA_SOURCE_CHAR,
        }
    }

    pub fn from_uuid(uuid: &str) -> Option<Self> {
        [
            Characteristic::NotificationSource,
            Characteristic::ControlPoint,
            Characteristic::DataSource,
        ]
        .iter()
        .copied()
        .find(|c| c.uuid().eq_ignore_ascii_case(uuid))
    }
}

pub fn is_ancs_service(uuid: &str) -> bool {
    uuid.eq_ignore_ascii_case(ANCS_SERVICE)
}

/// What a BLE adapter reports back, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    ConnectFailed(String),
    Disconnected,
    /// Primary service UUIDs found on the peer.
    ServicesDiscovered(Vec<String>),
    CharacteristicChanged {
        characteristic: Characteristic,
        value: Vec<u8>,
    },
    /// Completion of a CCCD subscription or Control Point write. The error
    /// carries the ATT status byte.
    WriteComplete {
        characteristic: Characteristic,
        status: std::result::Result<(), u8>,
    },
    /// A submitted operation could not be carried out by the adapter.
    OperationFailed(String),
}

/// Commands issued to the BLE adapter. Every call only submits the
/// operation; completion arrives later as a [`TransportEvent`].
///
/// Enabling notifications means writing `0x0001` to the characteristic's
/// client configuration descriptor
/// ([`CLIENT_CHARACTERISTIC_CONFIG`](crate::observer::ancs::constants::CLIENT_CHARACTERISTIC_CONFIG)).
#[async_trait]
pub trait GattTransport: Send {
    async fn connect(&mut self, peer: &PeerId) -> Result<()>;
    async fn discover_services(&mut self) -> Result<()>;
    async fn enable_notifications(&mut self, characteristic: Characteristic) -> Result<()>;
    async fn write_control_point(&mut self, value: &[u8]) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}
