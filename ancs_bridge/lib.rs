//! Client side of the Apple Notification Center Service.
//!
//! The protocol engine is transport agnostic: a BLE adapter implements
//! [`GattTransport`], feeds its callbacks into an [`ObserverHandle`] and the
//! presentation layer receives records through [`ObserverApi`].

pub mod common;
pub mod observer;

pub use crate::common::apis::{ObserverApi, ObserverEvent, ShowNotificationData};
pub use crate::common::config::ObserverConfig;
pub use crate::common::error::{AncsError, Result};
pub use crate::common::external_apis::{Characteristic, GattTransport, PeerId, TransportEvent};
pub use crate::observer::ancs::parsers::Uid;
pub use crate::observer::device::{ConnectionState, DeviceCommand, DeviceInput, MobileDevice};
pub use crate::observer::registry::NotificationRecord;
pub use crate::observer::server::{spawn, ObserverHandle, ObserverServer};
