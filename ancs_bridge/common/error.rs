use thiserror::Error;

use crate::observer::ancs::constants::ErrorCode;
use crate::observer::ancs::parsers::Uid;

pub type Result<T> = std::result::Result<T, AncsError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AncsError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown event kind {0:#04x}")]
    UnknownEventKind(u8),
    #[error("unknown attribute id {0:#04x}")]
    UnknownAttributeId(u8),
    #[error("unknown command id {0:#04x}")]
    UnknownCommandId(u8),
    #[error("peer does not expose the ANCS service")]
    ServiceNotFound,
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("peer rejected command: {0}")]
    Peer(ErrorCode),
    #[error("ANCS session is not ready")]
    NotReady,
    #[error("notification {0} does not offer that action")]
    ActionUnavailable(Uid),
    #[error("invalid notification uid {0:?}")]
    InvalidUid(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("observer server has stopped")]
    ServerStopped,
}

impl AncsError {
    /// Errors that should drive the reconnection scheduler.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AncsError::TransportFailure(_))
    }
}
