use std::convert::TryFrom;
use std::fmt;

use crate::common::error::AncsError;

pub const USHORT_MAX: u16 = u16::MAX;

pub const ANCS_SERVICE: &str = "7905f431-b5ce-4e99-a40f-4b1e122d00d0";
pub const NOTIFICATION_SOURCE_CHAR: &str = "9fbf120d-6301-42d9-8c58-25e699a21dbd";
pub const CONTROL_POINT_CHAR: &str = "69d1d8f3-45e1-49a8-9821-9bbdfdaad9d9";
pub const DATA_SOURCE_CHAR: &str = "22eac6e9-24d6-4bb5-be44-b36ace7c7bfb";
pub const CLIENT_CHARACTERISTIC_CONFIG: &str = "00002902-0000-1000-8000-00805f9b34fb";

pub const UID_LEN: usize = 4;
pub const NOTIFICATION_SOURCE_LEN: usize = 8;
/// Command id plus uid.
pub const DATA_SOURCE_HEADER_LEN: usize = 1 + UID_LEN;
/// Attribute id plus little-endian length.
pub const ATTRIBUTE_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CategoryID {
    Other = 0,
    IncomingCall = 1,
    MissedCall = 2,
    Voicemail = 3,
    Social = 4,
    Schedule = 5,
    Email = 6,
    News = 7,
    HealthAndFitness = 8,
    BusinessAndFinance = 9,
    Location = 10,
    Entertainment = 11,
}

impl CategoryID {
    pub fn name(self) -> &'static str {
        match self {
            CategoryID::Other => "Other",
            CategoryID::IncomingCall => "IncomingCall",
            CategoryID::MissedCall => "MissedCall",
            CategoryID::Voicemail => "Voicemail",
            CategoryID::Social => "Social",
            CategoryID::Schedule => "Schedule",
            CategoryID::Email => "Email",
            CategoryID::News => "News",
            CategoryID::HealthAndFitness => "HealthAndFitness",
            CategoryID::BusinessAndFinance => "BusinessAndFinance",
            CategoryID::Location => "Location",
            CategoryID::Entertainment => "Entertainment",
        }
    }

    /// Call-like categories carry the caller in the title rather than app text.
    pub fn is_telephony(self) -> bool {
        matches!(
            self,
            CategoryID::IncomingCall | CategoryID::MissedCall | CategoryID::Voicemail
        )
    }
}

// Categories added by newer peers degrade to Other.
impl From<u8> for CategoryID {
    fn from(value: u8) -> Self {
        match value {
            1 => CategoryID::IncomingCall,
            2 => CategoryID::MissedCall,
            3 => CategoryID::Voicemail,
            4 => CategoryID::Social,
            5 => CategoryID::Schedule,
            6 => CategoryID::Email,
            7 => CategoryID::News,
            8 => CategoryID::HealthAndFitness,
            9 => CategoryID::BusinessAndFinance,
            10 => CategoryID::Location,
            11 => CategoryID::Entertainment,
            _ => CategoryID::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventID {
    NotificationAdded = 0,
    NotificationModified = 1,
    NotificationRemoved = 2,
}

impl TryFrom<u8> for EventID {
    type Error = AncsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventID::NotificationAdded),
            1 => Ok(EventID::NotificationModified),
            2 => Ok(EventID::NotificationRemoved),
            other => Err(AncsError::UnknownEventKind(other)),
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlag: u8 {
        const SILENT = 1 << 0;
        const IMPORTANT = 1 << 1;
        const PRE_EXISTING = 1 << 2;
        const POSITIVE_ACTION = 1 << 3;
        const NEGATIVE_ACTION = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandID {
    GetNotificationAttributes = 0,
    GetAppAttributes = 1,
    PerformNotificationAction = 2,
}

impl TryFrom<u8> for CommandID {
    type Error = AncsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CommandID::GetNotificationAttributes),
            1 => Ok(CommandID::GetAppAttributes),
            2 => Ok(CommandID::PerformNotificationAction),
            other => Err(AncsError::UnknownCommandId(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NotificationAttributeID {
    AppIdentifier = 0,
    Title = 1,
    Subtitle = 2,
    Message = 3,
    MessageSize = 4,
    Date = 5,
    PositiveActionLabel = 6,
    NegativeActionLabel = 7,
}

impl NotificationAttributeID {
    /// Attributes whose request carries a 2-byte maximum length.
    pub fn has_max_length(self) -> bool {
        matches!(
            self,
            NotificationAttributeID::Title
                | NotificationAttributeID::Subtitle
                | NotificationAttributeID::Message
        )
    }
}

impl TryFrom<u8> for NotificationAttributeID {
    type Error = AncsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NotificationAttributeID::AppIdentifier),
            1 => Ok(NotificationAttributeID::Title),
            2 => Ok(NotificationAttributeID::Subtitle),
            3 => Ok(NotificationAttributeID::Message),
            4 => Ok(NotificationAttributeID::MessageSize),
            5 => Ok(NotificationAttributeID::Date),
            6 => Ok(NotificationAttributeID::PositiveActionLabel),
            7 => Ok(NotificationAttributeID::NegativeActionLabel),
            other => Err(AncsError::UnknownAttributeId(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActionID {
    Positive = 0,
    Negative = 1,
}

/// ATT error codes the peer returns for a rejected Control Point write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    UnknownCommand = 0xA0,
    InvalidCommand = 0xA1,
    InvalidParameter = 0xA2,
    ActionFailed = 0xA3,
}

impl TryFrom<u8> for ErrorCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xA0 => Ok(ErrorCode::UnknownCommand),
            0xA1 => Ok(ErrorCode::InvalidCommand),
            0xA2 => Ok(ErrorCode::InvalidParameter),
            0xA3 => Ok(ErrorCode::ActionFailed),
            other => Err(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::UnknownCommand => "unknown command",
            ErrorCode::InvalidCommand => "invalid command",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::ActionFailed => "action failed",
        };
        write!(f, "{} ({:#04x})", name, *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_category_maps_to_other() {
        assert_eq!(CategoryID::from(4), CategoryID::Social);
        assert_eq!(CategoryID::from(12), CategoryID::Other);
        assert_eq!(CategoryID::from(0xFF), CategoryID::Other);
    }

    #[test]
    fn event_id_rejects_unknown_kinds() {
        assert_eq!(EventID::try_from(2), Ok(EventID::NotificationRemoved));
        assert_eq!(EventID::try_from(3), Err(AncsError::UnknownEventKind(3)));
    }

    #[test]
    fn only_text_attributes_take_a_max_length() {
        assert!(NotificationAttributeID::Title.has_max_length());
        assert!(NotificationAttributeID::Message.has_max_length());
        assert!(!NotificationAttributeID::AppIdentifier.has_max_length());
        assert!(!NotificationAttributeID::PositiveActionLabel.has_max_length());
    }

    #[test]
    fn error_codes_round_trip_through_their_byte() {
        assert_eq!(ErrorCode::try_from(0xA3), Ok(ErrorCode::ActionFailed));
        assert_eq!(ErrorCode::try_from(0x0E), Err(0x0E));
        assert_eq!(
            ErrorCode::InvalidParameter.to_string(),
            "invalid parameter (0xa2)"
        );
    }
}
