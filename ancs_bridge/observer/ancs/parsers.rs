use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::str::{self, FromStr};

use crate::common::error::{AncsError, Result};
use crate::observer::ancs::constants::{
    CategoryID, CommandID, EventFlag, EventID, ATTRIBUTE_HEADER_LEN, DATA_SOURCE_HEADER_LEN,
    NOTIFICATION_SOURCE_LEN, UID_LEN,
};

/// Notification identifier. The four bytes are kept in wire order and
/// rendered as eight uppercase hex digits in that same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid([u8; UID_LEN]);

impl Uid {
    pub const fn from_bytes(bytes: [u8; UID_LEN]) -> Self {
        Uid(bytes)
    }

    pub fn to_bytes(self) -> [u8; UID_LEN] {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for Uid {
    type Err = AncsError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != UID_LEN * 2 {
            return Err(AncsError::InvalidUid(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| AncsError::InvalidUid(s.to_string()))?;
        let bytes: [u8; UID_LEN] = bytes
            .try_into()
            .map_err(|_| AncsError::InvalidUid(s.to_string()))?;
        Ok(Uid(bytes))
    }
}

impl TryFrom<&[u8]> for Uid {
    type Error = AncsError;

    fn try_from(data: &[u8]) -> Result<Self> {
        let bytes: [u8; UID_LEN] = data.try_into().map_err(|_| {
            AncsError::MalformedMessage(format!("uid needs {} bytes, got {}", UID_LEN, data.len()))
        })?;
        Ok(Uid(bytes))
    }
}

/// Outcome of decoding from a buffer that may still be filling up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Complete(T),
    Incomplete,
}

/// A Notification Source event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uid: Uid,
    pub event_id: EventID,
    pub event_flags: EventFlag,
    pub category: CategoryID,
    pub category_count: u8,
}

impl Notification {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != NOTIFICATION_SOURCE_LEN {
            return Err(AncsError::MalformedMessage(format!(
                "notification source needs {} bytes, got {}",
                NOTIFICATION_SOURCE_LEN,
                data.len()
            )));
        }
        let event_id = EventID::try_from(data[0])?;
        Ok(Notification {
            uid: Uid::try_from(&data[4..8])?,
            event_id,
            event_flags: EventFlag::from_bits_truncate(data[1]),
            category: CategoryID::from(data[2]),
            category_count: data[3],
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut msg = vec![
            self.event_id as u8,
            self.event_flags.bits(),
            self.category as u8,
            self.category_count,
        ];
        msg.extend_from_slice(&self.uid.to_bytes());
        msg
    }

    pub fn is_preexisting(&self) -> bool {
        self.event_flags.contains(EventFlag::PRE_EXISTING)
    }

    pub fn is_fresh(&self) -> bool {
        !self.is_preexisting()
    }

    pub fn has_positive_action(&self) -> bool {
        self.event_flags.contains(EventFlag::POSITIVE_ACTION)
    }

    pub fn has_negative_action(&self) -> bool {
        self.event_flags.contains(EventFlag::NEGATIVE_ACTION)
    }
}

/// Leading bytes of a Data Source response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSourceHeader {
    pub command_id: CommandID,
    pub uid: Uid,
}

impl DataSourceHeader {
    pub fn parse(data: &[u8]) -> Result<Decoded<Self>> {
        if data.len() < DATA_SOURCE_HEADER_LEN {
            return Ok(Decoded::Incomplete);
        }
        let command_id = CommandID::try_from(data[0])?;
        if command_id != CommandID::GetNotificationAttributes {
            return Err(AncsError::UnknownCommandId(data[0]));
        }
        Ok(Decoded::Complete(DataSourceHeader {
            command_id,
            uid: Uid::try_from(&data[1..DATA_SOURCE_HEADER_LEN])?,
        }))
    }
}

/// One attribute tuple lifted out of a Data Source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChunk {
    pub attribute_id: u8,
    pub value: String,
    pub consumed: usize,
}

/// Reads `id | len(LE u16) | utf8[len]` starting at `cursor`.
///
/// `Incomplete` means the header or the declared value has not fully
/// arrived yet; callers keep buffering instead of failing.
pub fn decode_attribute_chunk(data: &[u8], cursor: usize) -> Result<Decoded<AttributeChunk>> {
    let rest = data.get(cursor..).unwrap_or(&[]);
    if rest.len() < ATTRIBUTE_HEADER_LEN {
        return Ok(Decoded::Incomplete);
    }
    let attribute_id = rest[0];
    let len = u16::from_le_bytes([rest[1], rest[2]]) as usize;
    let end = ATTRIBUTE_HEADER_LEN + len;
    if rest.len() < end {
        return Ok(Decoded::Incomplete);
    }
    let value = str::from_utf8(&rest[ATTRIBUTE_HEADER_LEN..end]).map_err(|e| {
        AncsError::MalformedMessage(format!("attribute {:#04x} is not UTF-8: {}", attribute_id, e))
    })?;
    Ok(Decoded::Complete(AttributeChunk {
        attribute_id,
        value: value.trim().to_string(),
        consumed: end,
    }))
}
