use crate::observer::ancs::constants::{
    ActionID, CommandID, NotificationAttributeID, USHORT_MAX,
};
use crate::observer::ancs::parsers::{Notification, Uid};

/// One attribute slot of a Get Notification Attributes command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRequest {
    pub attribute_id: NotificationAttributeID,
    pub max_length: Option<u16>,
}

impl AttributeRequest {
    pub fn new(attribute_id: NotificationAttributeID) -> Self {
        let max_length = if attribute_id.has_max_length() {
            Some(USHORT_MAX)
        } else {
            None
        };
        Self {
            attribute_id,
            max_length,
        }
    }

    pub fn with_max_length(attribute_id: NotificationAttributeID, max_length: u16) -> Self {
        Self {
            attribute_id,
            max_length: Some(max_length),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetNotificationAttributes {
    pub uid: Uid,
    pub attributes: Vec<AttributeRequest>,
}

impl GetNotificationAttributes {
    /// App identifier, title and message, in the order the peer will echo them.
    pub fn canonical(uid: Uid) -> Self {
        Self::with_limits(uid, USHORT_MAX, USHORT_MAX)
    }

    pub fn with_limits(uid: Uid, max_title: u16, max_message: u16) -> Self {
        Self {
            uid,
            attributes: vec![
                AttributeRequest::new(NotificationAttributeID::AppIdentifier),
                AttributeRequest::with_max_length(NotificationAttributeID::Title, max_title),
                AttributeRequest::with_max_length(NotificationAttributeID::Message, max_message),
            ],
        }
    }

    /// Appends the action labels the event announces, after the canonical set.
    pub fn with_action_labels(mut self, notification: &Notification) -> Self {
        if notification.has_positive_action() {
            self.attributes.push(AttributeRequest::new(
                NotificationAttributeID::PositiveActionLabel,
            ));
        }
        if notification.has_negative_action() {
            self.attributes.push(AttributeRequest::new(
                NotificationAttributeID::NegativeActionLabel,
            ));
        }
        self
    }

    pub fn requested_ids(&self) -> Vec<NotificationAttributeID> {
        self.attributes.iter().map(|a| a.attribute_id).collect()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut msg = vec![CommandID::GetNotificationAttributes as u8];
        msg.extend_from_slice(&self.uid.to_bytes());
        for attribute in &self.attributes {
            msg.push(attribute.attribute_id as u8);
            if let Some(max_length) = attribute.max_length {
                msg.extend_from_slice(&max_length.to_le_bytes());
            }
        }
        msg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformNotificationAction {
    pub uid: Uid,
    pub is_positive: bool,
}

impl PerformNotificationAction {
    pub fn to_vec(&self) -> Vec<u8> {
        let mut msg = vec![CommandID::PerformNotificationAction as u8];
        msg.extend_from_slice(&self.uid.to_bytes());
        msg.push(if self.is_positive {
            ActionID::Positive as u8
        } else {
            ActionID::Negative as u8
        });
        msg
    }
}
