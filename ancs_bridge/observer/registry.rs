use std::collections::HashMap;

use log::{debug, warn};

use crate::observer::ancs::constants::{CategoryID, EventFlag, EventID, NotificationAttributeID};
use crate::observer::ancs::parsers::{Notification, Uid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub uid: Uid,
    pub event_id: EventID,
    pub category: CategoryID,
    pub event_flags: EventFlag,
    pub app_id: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub message: Option<String>,
    pub message_size: Option<u32>,
    pub date: Option<String>,
    pub positive_action_label: Option<String>,
    pub negative_action_label: Option<String>,
    pub awaiting_attributes: bool,
}

impl NotificationRecord {
    /// A record for a uid that has produced attributes but no event yet.
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            event_id: EventID::NotificationAdded,
            category: CategoryID::Other,
            event_flags: EventFlag::empty(),
            app_id: None,
            title: None,
            subtitle: None,
            message: None,
            message_size: None,
            date: None,
            positive_action_label: None,
            negative_action_label: None,
            awaiting_attributes: false,
        }
    }

    pub fn has_positive_action(&self) -> bool {
        self.event_flags.contains(EventFlag::POSITIVE_ACTION)
    }

    pub fn has_negative_action(&self) -> bool {
        self.event_flags.contains(EventFlag::NEGATIVE_ACTION)
    }

    pub fn is_silent(&self) -> bool {
        self.event_flags.contains(EventFlag::SILENT)
    }

    pub fn is_important(&self) -> bool {
        self.event_flags.contains(EventFlag::IMPORTANT)
    }

    /// Only records with some text are worth surfacing.
    pub fn is_presentable(&self) -> bool {
        let non_empty = |s: &Option<String>| s.as_deref().map_or(false, |s| !s.is_empty());
        non_empty(&self.title) || non_empty(&self.message)
    }

    fn set_attribute(&mut self, attribute_id: NotificationAttributeID, value: String) {
        match attribute_id {
            NotificationAttributeID::AppIdentifier => self.app_id = Some(value),
            NotificationAttributeID::Title => self.title = Some(value),
            NotificationAttributeID::Subtitle => self.subtitle = Some(value),
            NotificationAttributeID::Message => self.message = Some(value),
            NotificationAttributeID::MessageSize => match value.parse() {
                Ok(size) => self.message_size = Some(size),
                Err(_) => warn!("{}: ignoring message size {:?}", self.uid, value),
            },
            NotificationAttributeID::Date => self.date = Some(value),
            NotificationAttributeID::PositiveActionLabel => {
                self.positive_action_label = Some(value)
            }
            NotificationAttributeID::NegativeActionLabel => {
                self.negative_action_label = Some(value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Upserted { uid: Uid, created: bool },
    Removed(NotificationRecord),
    Unchanged,
}

/// Notification records keyed by uid. Removed uids are dropped outright, so
/// a later event for the same uid starts a fresh record.
#[derive(Debug, Default)]
pub struct NotificationRegistry {
    records: HashMap<Uid, NotificationRecord>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_event(&mut self, notification: &Notification) -> RegistryChange {
        let uid = notification.uid;
        if notification.event_id == EventID::NotificationRemoved {
            return match self.remove(uid) {
                Some(record) => RegistryChange::Removed(record),
                None => {
                    debug!("{}: removal of unknown notification", uid);
                    RegistryChange::Unchanged
                }
            };
        }

        let created = !self.records.contains_key(&uid);
        let record = self
            .records
            .entry(uid)
            .or_insert_with(|| NotificationRecord::new(uid));
        record.event_id = notification.event_id;
        record.category = notification.category;
        record.event_flags = notification.event_flags;
        record.awaiting_attributes = true;
        RegistryChange::Upserted { uid, created }
    }

    pub fn apply_attribute(
        &mut self,
        uid: Uid,
        attribute_id: NotificationAttributeID,
        value: String,
    ) {
        self.records
            .entry(uid)
            .or_insert_with(|| {
                debug!("{}: attributes arrived before any event", uid);
                NotificationRecord::new(uid)
            })
            .set_attribute(attribute_id, value);
    }

    /// Marks attribute resolution as finished for `uid`.
    pub fn complete(&mut self, uid: Uid) -> Option<&NotificationRecord> {
        let record = self.records.get_mut(&uid)?;
        record.awaiting_attributes = false;
        Some(record)
    }

    pub fn get(&self, uid: Uid) -> Option<&NotificationRecord> {
        self.records.get(&uid)
    }

    pub fn remove(&mut self, uid: Uid) -> Option<NotificationRecord> {
        self.records.remove(&uid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.records.values()
    }
}
