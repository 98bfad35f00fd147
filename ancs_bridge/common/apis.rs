use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::common::error::{AncsError, Result};
use crate::observer::ancs::parsers::Uid;
use crate::observer::registry::NotificationRecord;

/// Everything the engine reports to the presentation side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    RecordUpdated(NotificationRecord),
    RecordRemoved(Uid),
    ConnectionStateChanged(bool),
    ActionResult {
        uid: Uid,
        is_positive: bool,
        result: std::result::Result<(), AncsError>,
    },
    /// Session-level failures the caller has to act on, e.g. a peer without ANCS.
    Error(AncsError),
}

/// Callbacks for the presentation layer. Called from the engine task, so
/// implementations must not block.
pub trait ObserverApi: Send + 'static {
    fn on_record_updated(&self, record: &NotificationRecord);

    fn on_record_removed(&self, uid: Uid);

    fn on_connection_state_changed(&self, ready: bool);

    fn on_action_result(&self, uid: Uid, is_positive: bool, result: &std::result::Result<(), AncsError>) {
        debug!("{}: action (positive: {}) finished: {:?}", uid, is_positive, result);
    }

    fn on_error(&self, error: &AncsError) {
        debug!("Unhandled observer error: {}", error);
    }

    fn dispatch(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::RecordUpdated(record) => self.on_record_updated(record),
            ObserverEvent::RecordRemoved(uid) => self.on_record_removed(*uid),
            ObserverEvent::ConnectionStateChanged(ready) => self.on_connection_state_changed(*ready),
            ObserverEvent::ActionResult {
                uid,
                is_positive,
                result,
            } => self.on_action_result(*uid, *is_positive, result),
            ObserverEvent::Error(error) => self.on_error(error),
        }
    }
}

/// Forwards every event into a channel, for consumers that prefer polling.
impl ObserverApi for UnboundedSender<ObserverEvent> {
    fn on_record_updated(&self, record: &NotificationRecord) {
        let _ = self.send(ObserverEvent::RecordUpdated(record.clone()));
    }

    fn on_record_removed(&self, uid: Uid) {
        let _ = self.send(ObserverEvent::RecordRemoved(uid));
    }

    fn on_connection_state_changed(&self, ready: bool) {
        let _ = self.send(ObserverEvent::ConnectionStateChanged(ready));
    }

    fn on_action_result(&self, uid: Uid, is_positive: bool, result: &std::result::Result<(), AncsError>) {
        let _ = self.send(ObserverEvent::ActionResult {
            uid,
            is_positive,
            result: result.clone(),
        });
    }

    fn on_error(&self, error: &AncsError) {
        let _ = self.send(ObserverEvent::Error(error.clone()));
    }
}

/// Flat, serialisable view of a record as handed to a notification daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowNotificationData {
    pub device_name: String,
    pub id: String,
    pub app_id: String,
    pub app_name: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub silent: bool,
    pub important: bool,
    pub positive_action: Option<String>,
    pub negative_action: Option<String>,
}

impl ShowNotificationData {
    /// `app_name` maps a bundle identifier to something readable.
    pub fn from_record<F>(device_name: &str, record: &NotificationRecord, app_name: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        let app_id = record.app_id.clone().unwrap_or_default();
        let app_name = app_name(&app_id);
        let lines: Vec<&str> = [&record.title, &record.subtitle, &record.message]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .filter(|s| !s.is_empty())
            .collect();
        let (title, body) = if record.category.is_telephony() {
            (app_name.clone(), lines.join("\n"))
        } else {
            match lines.split_first() {
                Some((first, rest)) => (first.to_string(), rest.join("\n")),
                None => (app_name.clone(), String::new()),
            }
        };
        ShowNotificationData {
            device_name: device_name.to_string(),
            id: record.uid.to_string(),
            app_id,
            app_name,
            category: record.category.name().to_string(),
            title,
            body,
            silent: record.is_silent(),
            important: record.is_important(),
            positive_action: record
                .positive_action_label
                .clone()
                .filter(|_| record.has_positive_action()),
            negative_action: record
                .negative_action_label
                .clone()
                .filter(|_| record.has_negative_action()),
        }
    }

    pub fn json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AncsError::MalformedMessage(e.to_string()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| AncsError::MalformedMessage(e.to_string()))
    }
}

/// Readable name for a bundle identifier without asking the peer.
pub fn default_app_display_name(app_id: &str) -> String {
    if app_id.is_empty() {
        return "Unknown".to_string();
    }
    let name = match app_id.strip_prefix("com.apple.") {
        Some(rest) => rest,
        None => app_id.rsplit('.').next().unwrap_or(app_id),
    };
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => app_id.to_string(),
    }
}
