use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::error::{AncsError, Result};

pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub reconnect_enabled: bool,
    pub reconnect_interval_secs: u64,
    /// `None` keeps retrying for as long as the peer stays away.
    pub max_reconnect_attempts: Option<usize>,
    pub fetch_preexisting: bool,
    pub request_action_labels: bool,
    pub max_title_length: u16,
    pub max_message_length: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            reconnect_enabled: true,
            reconnect_interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
            max_reconnect_attempts: None,
            fetch_preexisting: true,
            request_action_labels: true,
            max_title_length: u16::MAX,
            max_message_length: u16::MAX,
        }
    }
}

impl ObserverConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| AncsError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(data).map_err(|e| AncsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconnect_interval_secs == 0 {
            return Err(AncsError::Config(
                "reconnect_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_title_length == 0 || self.max_message_length == 0 {
            return Err(AncsError::Config(
                "attribute length limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = ObserverConfig::from_json(r#"{"fetch_preexisting": false}"#).unwrap();
        assert!(!config.fetch_preexisting);
        assert!(config.reconnect_enabled);
        assert_eq!(config.reconnect_interval(), Duration::from_secs(180));
        assert_eq!(config.max_reconnect_attempts, None);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(matches!(
            ObserverConfig::from_json(r#"{"reconnect_interval_secs": 0}"#),
            Err(AncsError::Config(_))
        ));
    }

    #[test]
    fn garbage_is_a_config_error() {
        assert!(matches!(
            ObserverConfig::from_json("reconnect"),
            Err(AncsError::Config(_))
        ));
    }

    #[test]
    fn load_reports_missing_files() {
        let err = ObserverConfig::load("/nonexistent/ancs-bridge.json").unwrap_err();
        assert!(matches!(err, AncsError::Config(ref msg) if msg.contains("ancs-bridge.json")));
    }
}
