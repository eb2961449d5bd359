//! Engine configuration loading and persistence.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DATA_CHANNEL_MAX_RETRIES, SESSION_CONNECT_MAX_RETRIES, SESSION_TIMEOUT_SECS,
    TRANSMISSION_TIMEOUT_SECS,
};

/// Configuration for an hflink engine instance.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Station callsign, optionally with SSID (`XX0XXX-7`).
    pub mycallsign: String,
    /// Station Maidenhead locator, 4 or 6 characters.
    pub mygrid: String,
    /// Restrict the data channel to the 500 Hz mode set.
    #[serde(default)]
    pub low_bandwidth_mode: bool,
    /// Answer received CQ calls with a QRV frame.
    #[serde(default)]
    pub respond_to_cq: bool,
    /// Session open attempts before giving up.
    #[serde(default = "default_session_retries")]
    pub session_connect_max_retries: usize,
    /// Data channel open attempts before giving up.
    #[serde(default = "default_channel_retries")]
    pub data_channel_max_retries: usize,
    /// Idle session lifetime in seconds.
    #[serde(default = "default_session_timeout")]
    pub arq_session_timeout: u64,
    /// Idle data-channel lifetime in seconds.
    #[serde(default = "default_transmission_timeout")]
    pub transmission_timeout: u64,
}

fn default_session_retries() -> usize {
    SESSION_CONNECT_MAX_RETRIES
}

fn default_channel_retries() -> usize {
    DATA_CHANNEL_MAX_RETRIES
}

fn default_session_timeout() -> u64 {
    SESSION_TIMEOUT_SECS
}

fn default_transmission_timeout() -> u64 {
    TRANSMISSION_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mycallsign: "N0CALL".to_string(),
            mygrid: "JN48EA".to_string(),
            low_bandwidth_mode: false,
            respond_to_cq: true,
            session_connect_max_retries: SESSION_CONNECT_MAX_RETRIES,
            data_channel_max_retries: DATA_CHANNEL_MAX_RETRIES,
            arq_session_timeout: SESSION_TIMEOUT_SECS,
            transmission_timeout: TRANSMISSION_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing config from {}", path.display()))
    }

    /// Write configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("writing config to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.session_connect_max_retries, 3);
        assert_eq!(config.data_channel_max_retries, 5);
        assert_eq!(config.arq_session_timeout, 30);
        assert_eq!(config.transmission_timeout, 360);
        assert!(!config.low_bandwidth_mode);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hflink.json");

        let config = Config {
            mycallsign: "DN2LS-7".into(),
            mygrid: "JN48EA".into(),
            low_bandwidth_mode: true,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.mycallsign, "DN2LS-7");
        assert!(loaded.low_bandwidth_mode);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let loaded: Config =
            serde_json::from_str(r#"{"mycallsign": "AA1AA", "mygrid": "FN31"}"#).unwrap();
        assert_eq!(loaded.session_connect_max_retries, 3);
        assert!(!loaded.respond_to_cq);
    }
}
