use crate::device_info::{DEFAULT_POLL_INTERVAL, DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::error::Result;
use crate::integration::{ConfigEntry, unique_id};
use crate::naming::NameMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// `KEY=value` pairs from a .env file. Comments and blank lines are skipped,
/// surrounding quotes are stripped.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Split on the first '=' only
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            if !key.is_empty() {
                pairs.push((key, value));
            }
        }
    }
    pairs
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
    /// Wait between setup attempts while a matrix is unreachable.
    pub retry_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub names: NameMap,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            retry_interval_secs: 30,
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }
}

impl DeviceConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            names: NameMap::default(),
        }
    }

    pub fn to_entry(&self) -> ConfigEntry {
        ConfigEntry::new(self.host.trim(), self.port, self.names.clone())
    }
}

impl Config {
    /// Read a JSON config file, or start from defaults when `path` is `None`.
    /// Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_json(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Drop devices whose `host:port` repeats an earlier one. Returns the
    /// dropped `host:port` ids.
    pub fn dedup_devices(&mut self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();
        self.devices.retain(|device| {
            let id = unique_id(device.host.trim(), device.port);
            if seen.insert(id.clone()) {
                true
            } else {
                dropped.push(id);
                false
            }
        });
        dropped
    }

    /// Apply `BLACKBIRD_*` overrides read through `lookup`.
    ///
    /// `BLACKBIRD_HOST` adds a device when no device with that host is
    /// configured; `BLACKBIRD_PORT` sets its port.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = lookup("BLACKBIRD_POLL_INTERVAL")
            && let Ok(s) = secs.parse()
        {
            self.bridge.poll_interval_secs = s;
        }
        if let Some(secs) = lookup("BLACKBIRD_TIMEOUT")
            && let Ok(s) = secs.parse()
        {
            self.bridge.timeout_secs = s;
        }

        let port = lookup("BLACKBIRD_PORT").and_then(|p| p.parse().ok());
        if let Some(host) = lookup("BLACKBIRD_HOST") {
            let host = host.trim().to_string();
            if host.is_empty() {
                return;
            }
            match self.devices.iter_mut().find(|d| d.host == host) {
                Some(device) => {
                    if let Some(port) = port {
                        device.port = port;
                    }
                }
                None => self
                    .devices
                    .push(DeviceConfig::new(&host, port.unwrap_or(DEFAULT_PORT))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bridge.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.bridge.timeout(), Duration::from_secs(10));
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_parse_json_with_defaults() {
        let config = Config::from_json(
            r#"{
                "bridge": { "poll_interval_secs": 5 },
                "devices": [
                    { "host": "10.0.0.50", "names": { "inputs": { "1": " Apple TV " } } },
                    { "host": "10.0.0.51", "port": 23 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.bridge.poll_interval_secs, 5);
        assert_eq!(config.bridge.timeout_secs, 10);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].port, 4001);
        assert_eq!(config.devices[0].names.input_name(1), "Apple TV");
        assert_eq!(config.devices[0].names.output_name(1), "Output 1");
        assert_eq!(config.devices[1].port, 23);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(Config::from_json(r#"{ "devices": [ { "port": 1 } ] }"#).is_err());
    }

    #[test]
    fn test_env_adds_device() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("BLACKBIRD_HOST", "10.0.0.50"),
            ("BLACKBIRD_PORT", "5000"),
            ("BLACKBIRD_TIMEOUT", "3"),
            ("BLACKBIRD_POLL_INTERVAL", "not a number"),
        ]));
        assert_eq!(config.devices, vec![DeviceConfig::new("10.0.0.50", 5000)]);
        assert_eq!(config.bridge.timeout_secs, 3);
        assert_eq!(config.bridge.poll_interval_secs, 30);
    }

    #[test]
    fn test_env_updates_existing_device() {
        let mut config = Config::default();
        config.devices.push(DeviceConfig::new("10.0.0.50", 4001));
        config.apply_overrides(env(&[("BLACKBIRD_HOST", "10.0.0.50"), ("BLACKBIRD_PORT", "23")]));
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].port, 23);
    }

    #[test]
    fn test_duplicate_devices_dropped() {
        let mut config = Config::from_json(
            r#"{ "devices": [
                { "host": "10.0.0.50" },
                { "host": "10.0.0.50", "port": 23 },
                { "host": " 10.0.0.50 ", "port": 4001 }
            ] }"#,
        )
        .unwrap();

        assert_eq!(config.dedup_devices(), vec!["10.0.0.50:4001".to_string()]);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[1].port, 23);
        assert!(config.dedup_devices().is_empty());
    }

    #[test]
    fn test_device_to_entry() {
        let entry = DeviceConfig::new(" 10.0.0.50 ", 4001).to_entry();
        assert_eq!(entry.entry_id, "10.0.0.50:4001");
        assert_eq!(entry.title, "Blackbird Matrix (10.0.0.50)");
    }

    #[test]
    fn test_parse_dotenv() {
        let pairs = parse_dotenv(
            "# comment\n\nBLACKBIRD_HOST = 10.0.0.50\nNAME=\"Living Room\"\nEMPTY=\nbroken line\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("BLACKBIRD_HOST", "10.0.0.50"),
                ("NAME", "Living Room"),
                ("EMPTY", ""),
            ]
        );
    }
}
