//! Device information and fixed matrix constants.
//!
//! Every entity of one matrix reports the same [`DeviceInfo`] so the host
//! groups them under a single device card keyed by host address.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Integration domain, used as the namespace of device identifiers.
pub const DOMAIN: &str = "blackbird";

pub const DEVICE_MANUFACTURER: &str = "Monoprice";
pub const DEVICE_MODEL: &str = "Blackbird 27842";

/// Default TCP port of the matrix's serial-over-IP bridge.
pub const DEFAULT_PORT: u16 = 4001;

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between polls of every entity.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub const MAX_INPUTS: u8 = 8;
pub const MAX_OUTPUTS: u8 = 8;

/// Device card information shared by all entities of one matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// `(domain, host)` pairs identifying the device.
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceInfo {
    /// Build the device info for the matrix reachable at `host`.
    pub fn for_host(host: &str) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), host.to_string())],
            name: device_title(host),
            manufacturer: DEVICE_MANUFACTURER.to_string(),
            model: DEVICE_MODEL.to_string(),
        }
    }
}

/// Display title used for both the device card and the config entry.
pub fn device_title(host: &str) -> String {
    format!("Blackbird Matrix ({})", host)
}
