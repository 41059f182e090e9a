//! Two-step configuration flow for adding a matrix.
//!
//! 1. `step_user`: host/port, validated by a one-shot connect + model probe.
//! 2. `step_names`: optional input/output display names, normalized into an
//!    immutable [`NameMap`].

use crate::device_info::device_title;
use crate::error::ConfigFlowError;
use crate::matrix::MatrixController;
use crate::naming::NameMap;
use crate::transport::Connector;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// A configured matrix, as accepted by the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    pub host: String,
    pub port: u16,
    pub names: NameMap,
}

impl ConfigEntry {
    pub fn new(host: &str, port: u16, names: NameMap) -> Self {
        Self {
            entry_id: unique_id(host, port),
            title: device_title(host),
            host: host.to_string(),
            port,
            names,
        }
    }

    pub fn unique_id(&self) -> String {
        unique_id(&self.host, self.port)
    }
}

/// Identity used to reject duplicate entries for the same device.
pub fn unique_id(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Output of the first step, carried into the names step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDevice {
    pub host: String,
    pub port: u16,
    pub title: String,
    pub model: String,
}

/// Connect, query the model, disconnect. Any failure is `CannotConnect`.
pub async fn validate_connection(
    connector: &dyn Connector,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<ValidatedDevice, ConfigFlowError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ConfigFlowError::InvalidHost);
    }

    let controller = MatrixController::connect(connector, host, port, timeout)
        .await
        .map_err(|e| {
            error!("[Setup] Failed to connect to Blackbird matrix: {}", e);
            ConfigFlowError::CannotConnect(e)
        })?;

    let model = controller.query_model().await;
    controller.disconnect().await;
    let model = model.map_err(|e| {
        error!("[Setup] Blackbird matrix at {} did not answer: {}", host, e);
        ConfigFlowError::CannotConnect(e)
    })?;

    info!("[Setup] Found {} at {}:{}", model, host, port);
    Ok(ValidatedDevice {
        host: host.to_string(),
        port,
        title: device_title(host),
        model,
    })
}

/// Stateful config flow. Knows which devices are already configured.
pub struct ConfigFlow<'a> {
    connector: &'a dyn Connector,
    timeout: Duration,
    configured: HashSet<String>,
}

impl<'a> ConfigFlow<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        timeout: Duration,
        configured: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            connector,
            timeout,
            configured: configured.into_iter().collect(),
        }
    }

    /// Validate the connection, then reject devices that already have an entry.
    pub async fn step_user(
        &self,
        host: &str,
        port: u16,
    ) -> Result<ValidatedDevice, ConfigFlowError> {
        let device = validate_connection(self.connector, host, port, self.timeout).await?;
        let id = unique_id(&device.host, device.port);
        if self.configured.contains(&id) {
            return Err(ConfigFlowError::AlreadyConfigured(id));
        }
        Ok(device)
    }

    /// Build the entry from the validated device and user-entered names.
    pub fn step_names(
        &mut self,
        device: ValidatedDevice,
        input_names: &BTreeMap<u8, String>,
        output_names: &BTreeMap<u8, String>,
    ) -> ConfigEntry {
        let entry = ConfigEntry::new(
            &device.host,
            device.port,
            NameMap::new(input_names, output_names),
        );
        self.configured.insert(entry.unique_id());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryConnector, MemoryTransport, Transport};
    use std::sync::Arc;

    fn connector() -> MemoryConnector {
        MemoryConnector::new(Arc::new(MemoryTransport::new()))
    }

    #[tokio::test]
    async fn test_validate_probes_and_disconnects() {
        let connector = connector();
        let device = validate_connection(&connector, " 10.0.0.50 ", 4001, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(device.host, "10.0.0.50");
        assert_eq!(device.title, "Blackbird Matrix (10.0.0.50)");
        assert_eq!(device.model, "Blackbird 27842");

        let sim = connector.transport();
        assert_eq!(sim.sent(), vec!["/*Type;".to_string()]);
        assert!(!sim.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_device_cannot_connect() {
        let connector = connector();
        connector.set_refusing(true);
        let err = validate_connection(&connector, "10.0.0.50", 4001, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.form_key(), "cannot_connect");
    }

    #[tokio::test]
    async fn test_silent_device_cannot_connect() {
        let connector = connector();
        connector.transport().set_failing(true);
        let err = validate_connection(&connector, "10.0.0.50", 4001, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigFlowError::CannotConnect(_)));
    }

    #[tokio::test]
    async fn test_blank_host_rejected() {
        let connector = connector();
        let err = validate_connection(&connector, "   ", 4001, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.form_key(), "invalid_host");
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn test_flow_builds_entry_and_rejects_duplicates() {
        let connector = connector();
        let mut flow = ConfigFlow::new(&connector, Duration::from_secs(1), Vec::new());

        let device = flow.step_user("10.0.0.50", 4001).await.unwrap();
        let inputs = BTreeMap::from([(1, " Apple TV ".to_string()), (2, "".to_string())]);
        let entry = flow.step_names(device, &inputs, &BTreeMap::new());

        assert_eq!(entry.entry_id, "10.0.0.50:4001");
        assert_eq!(entry.title, "Blackbird Matrix (10.0.0.50)");
        assert_eq!(entry.names.input_name(1), "Apple TV");
        assert_eq!(entry.names.input_name(2), "Input 2");
        assert_eq!(entry.names.output_name(1), "Output 1");

        let err = flow.step_user("10.0.0.50", 4001).await.unwrap_err();
        assert_eq!(err.form_key(), "already_configured");
        // Same host on another port is a different device.
        assert!(flow.step_user("10.0.0.50", 4002).await.is_ok());
    }
}
