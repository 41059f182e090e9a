//! Setup and teardown of config entries.
//!
//! The [`EntryRegistry`] is created by the runtime bootstrap and passed by
//! reference to whatever needs to look a device up. Each loaded entry owns one
//! [`MatrixController`] shared by its power switch and eight input selectors.

use super::config_flow::ConfigEntry;
use crate::device_info::MAX_OUTPUTS;
use crate::entities::{Entity, InputSelect, PowerSwitch, StateListener};
use crate::error::SetupError;
use crate::matrix::MatrixController;
use crate::transport::Connector;
use log::{error, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A set-up config entry and its entities.
pub struct LoadedEntry {
    pub entry: ConfigEntry,
    pub controller: Arc<MatrixController>,
    pub power: Arc<PowerSwitch>,
    pub selects: Vec<Arc<InputSelect>>,
}

impl LoadedEntry {
    /// All entities of this entry, power switch first.
    pub fn entities(&self) -> Vec<Arc<dyn Entity>> {
        let mut entities: Vec<Arc<dyn Entity>> = Vec::with_capacity(self.selects.len() + 1);
        entities.push(self.power.clone());
        entities.extend(
            self.selects
                .iter()
                .map(|select| select.clone() as Arc<dyn Entity>),
        );
        entities
    }

    /// Selector for `output` (1-based).
    pub fn select(&self, output: u8) -> Option<&Arc<InputSelect>> {
        self.selects.iter().find(|select| select.output() == output)
    }
}

/// Explicit map of loaded entries, keyed by entry id.
pub struct EntryRegistry {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    listener: Option<StateListener>,
    entries: RwLock<HashMap<String, Arc<LoadedEntry>>>,
}

impl EntryRegistry {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self {
            connector,
            timeout,
            listener: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Listener attached to every entity created from now on.
    pub fn with_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Connect to the entry's matrix and create its entities.
    ///
    /// Makes one connect attempt. A failure is [`SetupError::NotReady`]; the
    /// caller decides when to try again.
    pub async fn setup_entry(&self, entry: ConfigEntry) -> Result<Arc<LoadedEntry>, SetupError> {
        if self.entries.read().contains_key(&entry.entry_id) {
            return Err(SetupError::AlreadyLoaded(entry.entry_id));
        }

        let controller = MatrixController::connect(
            self.connector.as_ref(),
            &entry.host,
            entry.port,
            self.timeout,
        )
        .await
        .map_err(|source| {
            error!("[Setup] Failed to set up {}: {}", entry.title, source);
            SetupError::NotReady {
                entry_id: entry.entry_id.clone(),
                source,
            }
        })?;
        let controller = Arc::new(controller);

        let names = Arc::new(entry.names.clone());
        let power = Arc::new(PowerSwitch::new(controller.clone()));
        let selects: Vec<Arc<InputSelect>> = (1..=MAX_OUTPUTS)
            .map(|output| Arc::new(InputSelect::new(controller.clone(), output, names.clone())))
            .collect();

        let loaded = Arc::new(LoadedEntry {
            entry,
            controller,
            power,
            selects,
        });

        for entity in loaded.entities() {
            if let Some(listener) = &self.listener {
                entity.set_state_listener(listener.clone());
            }
            info!(
                "[Setup] Registered {} {} ({})",
                entity.kind(),
                entity.unique_id(),
                entity.name()
            );
        }

        let previous = self
            .entries
            .write()
            .insert(loaded.entry.entry_id.clone(), loaded.clone());
        if let Some(previous) = previous {
            // Lost a race with a concurrent setup of the same entry.
            warn!(
                "[Setup] Entry {} was set up twice, closing the older connection",
                previous.entry.entry_id
            );
            previous.controller.disconnect().await;
        }

        info!("[Setup] {} ready", loaded.entry.title);
        Ok(loaded)
    }

    /// Retry [`setup_entry`](Self::setup_entry) every `backoff` while the
    /// device is not ready. Returns `None` if cancelled or setup fails for
    /// another reason.
    pub async fn setup_with_retry(
        &self,
        entry: ConfigEntry,
        backoff: Duration,
        cancel: &CancellationToken,
    ) -> Option<Arc<LoadedEntry>> {
        loop {
            match self.setup_entry(entry.clone()).await {
                Ok(loaded) => return Some(loaded),
                Err(SetupError::NotReady { entry_id, source }) => {
                    warn!(
                        "[Setup] {} not ready ({}), retrying in {:?}",
                        entry_id, source, backoff
                    );
                }
                Err(e) => {
                    error!("[Setup] {}", e);
                    return None;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// Drop the entry and disconnect its matrix. Returns `false` if the entry
    /// was not loaded.
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let Some(loaded) = self.entries.write().remove(entry_id) else {
            return false;
        };
        loaded.controller.disconnect().await;
        info!("[Setup] Unloaded {}", loaded.entry.title);
        true
    }

    /// Unload and set up again from the stored entry, e.g. after the matrix
    /// was power-cycled and the old socket went stale.
    pub async fn reload_entry(&self, entry_id: &str) -> Result<Arc<LoadedEntry>, SetupError> {
        let entry = self
            .get(entry_id)
            .map(|loaded| loaded.entry.clone())
            .ok_or_else(|| SetupError::UnknownEntry(entry_id.to_string()))?;
        self.unload_entry(entry_id).await;
        self.setup_entry(entry).await
    }

    pub async fn unload_all(&self) {
        for entry_id in self.entry_ids() {
            self.unload_entry(&entry_id).await;
        }
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<LoadedEntry>> {
        self.entries.read().get(entry_id).cloned()
    }

    /// Loaded entries ordered by entry id.
    pub fn loaded(&self) -> Vec<Arc<LoadedEntry>> {
        let mut loaded: Vec<Arc<LoadedEntry>> = self.entries.read().values().cloned().collect();
        loaded.sort_by(|a, b| a.entry.entry_id.cmp(&b.entry.entry_id));
        loaded
    }

    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
