//! Matrix power as an on/off entity.

use super::{ActionOutcome, Entity, EntityCore, EntityKind, EntityState, StateListener};
use crate::device_info::DeviceInfo;
use crate::matrix::MatrixController;
use async_trait::async_trait;
use log::error;
use parking_lot::RwLock;
use std::sync::Arc;

/// On/off entity for the matrix's power state.
///
/// A failed command or poll marks the entity unavailable and keeps the last
/// known `is_on`; it is never flipped speculatively.
pub struct PowerSwitch {
    core: EntityCore,
    controller: Arc<MatrixController>,
    is_on: RwLock<Option<bool>>,
}

impl PowerSwitch {
    pub fn new(controller: Arc<MatrixController>) -> Self {
        let host = controller.host().to_string();
        Self {
            core: EntityCore::new(
                format!("{}_power", host),
                "Matrix Power".to_string(),
                DeviceInfo::for_host(&host),
            ),
            controller,
            is_on: RwLock::new(None),
        }
    }

    /// Last known power state, `None` until the first successful exchange.
    pub fn is_on(&self) -> Option<bool> {
        *self.is_on.read()
    }

    pub async fn turn_on(&self) -> ActionOutcome {
        self.set(true).await
    }

    pub async fn turn_off(&self) -> ActionOutcome {
        self.set(false).await
    }

    async fn set(&self, on: bool) -> ActionOutcome {
        match self.controller.set_power(on).await {
            Ok(()) => {
                self.record(Some(on));
                ActionOutcome::Applied
            }
            Err(e) => {
                error!(
                    "[Entity] Failed to turn {} matrix: {}",
                    if on { "on" } else { "off" },
                    e
                );
                self.mark_unavailable();
                ActionOutcome::Unavailable
            }
        }
    }

    fn record(&self, is_on: Option<bool>) {
        let value_changed = {
            let mut current = self.is_on.write();
            let changed = *current != is_on;
            *current = is_on;
            changed
        };
        let availability_changed = self.core.set_available(true);
        self.core
            .publish(value_changed || availability_changed, || self.state());
    }

    fn mark_unavailable(&self) {
        let changed = self.core.set_available(false);
        self.core.publish(changed, || self.state());
    }
}

#[async_trait]
impl Entity for PowerSwitch {
    fn kind(&self) -> EntityKind {
        EntityKind::Switch
    }

    fn unique_id(&self) -> &str {
        self.core.unique_id()
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn device_info(&self) -> &DeviceInfo {
        self.core.device_info()
    }

    fn available(&self) -> bool {
        self.core.available()
    }

    fn state(&self) -> EntityState {
        EntityState::Switch {
            available: self.core.available(),
            is_on: self.is_on(),
        }
    }

    fn version(&self) -> u32 {
        self.core.version()
    }

    async fn poll(&self) -> ActionOutcome {
        match self.controller.query_power().await {
            Ok(on) => {
                self.record(Some(on));
                ActionOutcome::Applied
            }
            Err(e) => {
                error!("[Entity] Failed to update matrix status: {}", e);
                self.mark_unavailable();
                ActionOutcome::Unavailable
            }
        }
    }

    fn set_state_listener(&self, listener: StateListener) {
        self.core.set_listener(listener);
    }
}
