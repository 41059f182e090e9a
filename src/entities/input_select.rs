//! Per-output input selector.

use super::{ActionOutcome, Entity, EntityCore, EntityKind, EntityState, StateListener};
use crate::device_info::DeviceInfo;
use crate::matrix::{MatrixController, RouteUpdate};
use crate::naming::NameMap;
use async_trait::async_trait;
use log::{error, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// Enumerated-choice entity choosing the input shown on one output.
///
/// Options are the eight input display names in input order. Selecting an
/// option resolves it back to an input number through the [`NameMap`].
pub struct InputSelect {
    core: EntityCore,
    controller: Arc<MatrixController>,
    output: u8,
    names: Arc<NameMap>,
    current_option: RwLock<Option<String>>,
}

impl InputSelect {
    pub fn new(controller: Arc<MatrixController>, output: u8, names: Arc<NameMap>) -> Self {
        let host = controller.host().to_string();
        Self {
            core: EntityCore::new(
                format!("{}_output_{}_input", host, output),
                format!("{} Input", names.output_name(output)),
                DeviceInfo::for_host(&host),
            ),
            controller,
            output,
            names,
            current_option: RwLock::new(None),
        }
    }

    pub fn output(&self) -> u8 {
        self.output
    }

    pub fn options(&self) -> Vec<String> {
        self.names.input_options()
    }

    pub fn current_option(&self) -> Option<String> {
        self.current_option.read().clone()
    }

    /// Route the input named `option` to this output.
    ///
    /// An option that matches no configured input is logged and ignored:
    /// nothing is sent and neither availability nor the current option change.
    pub async fn select(&self, option: &str) -> ActionOutcome {
        let Some(input) = self.names.input_for_name(option) else {
            warn!(
                "[Entity] Invalid input option selected for output {}: {}",
                self.output, option
            );
            return ActionOutcome::Ignored;
        };

        match self
            .controller
            .set_route(i32::from(self.output), i32::from(input))
            .await
        {
            Ok(()) => {
                self.record(Some(option.to_string()));
                ActionOutcome::Applied
            }
            Err(e) => {
                error!(
                    "[Entity] Failed to set input for output {}: {}",
                    self.output, e
                );
                self.mark_unavailable();
                ActionOutcome::Unavailable
            }
        }
    }

    fn record(&self, option: Option<String>) {
        let value_changed = match option {
            Some(option) => {
                let mut current = self.current_option.write();
                let changed = current.as_deref() != Some(option.as_str());
                *current = Some(option);
                changed
            }
            None => false,
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
impl Entity for InputSelect {
    fn kind(&self) -> EntityKind {
        EntityKind::Select
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
        EntityState::Select {
            available: self.core.available(),
            options: self.options(),
            current_option: self.current_option(),
        }
    }

    fn version(&self) -> u32 {
        self.core.version()
    }

    async fn poll(&self) -> ActionOutcome {
        match self.controller.query_route(i32::from(self.output)).await {
            Ok(RouteUpdate::Routed(input)) => {
                self.record(Some(self.names.input_name(input)));
                ActionOutcome::Applied
            }
            Ok(RouteUpdate::NoUpdate) => {
                self.record(None);
                ActionOutcome::Applied
            }
            Err(e) => {
                error!(
                    "[Entity] Failed to update input status for output {}: {}",
                    self.output, e
                );
                self.mark_unavailable();
                ActionOutcome::Unavailable
            }
        }
    }

    fn set_state_listener(&self, listener: StateListener) {
        self.core.set_listener(listener);
    }
}
