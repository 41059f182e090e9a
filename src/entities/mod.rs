//! Entity adapters presenting matrix state to the host.
//!
//! Two kinds share the [`Entity`] contract (identity, availability, poll):
//! - [`PowerSwitch`]: on/off entity for matrix power
//! - [`InputSelect`]: one enumerated-choice entity per output
//!
//! No adapter operation returns an error. Failures become an explicit
//! [`ActionOutcome::Unavailable`] and flip the entity's availability.

mod helpers;
mod input_select;
mod power_switch;

pub use helpers::EntityCore;
pub use input_select::InputSelect;
pub use power_switch::PowerSwitch;

use crate::device_info::DeviceInfo;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use strum::Display;

/// Host platform an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Switch,
    Select,
}

/// Externally visible state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityState {
    Switch {
        available: bool,
        is_on: Option<bool>,
    },
    Select {
        available: bool,
        options: Vec<String>,
        current_option: Option<String>,
    },
}

impl EntityState {
    pub fn available(&self) -> bool {
        match self {
            Self::Switch { available, .. } | Self::Select { available, .. } => *available,
        }
    }
}

/// Result of a poll or user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The device confirmed the read or write.
    Applied,
    /// The exchange failed; the entity is now unavailable.
    Unavailable,
    /// Nothing was sent (e.g. unknown option name).
    Ignored,
}

/// Called with `(unique_id, new_state)` whenever an entity's state changes.
pub type StateListener = Arc<dyn Fn(&str, &EntityState) + Send + Sync>;

/// Common contract of all matrix entities.
#[async_trait]
pub trait Entity: Send + Sync + 'static {
    fn kind(&self) -> EntityKind;

    fn unique_id(&self) -> &str;

    fn name(&self) -> &str;

    fn device_info(&self) -> &DeviceInfo;

    fn available(&self) -> bool;

    fn state(&self) -> EntityState;

    /// Incremented every time the visible state changes.
    fn version(&self) -> u32;

    /// Refresh state from the device.
    async fn poll(&self) -> ActionOutcome;

    /// Register the callback used to push state changes to the host.
    fn set_state_listener(&self, listener: StateListener);
}
