//! Host-side glue: config flow, entry setup/teardown and polling.

mod config_flow;
mod poller;
mod registry;

pub use config_flow::{ConfigEntry, ConfigFlow, ValidatedDevice, unique_id, validate_connection};
pub use poller::{PollSummary, poll_all, poll_once, spawn_poller};
pub use registry::{EntryRegistry, LoadedEntry};
