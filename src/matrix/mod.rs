//! Matrix controller: command translation and state caching for one device.

pub mod commands;
mod controller;
mod state;

pub use controller::MatrixController;
pub use state::{DeviceSnapshot, RouteUpdate};
