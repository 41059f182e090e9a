//! Blackbird Bridge library.
//!
//! Controls a Monoprice Blackbird 27842 8x8 HDMI matrix over its TCP control
//! port and exposes it as one power switch plus one input selector per output.

pub mod config;
pub mod device_info;
pub mod device_lock;
pub mod entities;
pub mod error;
pub mod integration;
pub mod matrix;
pub mod naming;
pub mod transport;
