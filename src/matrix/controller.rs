//! The matrix controller.
//!
//! Owns the shared transport for one matrix and a cached [`DeviceSnapshot`].
//! The cache only ever holds values the device confirmed; a failed command
//! leaves the previous value in place.

use super::commands;
use super::state::{DeviceSnapshot, RouteUpdate};
use crate::device_info::{MAX_INPUTS, MAX_OUTPUTS};
use crate::error::{MatrixError, Result};
use crate::transport::{Connector, Transport, socket_url};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Command translation and state caching for one physical matrix.
///
/// Shared by every entity of the device. Exchanges are serialized by the
/// transport; cached fields follow last-write-wins.
pub struct MatrixController {
    host: String,
    port: u16,
    transport: Arc<dyn Transport>,
    state: RwLock<DeviceSnapshot>,
    timeout: Duration,
}

impl MatrixController {
    /// Open the transport. Makes exactly one attempt; retry policy belongs to
    /// the caller.
    pub async fn connect(
        connector: &dyn Connector,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self> {
        let url = socket_url(host, port);
        info!("[Matrix] Connecting to {}", url);
        let transport = connector.connect(&url, timeout).await?;
        Ok(Self::with_transport(host, port, transport, timeout))
    }

    /// Wrap an already connected transport.
    pub fn with_transport(
        host: &str,
        port: u16,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            transport,
            state: RwLock::new(DeviceSnapshot::default()),
            timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Best-effort close. Never fails.
    pub async fn disconnect(&self) {
        info!("[Matrix] Disconnecting from {}:{}", self.host, self.port);
        self.transport.disconnect().await;
    }

    /// Cached state, without touching the device.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.read().clone()
    }

    /// Switch the matrix on or off. The cache is updated only on success.
    pub async fn set_power(&self, on: bool) -> Result<()> {
        let command = if on {
            commands::POWER_ON
        } else {
            commands::POWER_OFF
        };
        self.exchange(command).await?;
        self.state.write().power = Some(on);
        info!(
            "[Matrix] {} powered {}",
            self.host,
            if on { "on" } else { "off" }
        );
        Ok(())
    }

    /// Route `input` to `output`. Both must be in 1..=8.
    pub async fn set_route(&self, output: i32, input: i32) -> Result<()> {
        let output = check_channel("output", output, MAX_OUTPUTS)?;
        let input = check_channel("input", input, MAX_INPUTS)?;

        self.exchange(&commands::route(output, input)).await?;
        self.state.write().set_route(output, input);
        info!("[Matrix] {} output {} <- input {}", self.host, output, input);
        Ok(())
    }

    /// Ask the device whether it is powered on. Routing is left untouched.
    pub async fn query_power(&self) -> Result<bool> {
        let reply = self.exchange(commands::STATUS).await?;
        let on = commands::reports_power_on(&reply);
        self.state.write().power = Some(on);
        Ok(on)
    }

    /// Ask the device which input `output` shows.
    ///
    /// Every routing line in the reply is applied to the cache. If the reply
    /// does not cover `output`, the result is [`RouteUpdate::NoUpdate`] and
    /// the cached value for `output` is kept.
    pub async fn query_route(&self, output: i32) -> Result<RouteUpdate> {
        let output = check_channel("output", output, MAX_OUTPUTS)?;
        let reply = self.exchange(commands::VIDEO_STATUS).await?;
        let routes = commands::parse_routes(&reply);

        let mut update = RouteUpdate::NoUpdate;
        {
            let mut state = self.state.write();
            for &(reported_output, input) in &routes {
                state.set_route(reported_output, input);
                if reported_output == output {
                    update = RouteUpdate::Routed(input);
                }
            }
        }

        if update == RouteUpdate::NoUpdate {
            debug!(
                "[Matrix] {} status reply did not cover output {}",
                self.host, output
            );
        }
        Ok(update)
    }

    /// Refresh power and the whole routing table.
    pub async fn query_state(&self) -> Result<DeviceSnapshot> {
        self.query_power().await?;
        let reply = self.exchange(commands::VIDEO_STATUS).await?;
        {
            let mut state = self.state.write();
            for (output, input) in commands::parse_routes(&reply) {
                state.set_route(output, input);
            }
        }
        Ok(self.snapshot())
    }

    /// Model string reported by the device. Used to probe a new connection.
    pub async fn query_model(&self) -> Result<String> {
        let reply = self.exchange(commands::MODEL).await?;
        Ok(reply.trim().to_string())
    }

    /// One bounded command exchange.
    async fn exchange(&self, command: &str) -> Result<String> {
        let reply = self
            .transport
            .send(command, self.timeout)
            .await
            .map_err(|e| {
                if e.is_command_error() {
                    e
                } else {
                    MatrixError::command(command, e.to_string())
                }
            })?;

        if commands::is_error_reply(&reply) {
            warn!("[Matrix] {} rejected {:?}", self.host, command);
            return Err(MatrixError::command(command, "rejected by device"));
        }
        Ok(reply)
    }
}

fn check_channel(kind: &'static str, value: i32, max: u8) -> Result<u8> {
    match u8::try_from(value) {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(MatrixError::InvalidArgument { kind, value, max }),
    }
}
