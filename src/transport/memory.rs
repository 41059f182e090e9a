//! In-memory simulated Blackbird matrix.
//!
//! Understands the same command set as the real device and echoes committed
//! routes back on status queries. Used by the daemon's `--simulate` mode and by
//! the tests, which also use its failure injection, scripted replies and the
//! log of sent commands.

use super::{Connector, Transport};
use crate::device_info::{DEVICE_MODEL, MAX_INPUTS, MAX_OUTPUTS};
use crate::error::{MatrixError, Result};
use crate::matrix::commands;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

struct SimState {
    power: bool,
    /// `routing[o - 1]` is the input shown on output `o`.
    routing: [u8; MAX_OUTPUTS as usize],
}

/// Simulated matrix reachable through the [`Transport`] contract.
pub struct MemoryTransport {
    state: Mutex<SimState>,
    connected: AtomicBool,
    fail_commands: AtomicBool,
    latency: Mutex<Duration>,
    scripted: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<String>>,
    /// Serializes exchanges the way a real line-based link must.
    exchange: tokio::sync::Mutex<()>,
}

impl MemoryTransport {
    /// A powered-on matrix with output N showing input N.
    pub fn new() -> Self {
        let mut routing = [0u8; MAX_OUTPUTS as usize];
        for (idx, input) in routing.iter_mut().enumerate() {
            *input = idx as u8 + 1;
        }
        Self {
            state: Mutex::new(SimState {
                power: true,
                routing,
            }),
            connected: AtomicBool::new(true),
            fail_commands: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            scripted: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            exchange: tokio::sync::Mutex::new(()),
        }
    }

    /// Make every following command fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail_commands.store(failing, Ordering::SeqCst);
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Queue a raw reply returned for the next command instead of the
    /// simulated one. The simulated state is not touched.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.scripted.lock().push_back(reply.into());
    }

    /// Every command received so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn power(&self) -> bool {
        self.state.lock().power
    }

    /// Input currently shown on `output` (1-based).
    pub fn route(&self, output: u8) -> Option<u8> {
        let idx = usize::from(output).checked_sub(1)?;
        self.state.lock().routing.get(idx).copied()
    }

    /// Change the simulated device directly, as a front-panel press would.
    pub fn set_power(&self, on: bool) {
        self.state.lock().power = on;
    }

    pub fn set_route(&self, output: u8, input: u8) {
        let mut state = self.state.lock();
        if let Some(slot) = usize::from(output)
            .checked_sub(1)
            .and_then(|idx| state.routing.get_mut(idx))
        {
            *slot = input;
        }
    }

    fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn routing_lines(state: &SimState) -> String {
        state
            .routing
            .iter()
            .enumerate()
            .map(|(idx, input)| commands::route_line(idx as u8 + 1, *input))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    fn simulate(&self, command: &str) -> String {
        let mut state = self.state.lock();
        match command {
            commands::POWER_ON => {
                state.power = true;
                commands::POWER_ON_MARKER.to_string()
            }
            commands::POWER_OFF => {
                state.power = false;
                commands::POWER_OFF_MARKER.to_string()
            }
            commands::STATUS => {
                let power = if state.power {
                    commands::POWER_ON_MARKER
                } else {
                    commands::POWER_OFF_MARKER
                };
                format!("{}\r\n{}", power, Self::routing_lines(&state))
            }
            commands::VIDEO_STATUS => Self::routing_lines(&state),
            commands::MODEL => DEVICE_MODEL.to_string(),
            other => match commands::parse_route(other) {
                Some((output, input))
                    if (1..=MAX_OUTPUTS).contains(&output) && (1..=MAX_INPUTS).contains(&input) =>
                {
                    state.routing[usize::from(output - 1)] = input;
                    commands::route_line(output, input)
                }
                _ => commands::ERROR_MARKER.to_string(),
            },
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, command: &str, timeout: Duration) -> Result<String> {
        let _guard = self.exchange.lock().await;

        if !self.is_connected() {
            return Err(MatrixError::command(command, "not connected"));
        }
        self.sent.lock().push(command.to_string());

        let latency = *self.latency.lock();
        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(MatrixError::timeout(command, timeout));
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(MatrixError::command(command, "simulated link failure"));
        }

        let reply = match self.scripted.lock().pop_front() {
            Some(reply) => reply,
            None => self.simulate(command),
        };
        debug!("[Transport] sim {:?} -> {:?}", command, reply);
        Ok(reply)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        info!("[Transport] Simulated matrix disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Hands out one shared [`MemoryTransport`].
pub struct MemoryConnector {
    transport: Arc<MemoryTransport>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(transport: Arc<MemoryTransport>) -> Self {
        Self {
            transport,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Refuse (or accept again) every following connect attempt.
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> Arc<MemoryTransport> {
        self.transport.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str, _timeout: Duration) -> Result<Arc<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(MatrixError::Connection {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.transport.mark_connected();
        info!("[Transport] Connected to simulated matrix at {}", url);
        Ok(self.transport.clone())
    }
}
