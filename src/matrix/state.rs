//! Cached view of one matrix between polls.

use crate::device_info::MAX_OUTPUTS;
use serde::{Deserialize, Serialize};

/// Best-effort cached device state.
///
/// Every field is either a value confirmed by the device or `None` (unknown).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub power: Option<bool>,
    /// `routing[o - 1]` is the input shown on output `o`.
    pub routing: [Option<u8>; MAX_OUTPUTS as usize],
}

impl DeviceSnapshot {
    /// Cached input for `output` (1-based).
    pub fn route(&self, output: u8) -> Option<u8> {
        let idx = usize::from(output).checked_sub(1)?;
        self.routing.get(idx).copied().flatten()
    }

    pub(crate) fn set_route(&mut self, output: u8, input: u8) {
        if let Some(slot) = usize::from(output)
            .checked_sub(1)
            .and_then(|idx| self.routing.get_mut(idx))
        {
            *slot = Some(input);
        }
    }

    /// Whether every output has a confirmed route.
    pub fn routing_known(&self) -> bool {
        self.routing.iter().all(Option::is_some)
    }
}

/// Result of polling one output's route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteUpdate {
    /// The device confirmed this input for the requested output.
    Routed(u8),
    /// The reply did not mention the requested output; keep the previous value.
    NoUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_until_set() {
        let mut snapshot = DeviceSnapshot::default();
        assert_eq!(snapshot.power, None);
        assert_eq!(snapshot.route(1), None);
        assert!(!snapshot.routing_known());

        snapshot.set_route(1, 5);
        assert_eq!(snapshot.route(1), Some(5));
        assert_eq!(snapshot.route(2), None);
    }

    #[test]
    fn test_out_of_range_outputs_ignored() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.set_route(0, 1);
        snapshot.set_route(9, 1);
        assert_eq!(snapshot, DeviceSnapshot::default());
        assert_eq!(snapshot.route(0), None);
    }
}
