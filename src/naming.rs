//! Display names for matrix inputs and outputs.
//!
//! Names are fixed when the config entry is created. Anything missing, empty
//! or whitespace-only falls back to `"Input N"` / `"Output N"`.

use crate::device_info::{MAX_INPUTS, MAX_OUTPUTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable input/output display names for one matrix.
///
/// Deserialization goes through [`NameMap::new`], so names read from a config
/// file are normalized the same way as names entered on the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawNames")]
pub struct NameMap {
    inputs: BTreeMap<u8, String>,
    outputs: BTreeMap<u8, String>,
}

impl NameMap {
    /// Build a name map from raw user-supplied names.
    ///
    /// Keys outside 1..=8 are dropped, values are trimmed, and blanks are
    /// replaced with the default name.
    pub fn new(inputs: &BTreeMap<u8, String>, outputs: &BTreeMap<u8, String>) -> Self {
        Self {
            inputs: normalize(inputs, MAX_INPUTS, default_input_name),
            outputs: normalize(outputs, MAX_OUTPUTS, default_output_name),
        }
    }

    /// Display name of input `n` (1-based).
    pub fn input_name(&self, n: u8) -> String {
        self.inputs
            .get(&n)
            .cloned()
            .unwrap_or_else(|| default_input_name(n))
    }

    /// Display name of output `n` (1-based).
    pub fn output_name(&self, n: u8) -> String {
        self.outputs
            .get(&n)
            .cloned()
            .unwrap_or_else(|| default_output_name(n))
    }

    /// Selector options, ordered by input number. Duplicates are kept.
    pub fn input_options(&self) -> Vec<String> {
        (1..=MAX_INPUTS).map(|n| self.input_name(n)).collect()
    }

    /// Reverse lookup of an option name. The lowest matching input wins.
    pub fn input_for_name(&self, name: &str) -> Option<u8> {
        (1..=MAX_INPUTS).find(|&n| self.input_name(n) == name)
    }

    pub fn inputs(&self) -> &BTreeMap<u8, String> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<u8, String> {
        &self.outputs
    }
}

impl Default for NameMap {
    fn default() -> Self {
        Self::new(&BTreeMap::new(), &BTreeMap::new())
    }
}

#[derive(Deserialize)]
struct RawNames {
    #[serde(default)]
    inputs: BTreeMap<u8, String>,
    #[serde(default)]
    outputs: BTreeMap<u8, String>,
}

impl From<RawNames> for NameMap {
    fn from(raw: RawNames) -> Self {
        Self::new(&raw.inputs, &raw.outputs)
    }
}

pub fn default_input_name(n: u8) -> String {
    format!("Input {}", n)
}

pub fn default_output_name(n: u8) -> String {
    format!("Output {}", n)
}

fn normalize(
    raw: &BTreeMap<u8, String>,
    max: u8,
    default: fn(u8) -> String,
) -> BTreeMap<u8, String> {
    (1..=max)
        .map(|n| {
            let name = match raw.get(&n).map(|s| s.trim()) {
                Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
                _ => default(n),
            };
            (n, name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pairs: &[(u8, &str)]) -> BTreeMap<u8, String> {
        pairs.iter().map(|(n, s)| (*n, s.to_string())).collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let map = NameMap::default();
        assert_eq!(map.input_name(1), "Input 1");
        assert_eq!(map.output_name(8), "Output 8");
        assert_eq!(map.input_options().len(), 8);
    }

    #[test]
    fn test_whitespace_name_falls_back_to_default() {
        let map = NameMap::new(&names(&[(3, "  ")]), &names(&[(2, "")]));
        assert_eq!(map.input_name(3), "Input 3");
        assert_eq!(map.output_name(2), "Output 2");
        assert_eq!(map.input_for_name("Input 3"), Some(3));
    }

    #[test]
    fn test_names_are_trimmed() {
        let map = NameMap::new(&names(&[(1, "  Apple TV ")]), &BTreeMap::new());
        assert_eq!(map.input_name(1), "Apple TV");
        assert_eq!(map.input_for_name("Apple TV"), Some(1));
        assert_eq!(map.input_for_name("  Apple TV "), None);
    }

    #[test]
    fn test_out_of_range_keys_dropped() {
        let map = NameMap::new(&names(&[(0, "Zero"), (9, "Nine")]), &BTreeMap::new());
        assert_eq!(map.inputs().len(), 8);
        assert_eq!(map.input_for_name("Nine"), None);
    }

    #[test]
    fn test_duplicate_names_kept_and_first_wins() {
        let map = NameMap::new(&names(&[(2, "Console"), (5, "Console")]), &BTreeMap::new());
        let options = map.input_options();
        assert_eq!(options[1], "Console");
        assert_eq!(options[4], "Console");
        assert_eq!(map.input_for_name("Console"), Some(2));
    }

    #[test]
    fn test_serde_uses_numeric_keys() {
        let map = NameMap::new(&names(&[(1, "Roku")]), &BTreeMap::new());
        let json = serde_json::to_string(&map).unwrap();
        let back: NameMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
        assert!(json.contains("\"1\":\"Roku\""));
    }

    #[test]
    fn test_deserialize_normalizes_partial_maps() {
        let map: NameMap =
            serde_json::from_str(r#"{"inputs": {"3": "   ", "4": " Blu-ray "}}"#).unwrap();
        assert_eq!(map.input_name(3), "Input 3");
        assert_eq!(map.input_name(4), "Blu-ray");
        assert_eq!(map.output_name(1), "Output 1");
    }
}
