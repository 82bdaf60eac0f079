use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StrategyError;

/// Named numeric options for the wire-wall training strategy.
///
/// Unknown option names are kept in `extra` so callers can carry their own
/// tuning values alongside the built-in ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Leaders each wall should end up with.
    pub leaders_per_wall: usize,
    /// Minimum arc-length gap between leaders on the same wall.
    pub leader_spacing: f64,
    /// Trunk length from the root kept free of leaders.
    pub trunk_bare_dist: f64,
    /// Growth kept past the last tie of a leader on its top wire.
    pub leader_excess_stub: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            leaders_per_wall: 5,
            leader_spacing: 0.9,
            trunk_bare_dist: 5.0,
            leader_excess_stub: 2.5,
            extra: BTreeMap::new(),
        }
    }
}

impl StrategyParams {
    /// Builds params from free-form `(name, value)` options, starting from
    /// the defaults.
    pub fn from_options<I, K>(options: I) -> Result<Self, StrategyError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut params = Self::default();
        for (name, value) in options {
            params.set(name, value)?;
        }
        params.validate()?;
        Ok(params)
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) -> Result<(), StrategyError> {
        let name = name.into();
        match name.as_str() {
            "leaders_per_wall" => {
                if !(value.is_finite() && value >= 0.0 && value.fract() == 0.0) {
                    return Err(StrategyError::InvalidParam {
                        name,
                        reason: format!("expected a whole number of leaders, got {value}"),
                    });
                }
                self.leaders_per_wall = value as usize;
            }
            "leader_spacing" => self.leader_spacing = value,
            "trunk_bare_dist" => self.trunk_bare_dist = value,
            "leader_excess_stub" => self.leader_excess_stub = value,
            _ => {
                self.extra.insert(name, value);
            }
        }
        Ok(())
    }

    /// Looks up any option by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "leaders_per_wall" => Some(self.leaders_per_wall as f64),
            "leader_spacing" => Some(self.leader_spacing),
            "trunk_bare_dist" => Some(self.trunk_bare_dist),
            "leader_excess_stub" => Some(self.leader_excess_stub),
            _ => self.extra.get(name).copied(),
        }
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.leaders_per_wall == 0 {
            return Err(StrategyError::InvalidParam {
                name: "leaders_per_wall".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        for (name, value) in [
            ("leader_spacing", self.leader_spacing),
            ("trunk_bare_dist", self.trunk_bare_dist),
            ("leader_excess_stub", self.leader_excess_stub),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(StrategyError::InvalidParam {
                    name: name.to_string(),
                    reason: format!("must be finite and non-negative, got {value}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let params = StrategyParams::default();
        assert_eq!(params.leaders_per_wall, 5);
        assert_eq!(params.leader_spacing, 0.9);
        assert_eq!(params.trunk_bare_dist, 5.0);
        assert_eq!(params.leader_excess_stub, 2.5);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn from_options_routes_known_and_extra_names() {
        let params = StrategyParams::from_options([
            ("leaders_per_wall", 3.0),
            ("leader_spacing", 1.2),
            ("bud_break_temp", 10.5),
        ])
        .expect("options should parse");

        assert_eq!(params.leaders_per_wall, 3);
        assert_eq!(params.get("leader_spacing"), Some(1.2));
        assert_eq!(params.get("trunk_bare_dist"), Some(5.0));
        assert_eq!(params.get("bud_break_temp"), Some(10.5));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = StrategyParams::from_options([("leaders_per_wall", 2.5)])
            .expect_err("fractional quota");
        assert!(err.to_string().contains("leaders_per_wall"));

        let err = StrategyParams::from_options([("leader_spacing", -1.0)])
            .expect_err("negative spacing");
        assert!(err.to_string().contains("leader_spacing"));

        let err = StrategyParams::from_options([("leaders_per_wall", 0.0)])
            .expect_err("zero quota");
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let params: StrategyParams =
            serde_json::from_str(r#"{"leaders_per_wall": 2, "trellis_height": 1.8}"#)
                .expect("json should parse");
        assert_eq!(params.leaders_per_wall, 2);
        assert_eq!(params.leader_spacing, 0.9);
        assert_eq!(params.get("trellis_height"), Some(1.8));
    }
}
