//! Strategy parameter sets and the partial-patch update path.
//!
//! Parameters are plain serde structs. An update takes a JSON patch,
//! deep-merges it onto the serialized current value, deserializes the result
//! and validates it. Only a fully valid set replaces the active one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Invariants that serde alone cannot enforce.
pub trait Validate {
    fn collect_errors(&self, errors: &mut Vec<String>);

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.collect_errors(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(errors.join("; ")))
        }
    }
}

/// KDJ oscillator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdjParams {
    pub period: usize,
    pub k_smooth: usize,
    pub d_smooth: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for KdjParams {
    fn default() -> Self {
        Self {
            period: 9,
            k_smooth: 3,
            d_smooth: 3,
            oversold: 20.0,
            overbought: 80.0,
        }
    }
}

impl Validate for KdjParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.period == 0 {
            errors.push("kdj.period must be > 0".to_string());
        }
        if self.k_smooth == 0 || self.d_smooth == 0 {
            errors.push("kdj smoothing windows must be > 0".to_string());
        }
        if !(0.0 < self.oversold && self.oversold < self.overbought && self.overbought <= 100.0) {
            errors.push(format!(
                "kdj thresholds must satisfy 0 < oversold < overbought <= 100 (got {} / {})",
                self.oversold, self.overbought
            ));
        }
    }
}

/// MACD periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl MacdParams {
    pub fn standard() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 5,
            slow: 13,
            signal: 4,
        }
    }
}

impl Validate for MacdParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.fast == 0 || self.slow == 0 || self.signal == 0 {
            errors.push("macd periods must be > 0".to_string());
        }
        if self.fast >= self.slow {
            errors.push(format!(
                "macd.fast must be < macd.slow (got {} >= {})",
                self.fast, self.slow
            ));
        }
    }
}

/// Confidence floor and exit thresholds shared by every strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitParams {
    pub min_confidence: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl ExitParams {
    fn with_confidence(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            ..Self::default()
        }
    }
}

impl Default for ExitParams {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            stop_loss: 0.02,
            take_profit: 0.04,
        }
    }
}

impl Validate for ExitParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
        ] {
            if !(value > 0.0 && value < 1.0) {
                errors.push(format!("{} must be in (0, 1), got {}", name, value));
            }
        }
    }
}

/// `KDJ_MACD` parameters, nested the way the dashboard patches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    pub kdj: KdjParams,
    pub macd: MacdParams,
    #[serde(flatten)]
    pub exits: ExitParams,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            kdj: KdjParams::default(),
            macd: MacdParams::default(),
            exits: ExitParams::with_confidence(0.55),
        }
    }
}

impl Validate for CompositeParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        self.kdj.collect_errors(errors);
        self.macd.collect_errors(errors);
        self.exits.collect_errors(errors);
    }
}

/// Standalone `KDJ` parameters (flat keys)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KdjStrategyParams {
    #[serde(flatten)]
    pub kdj: KdjParams,
    #[serde(flatten)]
    pub exits: ExitParams,
}

impl Validate for KdjStrategyParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        self.kdj.collect_errors(errors);
        self.exits.collect_errors(errors);
    }
}

/// Standalone `MACD` parameters (flat keys)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdStrategyParams {
    #[serde(flatten)]
    pub macd: MacdParams,
    #[serde(flatten)]
    pub exits: ExitParams,
}

impl Default for MacdStrategyParams {
    fn default() -> Self {
        Self {
            macd: MacdParams::standard(),
            exits: ExitParams::default(),
        }
    }
}

impl Validate for MacdStrategyParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        self.macd.collect_errors(errors);
        self.exits.collect_errors(errors);
    }
}

/// Moving average flavour for `MA_CROSS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MaType {
    Sma,
    Ema,
}

/// `MA_CROSS` parameters (flat keys)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaCrossParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_type: MaType,
    #[serde(flatten)]
    pub exits: ExitParams,
}

impl Default for MaCrossParams {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
            ma_type: MaType::Ema,
            exits: ExitParams::default(),
        }
    }
}

impl Validate for MaCrossParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.fast_period == 0 || self.slow_period == 0 {
            errors.push("moving average periods must be > 0".to_string());
        }
        if self.fast_period >= self.slow_period {
            errors.push(format!(
                "fast_period must be < slow_period (got {} >= {})",
                self.fast_period, self.slow_period
            ));
        }
        self.exits.collect_errors(errors);
    }
}

/// `RSI` parameters (flat keys)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiParams {
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
    #[serde(flatten)]
    pub exits: ExitParams,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            exits: ExitParams::default(),
        }
    }
}

impl Validate for RsiParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.rsi_period == 0 {
            errors.push("rsi_period must be > 0".to_string());
        }
        if !(0.0 < self.oversold && self.oversold < self.overbought && self.overbought < 100.0) {
            errors.push(format!(
                "rsi thresholds must satisfy 0 < oversold < overbought < 100 (got {} / {})",
                self.oversold, self.overbought
            ));
        }
        self.exits.collect_errors(errors);
    }
}

/// `GRID` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    pub grid_count: usize,
    /// Total band width as a fraction of the base price
    pub price_range: f64,
    /// Band centre; the first close seen when unset
    pub base_price: Option<f64>,
    /// Units bought per level
    pub grid_size: f64,
    /// Units the grid may hold across all levels
    pub max_position: f64,
    pub min_confidence: f64,
    /// Relative distance at which a close counts as touching a level
    pub tolerance: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            grid_count: 10,
            price_range: 0.05,
            base_price: None,
            grid_size: 0.01,
            max_position: 1.0,
            min_confidence: 0.7,
            tolerance: 0.001,
        }
    }
}

impl Validate for GridParams {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.grid_count < 2 {
            errors.push(format!("grid_count must be >= 2, got {}", self.grid_count));
        }
        if !(self.price_range > 0.0 && self.price_range < 1.0) {
            errors.push(format!("price_range must be in (0, 1), got {}", self.price_range));
        }
        if let Some(base) = self.base_price {
            if base <= 0.0 {
                errors.push(format!("base_price must be > 0, got {}", base));
            }
        }
        if self.grid_size <= 0.0 || self.max_position <= 0.0 {
            errors.push("grid_size and max_position must be > 0".to_string());
        }
        if !(self.min_confidence > 0.0 && self.min_confidence < 1.0) {
            errors.push(format!(
                "min_confidence must be in (0, 1), got {}",
                self.min_confidence
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance < 0.1) {
            errors.push(format!("tolerance must be in (0, 0.1), got {}", self.tolerance));
        }
    }
}

/// Recursively merge `patch` into `base`. Objects merge key by key, any other
/// value replaces what was there.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Produce a new validated parameter set from `current` plus `patch`.
///
/// `current` is left untouched; on any error the caller keeps using it.
pub fn apply_patch<P>(current: &P, patch: &Value) -> Result<P>
where
    P: Serialize + DeserializeOwned + Validate,
{
    if !patch.is_object() {
        return Err(EngineError::Validation(
            "parameter patch must be a JSON object".to_string(),
        ));
    }
    let mut merged = serde_json::to_value(current)?;
    deep_merge(&mut merged, patch);
    let candidate: P = serde_json::from_value(merged)
        .map_err(|e| EngineError::Validation(format!("malformed parameter patch: {}", e)))?;
    candidate.validate()?;
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CompositeParams::default().validate().is_ok());
        assert!(KdjStrategyParams::default().validate().is_ok());
        assert!(MacdStrategyParams::default().validate().is_ok());
        assert!(MaCrossParams::default().validate().is_ok());
        assert!(RsiParams::default().validate().is_ok());
        assert!(GridParams::default().validate().is_ok());
        assert_eq!(CompositeParams::default().exits.min_confidence, 0.55);
        assert_eq!(MacdStrategyParams::default().macd.slow, 26);
    }

    #[test]
    fn test_nested_patch_keeps_siblings() {
        let current = CompositeParams::default();
        let updated = apply_patch(&current, &json!({"macd": {"fast": 8}})).unwrap();
        assert_eq!(updated.macd, MacdParams { fast: 8, slow: 13, signal: 4 });
        assert_eq!(updated.kdj, current.kdj);
        assert_eq!(updated.exits, current.exits);
    }

    #[test]
    fn test_patch_serializes_flat_exit_keys() {
        let value = serde_json::to_value(CompositeParams::default()).unwrap();
        assert_eq!(value["min_confidence"], json!(0.55));
        assert_eq!(value["macd"]["slow"], json!(13));

        let updated =
            apply_patch(&CompositeParams::default(), &json!({"stop_loss": 0.03})).unwrap();
        assert_eq!(updated.exits.stop_loss, 0.03);
    }

    #[test]
    fn test_invalid_patch_is_rejected() {
        let current = CompositeParams::default();
        let err = apply_patch(&current, &json!({"macd": {"fast": 20}})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = apply_patch(&current, &json!({"kdj": {"oversold": 90}})).unwrap_err();
        assert!(err.to_string().contains("oversold"));

        assert!(apply_patch(&current, &json!({"take_profit": 1.5})).is_err());
        assert!(apply_patch(&current, &json!([1, 2])).is_err());
        assert!(apply_patch(&current, &json!({"kdj": {"period": "nine"}})).is_err());
    }

    #[test]
    fn test_standalone_flat_patch() {
        let current = KdjStrategyParams::default();
        let updated = apply_patch(&current, &json!({"period": 14, "overbought": 75})).unwrap();
        assert_eq!(updated.kdj.period, 14);
        assert_eq!(updated.kdj.overbought, 75.0);
        assert_eq!(updated.kdj.oversold, 20.0);
    }

    #[test]
    fn test_ma_type_and_band_checks() {
        let updated = apply_patch(&MaCrossParams::default(), &json!({"ma_type": "SMA"})).unwrap();
        assert_eq!(updated.ma_type, MaType::Sma);
        assert!(apply_patch(&MaCrossParams::default(), &json!({"ma_type": "WMA"})).is_err());
        assert!(apply_patch(&MaCrossParams::default(), &json!({"fast_period": 50})).is_err());

        let err = apply_patch(&RsiParams::default(), &json!({"oversold": 75})).unwrap_err();
        assert!(err.to_string().contains("rsi thresholds"));

        let grid = apply_patch(&GridParams::default(), &json!({"base_price": 100.0})).unwrap();
        assert_eq!(grid.base_price, Some(100.0));
        assert!(apply_patch(&GridParams::default(), &json!({"grid_count": 1})).is_err());
    }

    #[test]
    fn test_deep_merge_replaces_scalars() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "d": 3});
        deep_merge(&mut base, &json!({"a": {"c": 5}, "d": {"e": 1}}));
        assert_eq!(base, json!({"a": {"b": 1, "c": 5}, "d": {"e": 1}}));
    }
}
