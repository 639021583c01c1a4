use std::collections::BTreeMap;

use serde::Deserialize;

use super::error::{EngineError, EngineResult};
use super::prices::Portfolio;
use super::types::{EstimateMode, RiskProfile};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub inflation_rate: f64,
    pub fallback_pre_retirement_rate: f64,
    pub fallback_post_retirement_rate: f64,
    pub life_expectancy: u32,
    pub conservative_reserve_fraction: f64,
    pub estimate_mode: EstimateMode,
    pub portfolios: BTreeMap<RiskProfile, BTreeMap<String, f64>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut portfolios = BTreeMap::new();
        portfolios.insert(
            RiskProfile::Conservative,
            weights(&[("largecap", 0.10), ("debt", 0.55), ("gold", 0.35)]),
        );
        portfolios.insert(
            RiskProfile::Balanced,
            weights(&[("largecap", 0.30), ("s&p_500", 0.20), ("gold", 0.50)]),
        );
        portfolios.insert(
            RiskProfile::Aggressive,
            weights(&[("largecap", 0.70), ("s&p_500", 0.10), ("gold", 0.20)]),
        );

        Self {
            inflation_rate: 0.05,
            fallback_pre_retirement_rate: 0.12,
            fallback_post_retirement_rate: 0.08,
            life_expectancy: 75,
            conservative_reserve_fraction: 0.2,
            estimate_mode: EstimateMode::Median,
            portfolios,
        }
    }
}

fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs
        .iter()
        .map(|(name, weight)| (name.to_string(), *weight))
        .collect()
}

impl EngineConfig {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::invalid("config", format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (field, rate) in [
            ("inflation_rate", self.inflation_rate),
            ("fallback_pre_retirement_rate", self.fallback_pre_retirement_rate),
            (
                "fallback_post_retirement_rate",
                self.fallback_post_retirement_rate,
            ),
        ] {
            if !rate.is_finite() || rate <= -1.0 {
                return Err(EngineError::invalid(field, "must be finite and > -1"));
            }
        }
        if self.life_expectancy == 0 {
            return Err(EngineError::invalid("life_expectancy", "must be > 0"));
        }
        if !(0.0..1.0).contains(&self.conservative_reserve_fraction) {
            return Err(EngineError::invalid(
                "conservative_reserve_fraction",
                "must be in [0, 1)",
            ));
        }
        for risk in self.portfolios.keys() {
            self.portfolio(*risk)?;
        }
        Ok(())
    }

    pub fn portfolio(&self, risk: RiskProfile) -> EngineResult<Portfolio> {
        let table = self.portfolios.get(&risk).ok_or_else(|| {
            EngineError::invalid("portfolios", format!("no portfolio configured for {risk:?}"))
        })?;
        Portfolio::new(table.clone())
    }
}
