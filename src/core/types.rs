use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::error::{EngineError, EngineResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwpMode {
    Aggressive,
    Conservative,
}

impl SwpMode {
    pub fn withdrawal_formula(self, kind: CorpusKind) -> WithdrawalFormula {
        match (self, kind) {
            (SwpMode::Aggressive, CorpusKind::CurrentTrajectory) => {
                WithdrawalFormula::InflationIndexed
            }
            (SwpMode::Aggressive, CorpusKind::Target) => WithdrawalFormula::Flat,
            (SwpMode::Conservative, _) => WithdrawalFormula::ReserveAware,
        }
    }

    pub fn reserve_fraction(self, config: &EngineConfig) -> f64 {
        match self {
            SwpMode::Aggressive => 0.0,
            SwpMode::Conservative => config.conservative_reserve_fraction,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    Balanced,
    Aggressive,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateMode {
    Mean,
    #[default]
    Median,
    Pessimistic,
    Optimistic,
}

impl std::str::FromStr for EstimateMode {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(EstimateMode::Mean),
            "median" => Ok(EstimateMode::Median),
            "pessimistic" => Ok(EstimateMode::Pessimistic),
            "optimistic" => Ok(EstimateMode::Optimistic),
            other => Err(EngineError::invalid(
                "estimate_mode",
                format!("unknown mode '{other}', expected mean, median, pessimistic or optimistic"),
            )),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalFormula {
    /// Constant draw, no annual step-up.
    Flat,
    /// Draw steps up with inflation each year and runs the corpus to zero.
    InflationIndexed,
    /// Draw and reserve step up with inflation; the discounted reserve is
    /// carved out before amortizing.
    ReserveAware,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorpusKind {
    CurrentTrajectory,
    Target,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusFigure {
    pub kind: CorpusKind,
    pub value: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Estimated,
    Fallback,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateEstimate {
    /// Decimal annual rate, e.g. 0.1234.
    pub rate: f64,
    pub source: RateSource,
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub current_age: u32,
    pub retirement_age: u32,
    pub monthly_expense_today: f64,
    pub current_corpus: f64,
    pub monthly_contribution: f64,
}

impl UserProfile {
    pub fn validate(&self) -> EngineResult<()> {
        if self.current_age == 0 {
            return Err(EngineError::invalid("current_age", "must be > 0"));
        }
        if self.retirement_age <= self.current_age {
            return Err(EngineError::invalid(
                "retirement_age",
                "must be > current_age",
            ));
        }
        for (field, value) in [
            ("monthly_expense_today", self.monthly_expense_today),
            ("current_corpus", self.current_corpus),
            ("monthly_contribution", self.monthly_contribution),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid(field, "must be finite and >= 0"));
            }
        }
        Ok(())
    }

    pub fn years_to_retirement(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub month: u32,
    pub core_balance: f64,
    pub reserve_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalPlan {
    pub formula: WithdrawalFormula,
    pub reserve_fraction: f64,
    pub monthly_amount: f64,
    pub schedule: Vec<ScheduleRow>,
}

impl WithdrawalPlan {
    pub fn final_balances(&self) -> Option<ScheduleRow> {
        self.schedule.last().copied()
    }

    pub fn year_end_rows(&self) -> Vec<ScheduleRow> {
        self.schedule
            .iter()
            .filter(|row| row.month % 12 == 0)
            .copied()
            .collect()
    }

    /// First month whose core balance is below zero.
    pub fn depletion_month(&self) -> Option<u32> {
        self.schedule
            .iter()
            .find(|row| row.core_balance < 0.0)
            .map(|row| row.month)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub corpus: CorpusFigure,
    pub reserve_corpus: f64,
    pub manual_monthly_withdrawal: f64,
    pub sustainable_plan: WithdrawalPlan,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub mode: SwpMode,
    pub pre_retirement_rate: RateEstimate,
    pub post_retirement_rate: RateEstimate,
    pub inflation_rate: f64,
    pub current: ScenarioResult,
    pub target: ScenarioResult,
    pub corpus_gap: f64,
    pub adequacy_pct: f64,
    pub extra_monthly_contribution: f64,
    pub required_monthly_contribution: f64,
}
