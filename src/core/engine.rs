use tracing::{info, warn};

use super::config::EngineConfig;
use super::corpus::{
    corpus_gap, manual_monthly_withdrawal, project_future_value, required_extra_contribution,
    solve_target_corpus,
};
use super::error::{EngineError, EngineResult};
use super::prices::PriceSource;
use super::returns::estimate_portfolio_rate;
use super::types::{
    AnalysisResult, CorpusFigure, CorpusKind, RateEstimate, RateSource, RiskProfile,
    ScenarioResult, SwpMode, UserProfile,
};
use super::withdrawal::plan_withdrawal;

pub struct Analyzer<'a, P: PriceSource> {
    config: &'a EngineConfig,
    prices: &'a P,
}

#[derive(Debug, Clone, Copy)]
struct DrawdownParams {
    mode: SwpMode,
    reserve_fraction: f64,
    retirement_age: u32,
    life_expectancy: u32,
    post_retirement_rate: f64,
    inflation_rate: f64,
}

impl<'a, P: PriceSource> Analyzer<'a, P> {
    pub fn new(config: &'a EngineConfig, prices: &'a P) -> Self {
        Self { config, prices }
    }

    pub fn run(
        &self,
        profile: &UserProfile,
        mode: SwpMode,
        pre_retirement_risk: RiskProfile,
        post_retirement_risk: RiskProfile,
    ) -> EngineResult<AnalysisResult> {
        self.config.validate()?;
        profile.validate()?;
        let life_expectancy = self.config.life_expectancy;
        if life_expectancy <= profile.retirement_age {
            return Err(EngineError::invalid(
                "life_expectancy",
                format!(
                    "{life_expectancy} must be greater than retirement_age {}",
                    profile.retirement_age
                ),
            ));
        }

        let accumulation_years = profile.years_to_retirement();
        let drawdown_years = life_expectancy - profile.retirement_age;
        let inflation_rate = self.config.inflation_rate;

        let pre_rate = self.resolve_rate(
            pre_retirement_risk,
            accumulation_years,
            self.config.fallback_pre_retirement_rate,
        )?;
        let post_rate = self.resolve_rate(
            post_retirement_risk,
            drawdown_years,
            self.config.fallback_post_retirement_rate,
        )?;

        let current_corpus = project_future_value(
            profile.current_corpus,
            profile.monthly_contribution,
            pre_rate.rate,
            inflation_rate,
            accumulation_years,
        )?;
        let target_corpus = solve_target_corpus(
            profile.monthly_expense_today,
            profile.current_age,
            profile.retirement_age,
            post_rate.rate,
            inflation_rate,
            life_expectancy,
        )?;
        let gap = corpus_gap(current_corpus, target_corpus)?;

        let extra_monthly_contribution = if gap.shortfall > 0.0 {
            required_extra_contribution(
                current_corpus,
                target_corpus,
                accumulation_years,
                pre_rate.rate,
                inflation_rate,
            )?
        } else {
            0.0
        };

        let drawdown = DrawdownParams {
            mode,
            reserve_fraction: mode.reserve_fraction(self.config),
            retirement_age: profile.retirement_age,
            life_expectancy,
            post_retirement_rate: post_rate.rate,
            inflation_rate,
        };
        let current = build_scenario(
            CorpusFigure {
                kind: CorpusKind::CurrentTrajectory,
                value: current_corpus,
            },
            drawdown,
        )?;
        let target = build_scenario(
            CorpusFigure {
                kind: CorpusKind::Target,
                value: target_corpus,
            },
            drawdown,
        )?;

        info!(
            ?mode,
            current_corpus,
            target_corpus,
            adequacy_pct = gap.adequacy_pct,
            extra_monthly_contribution,
            "retirement analysis complete"
        );

        Ok(AnalysisResult {
            mode,
            pre_retirement_rate: pre_rate,
            post_retirement_rate: post_rate,
            inflation_rate,
            current,
            target,
            corpus_gap: gap.shortfall,
            adequacy_pct: gap.adequacy_pct,
            extra_monthly_contribution,
            required_monthly_contribution: round2(
                profile.monthly_contribution + extra_monthly_contribution,
            ),
        })
    }

    // Only InsufficientData falls back; anything else aborts the run.
    fn resolve_rate(
        &self,
        risk: RiskProfile,
        horizon_years: u32,
        fallback: f64,
    ) -> EngineResult<RateEstimate> {
        let portfolio = self.config.portfolio(risk)?;
        match estimate_portfolio_rate(
            &portfolio,
            self.prices,
            horizon_years,
            self.config.estimate_mode,
        ) {
            Ok(rate) => Ok(RateEstimate {
                rate,
                source: RateSource::Estimated,
            }),
            Err(EngineError::InsufficientData(reason)) => {
                warn!(
                    ?risk,
                    horizon_years,
                    fallback,
                    %reason,
                    "using configured fallback rate"
                );
                Ok(RateEstimate {
                    rate: fallback,
                    source: RateSource::Fallback,
                })
            }
            Err(err) => Err(err),
        }
    }
}

fn build_scenario(corpus: CorpusFigure, drawdown: DrawdownParams) -> EngineResult<ScenarioResult> {
    let manual_monthly_withdrawal = manual_monthly_withdrawal(
        corpus.value,
        drawdown.retirement_age,
        drawdown.life_expectancy,
    )?;
    let sustainable_plan = plan_withdrawal(
        corpus.value,
        drawdown.mode.withdrawal_formula(corpus.kind),
        drawdown.reserve_fraction,
        drawdown.life_expectancy - drawdown.retirement_age,
        drawdown.post_retirement_rate,
        drawdown.inflation_rate,
    )?;
    Ok(ScenarioResult {
        corpus,
        reserve_corpus: corpus.value * drawdown.reserve_fraction,
        manual_monthly_withdrawal,
        sustainable_plan,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCategory;
    use crate::core::prices::{InMemoryPriceSource, PriceSeries};
    use crate::core::types::WithdrawalFormula;
    use crate::core::withdrawal::solve_plain_annuity_withdrawal;
    use chrono::{Months, NaiveDate};

    const ASSETS: [&str; 4] = ["largecap", "s&p_500", "gold", "debt"];

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn growth_series(months: usize, monthly_growth: f64) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(1980, 1, 1).expect("valid date");
        PriceSeries::from_pairs((0..months).map(|i| {
            let date = start
                .checked_add_months(Months::new(i as u32))
                .expect("date in range");
            (date, 100.0 * (1.0 + monthly_growth).powi(i as i32))
        }))
        .expect("valid series")
    }

    fn source_with_history(months: usize) -> InMemoryPriceSource {
        let mut source = InMemoryPriceSource::new();
        for asset in ASSETS {
            source.insert(asset, growth_series(months, 0.01));
        }
        source
    }

    fn sample_profile() -> UserProfile {
        UserProfile {
            current_age: 30,
            retirement_age: 60,
            monthly_expense_today: 50_000.0,
            current_corpus: 1_000_000.0,
            monthly_contribution: 10_000.0,
        }
    }

    fn run_with(
        config: &EngineConfig,
        source: &InMemoryPriceSource,
        profile: &UserProfile,
        mode: SwpMode,
    ) -> EngineResult<AnalysisResult> {
        Analyzer::new(config, source).run(
            profile,
            mode,
            RiskProfile::Aggressive,
            RiskProfile::Conservative,
        )
    }

    #[test]
    fn short_history_falls_back_to_configured_rates() {
        let config = EngineConfig::default();
        let source = source_with_history(6);
        let result =
            run_with(&config, &source, &sample_profile(), SwpMode::Aggressive).expect("analysis");

        assert_eq!(result.pre_retirement_rate.source, RateSource::Fallback);
        assert_eq!(result.post_retirement_rate.source, RateSource::Fallback);
        assert_close(result.pre_retirement_rate.rate, 0.12, 0.0);
        assert_close(result.post_retirement_rate.rate, 0.08, 0.0);
    }

    #[test]
    fn aggressive_scenario_produces_consistent_corpus_figures() {
        let config = EngineConfig::default();
        let source = source_with_history(6);
        let profile = sample_profile();
        let result = run_with(&config, &source, &profile, SwpMode::Aggressive).expect("analysis");

        let current = result.current.corpus.value;
        let target = result.target.corpus.value;
        assert!(current.is_finite() && current > 0.0);
        assert!(target.is_finite() && target > 0.0);
        assert_eq!(result.corpus_gap, target - current);
        assert!(result.adequacy_pct > 0.0 && result.adequacy_pct < 1_000.0);

        let expected_current =
            project_future_value(1_000_000.0, 10_000.0, 0.12, 0.05, 30).expect("projection");
        assert_close(current, expected_current, 0.0);

        // Trajectory overshoots the target, so nothing extra is required.
        assert!(result.corpus_gap < 0.0);
        assert_close(result.extra_monthly_contribution, 0.0, 0.0);
        assert_close(result.required_monthly_contribution, 10_000.0, 0.0);

        assert_eq!(
            result.current.sustainable_plan.formula,
            WithdrawalFormula::InflationIndexed
        );
        assert_eq!(
            result.target.sustainable_plan.formula,
            WithdrawalFormula::Flat
        );
        // Indexed draw starts lower than a constant draw on the same corpus.
        let flat_current =
            solve_plain_annuity_withdrawal(current, 0.08, 15).expect("flat withdrawal");
        assert!(result.current.sustainable_plan.monthly_amount < flat_current);

        for scenario in [&result.current, &result.target] {
            let plan = &scenario.sustainable_plan;
            assert_close(scenario.reserve_corpus, 0.0, 0.0);
            assert_eq!(plan.schedule.len(), 15 * 12 + 1);
            assert!(plan.monthly_amount > 0.0);
            let last = plan.final_balances().expect("rows");
            assert_close(last.core_balance, 0.0, 2.0);
        }
    }

    #[test]
    fn conservative_mode_holds_back_the_configured_reserve() {
        let config = EngineConfig::default();
        let source = source_with_history(6);
        let profile = sample_profile();
        let conservative =
            run_with(&config, &source, &profile, SwpMode::Conservative).expect("conservative");
        let aggressive =
            run_with(&config, &source, &profile, SwpMode::Aggressive).expect("aggressive");

        let target = &conservative.target;
        assert_eq!(
            target.sustainable_plan.formula,
            WithdrawalFormula::ReserveAware
        );
        assert_close(target.reserve_corpus, target.corpus.value * 0.2, 1e-6);
        assert!(
            target.sustainable_plan.monthly_amount < aggressive.target.sustainable_plan.monthly_amount
        );
        // Corpus figures do not depend on the withdrawal mode.
        assert_close(target.corpus.value, aggressive.target.corpus.value, 0.0);
        assert_close(
            conservative.current.manual_monthly_withdrawal,
            aggressive.current.manual_monthly_withdrawal,
            0.0,
        );
    }

    #[test]
    fn shortfall_is_closed_by_the_extra_contribution() {
        let config = EngineConfig::default();
        let source = source_with_history(6);
        let profile = UserProfile {
            current_corpus: 0.0,
            monthly_contribution: 1_000.0,
            ..sample_profile()
        };
        let result = run_with(&config, &source, &profile, SwpMode::Aggressive).expect("analysis");

        assert!(result.corpus_gap > 0.0);
        assert!(result.extra_monthly_contribution > 0.0);
        assert_close(
            result.required_monthly_contribution,
            1_000.0 + result.extra_monthly_contribution,
            0.01,
        );

        let closed = project_future_value(
            0.0,
            result.required_monthly_contribution,
            0.12,
            0.05,
            30,
        )
        .expect("projection");
        let target = result.target.corpus.value;
        assert!((closed - target).abs() / target < 1e-4);
    }

    #[test]
    fn long_history_yields_estimated_rates() {
        let config = EngineConfig::default();
        let source = source_with_history(40 * 12 + 1);
        let result =
            run_with(&config, &source, &sample_profile(), SwpMode::Aggressive).expect("analysis");

        let expected = 1.01_f64.powi(12) - 1.0;
        for rate in [result.pre_retirement_rate, result.post_retirement_rate] {
            assert_eq!(rate.source, RateSource::Estimated);
            assert_close(rate.rate, expected, 0.005);
        }
    }

    #[test]
    fn missing_asset_aborts_instead_of_falling_back() {
        let config = EngineConfig::default();
        let mut source = InMemoryPriceSource::new();
        source.insert("largecap", growth_series(6, 0.01));
        let err = run_with(&config, &source, &sample_profile(), SwpMode::Aggressive)
            .expect_err("unknown asset");
        assert!(matches!(err, EngineError::UnknownAsset(_)));
        assert_eq!(err.category(), ErrorCategory::InvalidRequest);
    }

    #[test]
    fn retirement_at_or_after_life_expectancy_is_rejected() {
        let config = EngineConfig::default();
        let source = source_with_history(6);
        let profile = UserProfile {
            retirement_age: 75,
            ..sample_profile()
        };
        let err = run_with(&config, &source, &profile, SwpMode::Aggressive)
            .expect_err("no drawdown horizon");
        assert!(err.to_string().contains("life_expectancy"));
    }

    #[test]
    fn infeasible_reserve_aborts_the_whole_run() {
        let config = EngineConfig {
            fallback_post_retirement_rate: -0.5,
            conservative_reserve_fraction: 0.99,
            ..EngineConfig::default()
        };
        let source = source_with_history(6);
        let err = run_with(&config, &source, &sample_profile(), SwpMode::Conservative)
            .expect_err("reserve cannot be funded");
        assert_eq!(err.category(), ErrorCategory::Infeasible);
    }
}
