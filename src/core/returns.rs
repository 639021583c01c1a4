use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::error::{EngineError, EngineResult};
use super::prices::{Portfolio, PriceSeries, PriceSource, compose_portfolio_series};
use super::solver::{RootSolveConfig, RootSolveError, solve_root};
use super::types::EstimateMode;

// Bought at each month mark; XIRR is scale-free.
const CONTRIBUTION_UNIT: f64 = 1_000.0;
const DAYS_PER_YEAR: f64 = 365.0;

const XIRR_SOLVE: RootSolveConfig = RootSolveConfig {
    lower_bound: -0.9999,
    upper_bound: 100.0,
    initial_guess: 0.1,
    tolerance: 1e-12,
    max_iterations: 200,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RollingWindowSample {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub irr_pct: f64,
}

/// Decimal annual rate; actual days over a 365-day year.
pub fn xirr(flows: &[(NaiveDate, f64)]) -> Result<f64, RootSolveError> {
    let Some(&(base_date, _)) = flows.first() else {
        return Err(RootSolveError::InvalidConfig(
            "XIRR requires at least 2 cash flows".to_string(),
        ));
    };
    if flows.len() < 2 {
        return Err(RootSolveError::InvalidConfig(
            "XIRR requires at least 2 cash flows".to_string(),
        ));
    }

    let timed: Vec<(f64, f64)> = flows
        .iter()
        .map(|(date, amount)| {
            let years = (*date - base_date).num_days() as f64 / DAYS_PER_YEAR;
            (years, *amount)
        })
        .collect();

    let eval = |rate: f64| {
        let one_plus_r = 1.0 + rate;
        let mut npv = 0.0;
        let mut dnpv = 0.0;
        for &(years, amount) in &timed {
            let discount = one_plus_r.powf(years);
            npv += amount / discount;
            dnpv -= years * amount / (discount * one_plus_r);
        }
        (npv, dnpv)
    };

    solve_root(eval, XIRR_SOLVE).map(|solution| solution.root)
}

pub fn rolling_window_samples(
    series: &PriceSeries,
    horizon_years: u32,
) -> EngineResult<Vec<RollingWindowSample>> {
    let months = horizon_years as usize * 12;
    let points = series.points();
    if months == 0 || points.len() <= months {
        return Ok(Vec::new());
    }

    let mut samples = Vec::with_capacity(points.len() - months);
    let mut flows = Vec::with_capacity(months + 1);
    for start in 0..points.len() - months {
        let window = &points[start..=start + months];
        let last = window[months];

        flows.clear();
        let mut units = 0.0;
        for point in &window[..months] {
            units += CONTRIBUTION_UNIT / point.price;
            flows.push((point.date, -CONTRIBUTION_UNIT));
        }
        flows.push((last.date, units * last.price));

        let rate = xirr(&flows).map_err(|e| EngineError::IrrFailed {
            start: window[0].date,
            end: last.date,
            reason: e.to_string(),
        })?;
        samples.push(RollingWindowSample {
            start: window[0].date,
            end: last.date,
            irr_pct: rate * 100.0,
        });
    }
    Ok(samples)
}

/// Percent, two decimals. Retries once with the longest horizon that fits.
pub fn estimate(series: &PriceSeries, horizon_years: u32, mode: EstimateMode) -> EngineResult<f64> {
    if horizon_years == 0 {
        return Err(EngineError::invalid("horizon_years", "must be > 0"));
    }

    let mut samples = rolling_window_samples(series, horizon_years)?;
    if samples.is_empty() {
        let fallback_years = (series.len() / 12) as i64 - 1;
        warn!(
            requested_years = horizon_years,
            fallback_years,
            samples = series.len(),
            "not enough history for requested horizon, retrying with the longest that fits"
        );
        if fallback_years > 0 {
            samples = rolling_window_samples(series, fallback_years as u32)?;
        }
        if samples.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "{} price samples cannot fill a {horizon_years}-year window or any shorter fallback",
                series.len()
            )));
        }
    }
    debug!(windows = samples.len(), "rolling windows evaluated");

    let mut values: Vec<f64> = samples.iter().map(|s| s.irr_pct).collect();
    Ok(round2(aggregate(&mut values, mode)))
}

pub fn estimate_portfolio_rate(
    portfolio: &Portfolio,
    source: &impl PriceSource,
    horizon_years: u32,
    mode: EstimateMode,
) -> EngineResult<f64> {
    let composite = compose_portfolio_series(portfolio, source)?;
    let pct = estimate(&composite, horizon_years, mode)?;
    info!(horizon_years, ?mode, rate_pct = pct, "portfolio return estimated");
    Ok(pct / 100.0)
}

fn aggregate(values: &mut [f64], mode: EstimateMode) -> f64 {
    match mode {
        EstimateMode::Mean => values.iter().sum::<f64>() / values.len() as f64,
        EstimateMode::Median => percentile(values, 50.0),
        EstimateMode::Pessimistic => percentile(values, 25.0),
        EstimateMode::Optimistic => percentile(values, 75.0),
    }
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
