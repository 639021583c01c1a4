use super::error::{EngineError, EngineResult};

// Below these the annuity formulas switch to their linear limits.
const RATE_EPSILON: f64 = 1e-9;
const REAL_RATE_EPSILON: f64 = 1e-6;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GapAnalysis {
    pub shortfall: f64,
    pub adequacy_pct: f64,
}

/// Lump sum compounds annually, contributions at `rate / 12` monthly; the
/// total is inflated forward and rounded to whole units.
pub fn project_future_value(
    corpus: f64,
    monthly_contribution: f64,
    pre_retirement_rate: f64,
    inflation_rate: f64,
    years: u32,
) -> EngineResult<f64> {
    check_amount("corpus", corpus)?;
    check_amount("monthly_contribution", monthly_contribution)?;
    check_rate("pre_retirement_rate", pre_retirement_rate)?;
    check_rate("inflation_rate", inflation_rate)?;

    let lump_sum = corpus * (1.0 + pre_retirement_rate).powi(years as i32);
    let contributions = monthly_contribution
        * annuity_future_value_factor(pre_retirement_rate / 12.0, years * 12);
    let nominal = (lump_sum + contributions) * (1.0 + inflation_rate).powi(years as i32);
    Ok(nominal.round())
}

pub fn solve_target_corpus(
    monthly_expense_today: f64,
    current_age: u32,
    retirement_age: u32,
    post_retirement_rate: f64,
    inflation_rate: f64,
    life_expectancy: u32,
) -> EngineResult<f64> {
    check_amount("monthly_expense_today", monthly_expense_today)?;
    check_rate("post_retirement_rate", post_retirement_rate)?;
    check_rate("inflation_rate", inflation_rate)?;
    if retirement_age <= current_age {
        return Err(EngineError::invalid(
            "retirement_age",
            "must be greater than current_age",
        ));
    }
    if life_expectancy <= retirement_age {
        return Err(EngineError::invalid(
            "life_expectancy",
            "must be greater than retirement_age",
        ));
    }

    let years_to_retirement = (retirement_age - current_age) as i32;
    let months = 12 * (life_expectancy - retirement_age) as i32;
    let expense_at_retirement =
        monthly_expense_today * (1.0 + inflation_rate).powi(years_to_retirement);

    let real_return = (1.0 + post_retirement_rate) / (1.0 + inflation_rate) - 1.0;
    let target = if real_return.abs() < REAL_RATE_EPSILON {
        expense_at_retirement * months as f64
    } else {
        let monthly = real_return / 12.0;
        expense_at_retirement * (1.0 - (1.0 + monthly).powi(-months)) / monthly
    };
    Ok(target.round())
}

/// Inverse of the contribution term of [`project_future_value`].
pub fn required_extra_contribution(
    projected: f64,
    target: f64,
    years: u32,
    pre_retirement_rate: f64,
    inflation_rate: f64,
) -> EngineResult<f64> {
    check_rate("pre_retirement_rate", pre_retirement_rate)?;
    check_rate("inflation_rate", inflation_rate)?;
    let gap = target - projected;
    if !gap.is_finite() {
        return Err(EngineError::invalid("target", "corpus figures must be finite"));
    }
    if gap <= 0.0 {
        return Err(EngineError::InfeasibleConstraint(
            "projected corpus already meets the target; no extra contribution to solve".to_string(),
        ));
    }
    if years == 0 {
        return Err(EngineError::invalid(
            "years",
            "accumulation horizon must be > 0",
        ));
    }

    let deflated_gap = gap / (1.0 + inflation_rate).powi(years as i32);
    let factor = annuity_future_value_factor(pre_retirement_rate / 12.0, years * 12);
    let extra = deflated_gap / factor;
    if !extra.is_finite() || extra <= 0.0 {
        return Err(EngineError::InfeasibleConstraint(format!(
            "no positive contribution closes a gap of {gap:.2} over {years} years"
        )));
    }
    Ok(round2(extra))
}

/// Counts the retirement year itself: `life_expectancy - retirement_age + 1` years.
pub fn manual_monthly_withdrawal(
    corpus: f64,
    retirement_age: u32,
    life_expectancy: u32,
) -> EngineResult<f64> {
    check_amount("corpus", corpus)?;
    if life_expectancy < retirement_age {
        return Err(EngineError::invalid(
            "life_expectancy",
            "must not be below retirement_age",
        ));
    }
    let years = (life_expectancy - retirement_age + 1) as f64;
    Ok((corpus / (12.0 * years)).round())
}

pub fn corpus_gap(current: f64, target: f64) -> EngineResult<GapAnalysis> {
    if !current.is_finite() || !target.is_finite() {
        return Err(EngineError::invalid("corpus", "corpus figures must be finite"));
    }
    if target == 0.0 {
        return Err(EngineError::invalid(
            "target",
            "target corpus of zero makes adequacy undefined",
        ));
    }
    Ok(GapAnalysis {
        shortfall: target - current,
        adequacy_pct: (current / target * 100.0).round(),
    })
}

fn annuity_future_value_factor(periodic_rate: f64, periods: u32) -> f64 {
    if periodic_rate.abs() < RATE_EPSILON {
        return periods as f64;
    }
    ((1.0 + periodic_rate).powi(periods as i32) - 1.0) / periodic_rate
}

fn check_amount(field: &str, value: f64) -> EngineResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::invalid(field, "must be finite and >= 0"));
    }
    Ok(())
}

fn check_rate(field: &str, rate: f64) -> EngineResult<()> {
    if !rate.is_finite() || rate <= -1.0 {
        return Err(EngineError::invalid(field, "must be finite and > -1"));
    }
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
