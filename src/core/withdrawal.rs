use std::fmt::Write as _;

use tracing::debug;

use super::error::{EngineError, EngineResult};
use super::types::{ScheduleRow, WithdrawalFormula, WithdrawalPlan};

const RATE_EPSILON: f64 = 1e-12;

pub fn monthly_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / 12.0) - 1.0
}

/// Flat monthly withdrawal that leaves `reserve_fraction` of the starting
/// corpus at the end of `withdrawal_years`. Fails when the discounted
/// reserve consumes the whole corpus.
pub fn solve_flat_withdrawal(
    initial_corpus: f64,
    post_retirement_rate: f64,
    withdrawal_years: u32,
    reserve_fraction: f64,
) -> EngineResult<f64> {
    check_amount("initial_corpus", initial_corpus)?;
    check_rate("post_retirement_rate", post_retirement_rate)?;
    check_years(withdrawal_years)?;
    if !(0.0..=1.0).contains(&reserve_fraction) {
        return Err(EngineError::invalid("reserve_fraction", "must be in [0, 1]"));
    }

    let months = withdrawal_years as i32 * 12;
    let r_m = monthly_rate(post_retirement_rate);
    let reserve_pv = initial_corpus * reserve_fraction / (1.0 + r_m).powi(months);
    let spendable = initial_corpus - reserve_pv;
    if !spendable.is_finite() || spendable <= 0.0 {
        return Err(EngineError::InfeasibleConstraint(format!(
            "reserve of {:.0}% needs {reserve_pv:.2} today but the corpus is {initial_corpus:.2}",
            reserve_fraction * 100.0
        )));
    }

    let amount = if r_m.abs() < RATE_EPSILON {
        spendable / months as f64
    } else {
        spendable * r_m / (1.0 - (1.0 + r_m).powi(-months))
    };
    debug!(
        initial_corpus,
        reserve_fraction, withdrawal_years, amount, "flat withdrawal solved"
    );
    Ok(amount)
}

pub fn solve_plain_annuity_withdrawal(
    initial_corpus: f64,
    post_retirement_rate: f64,
    withdrawal_years: u32,
) -> EngineResult<f64> {
    solve_flat_withdrawal(initial_corpus, post_retirement_rate, withdrawal_years, 0.0)
}

/// First-year monthly draw that, raised by `inflation_rate` after every
/// 12 months, runs the corpus to zero at the end of `withdrawal_years`.
pub fn solve_inflation_indexed_withdrawal(
    initial_corpus: f64,
    post_retirement_rate: f64,
    withdrawal_years: u32,
    inflation_rate: f64,
) -> EngineResult<f64> {
    check_amount("initial_corpus", initial_corpus)?;
    check_rate("post_retirement_rate", post_retirement_rate)?;
    check_rate("inflation_rate", inflation_rate)?;
    check_years(withdrawal_years)?;

    let r_m = monthly_rate(post_retirement_rate);
    let year_annuity = if r_m.abs() < RATE_EPSILON {
        12.0
    } else {
        (1.0 - (1.0 + r_m).powi(-12)) / r_m
    };
    // Step-up ratio discounted back one year.
    let q = (1.0 + inflation_rate) / (1.0 + r_m).powi(12);
    let years = withdrawal_years as i32;
    let year_series = if (1.0 - q).abs() < RATE_EPSILON {
        withdrawal_years as f64
    } else {
        (1.0 - q.powi(years)) / (1.0 - q)
    };

    let amount = initial_corpus / (year_annuity * year_series);
    if !amount.is_finite() || amount <= 0.0 {
        return Err(EngineError::InfeasibleConstraint(format!(
            "no positive inflation-indexed draw from a corpus of {initial_corpus:.2}"
        )));
    }
    debug!(
        initial_corpus,
        inflation_rate, withdrawal_years, amount, "inflation-indexed withdrawal solved"
    );
    Ok(amount)
}

/// Month-end balances from month 0. Both balances compound monthly, the
/// draw comes out of the core balance only, and after every 12th month the
/// draw and the reserve are raised by `inflation_rate`.
pub fn simulate_schedule(
    initial_corpus: f64,
    reserve_corpus: f64,
    monthly_amount: f64,
    horizon_years: u32,
    post_retirement_rate: f64,
    inflation_rate: f64,
) -> EngineResult<Vec<ScheduleRow>> {
    check_amount("initial_corpus", initial_corpus)?;
    check_amount("reserve_corpus", reserve_corpus)?;
    check_amount("monthly_amount", monthly_amount)?;
    check_years(horizon_years)?;
    check_rate("post_retirement_rate", post_retirement_rate)?;
    check_rate("inflation_rate", inflation_rate)?;

    let total_months = horizon_years * 12;
    let growth = 1.0 + monthly_rate(post_retirement_rate);
    let step_up = 1.0 + inflation_rate;

    let mut core = initial_corpus;
    let mut reserve = reserve_corpus;
    let mut draw = monthly_amount;

    let mut schedule = Vec::with_capacity(total_months as usize + 1);
    schedule.push(record(0, core, reserve));
    for month in 1..=total_months {
        core *= growth;
        reserve *= growth;
        core -= draw;
        schedule.push(record(month, core, reserve));

        if month % 12 == 0 {
            draw *= step_up;
            reserve *= step_up;
        }
    }
    Ok(schedule)
}

pub fn plan_withdrawal(
    corpus: f64,
    formula: WithdrawalFormula,
    reserve_fraction: f64,
    withdrawal_years: u32,
    post_retirement_rate: f64,
    inflation_rate: f64,
) -> EngineResult<WithdrawalPlan> {
    if formula != WithdrawalFormula::ReserveAware && reserve_fraction != 0.0 {
        return Err(EngineError::invalid(
            "reserve_fraction",
            format!("{formula:?} withdrawals cannot hold back a reserve"),
        ));
    }

    let (monthly_amount, reserve_corpus, step_up_rate) = match formula {
        WithdrawalFormula::Flat => {
            let amount =
                solve_plain_annuity_withdrawal(corpus, post_retirement_rate, withdrawal_years)?;
            (amount, 0.0, 0.0)
        }
        WithdrawalFormula::InflationIndexed => {
            let amount = solve_inflation_indexed_withdrawal(
                corpus,
                post_retirement_rate,
                withdrawal_years,
                inflation_rate,
            )?;
            (amount, 0.0, inflation_rate)
        }
        WithdrawalFormula::ReserveAware => {
            let amount = solve_flat_withdrawal(
                corpus,
                post_retirement_rate,
                withdrawal_years,
                reserve_fraction,
            )?;
            (amount, corpus * reserve_fraction, inflation_rate)
        }
    };

    let schedule = simulate_schedule(
        corpus,
        reserve_corpus,
        monthly_amount,
        withdrawal_years,
        post_retirement_rate,
        step_up_rate,
    )?;

    Ok(WithdrawalPlan {
        formula,
        reserve_fraction,
        monthly_amount: round2(monthly_amount),
        schedule,
    })
}

pub fn render_schedule(plan: &WithdrawalPlan) -> String {
    let mut out = String::with_capacity(plan.schedule.len() * 40);
    for row in &plan.schedule {
        let _ = writeln!(
            out,
            "Month {:3}: {:.2} : {:.2}",
            row.month, row.core_balance, row.reserve_balance
        );
    }
    out
}

fn record(month: u32, core: f64, reserve: f64) -> ScheduleRow {
    ScheduleRow {
        month,
        core_balance: round2(core),
        reserve_balance: round2(reserve),
    }
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

fn check_years(years: u32) -> EngineResult<()> {
    if years == 0 {
        return Err(EngineError::invalid("withdrawal_years", "must be > 0"));
    }
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
