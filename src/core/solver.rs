use thiserror::Error;

// Newton steps are kept only while they stay inside the bracket; otherwise
// the step bisects, so the bracket shrinks every iteration.

#[derive(Debug, Clone, Copy)]
pub struct RootSolveConfig {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub initial_guess: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootSolveResult {
    pub root: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RootSolveError {
    #[error("invalid solver config: {0}")]
    InvalidConfig(String),

    #[error("no sign change over bracket (f(lo)={lower_value}, f(hi)={upper_value})")]
    NoSignChange { lower_value: f64, upper_value: f64 },

    #[error("no convergence after {iterations} iterations (x={last_root}, f(x)={last_value})")]
    NonConvergence {
        iterations: u32,
        last_root: f64,
        last_value: f64,
    },
}

/// `eval` returns the function value and its derivative at `x`.
pub fn solve_root<F>(eval: F, config: RootSolveConfig) -> Result<RootSolveResult, RootSolveError>
where
    F: Fn(f64) -> (f64, f64),
{
    validate_config(config)?;

    let mut lo = config.lower_bound;
    let mut hi = config.upper_bound;
    let (f_lo, _) = eval(lo);
    let (f_hi, _) = eval(hi);

    if !f_lo.is_finite() || !f_hi.is_finite() || f_lo * f_hi > 0.0 {
        return Err(RootSolveError::NoSignChange {
            lower_value: f_lo,
            upper_value: f_hi,
        });
    }
    if f_lo == 0.0 {
        return Ok(RootSolveResult {
            root: lo,
            iterations: 0,
        });
    }
    if f_hi == 0.0 {
        return Ok(RootSolveResult {
            root: hi,
            iterations: 0,
        });
    }
    let lo_negative = f_lo < 0.0;

    let mut x = config.initial_guess.clamp(lo, hi);
    let mut last_value = f64::NAN;
    let mut it = 0;
    while it < config.max_iterations {
        it += 1;
        let (fx, dfx) = eval(x);
        last_value = fx;
        if fx == 0.0 {
            return Ok(RootSolveResult {
                root: x,
                iterations: it,
            });
        }

        if (fx < 0.0) == lo_negative {
            lo = x;
        } else {
            hi = x;
        }

        let newton = if dfx != 0.0 && dfx.is_finite() {
            x - fx / dfx
        } else {
            f64::NAN
        };
        let next = if newton.is_finite() && newton > lo && newton < hi {
            newton
        } else {
            (lo + hi) * 0.5
        };

        if (next - x).abs() <= config.tolerance || (hi - lo).abs() <= config.tolerance {
            return Ok(RootSolveResult {
                root: next,
                iterations: it,
            });
        }
        x = next;
    }

    Err(RootSolveError::NonConvergence {
        iterations: it,
        last_root: x,
        last_value,
    })
}

fn validate_config(config: RootSolveConfig) -> Result<(), RootSolveError> {
    if !config.lower_bound.is_finite() || !config.upper_bound.is_finite() {
        return Err(RootSolveError::InvalidConfig(
            "bracket bounds must be finite".to_string(),
        ));
    }
    if config.upper_bound <= config.lower_bound {
        return Err(RootSolveError::InvalidConfig(
            "upper_bound must be greater than lower_bound".to_string(),
        ));
    }
    if !config.initial_guess.is_finite() {
        return Err(RootSolveError::InvalidConfig(
            "initial_guess must be finite".to_string(),
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(RootSolveError::InvalidConfig(
            "tolerance must be > 0".to_string(),
        ));
    }
    if config.max_iterations == 0 {
        return Err(RootSolveError::InvalidConfig(
            "max_iterations must be > 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn config(lower_bound: f64, upper_bound: f64) -> RootSolveConfig {
        RootSolveConfig {
            lower_bound,
            upper_bound,
            initial_guess: 0.0,
            tolerance: 1e-12,
            max_iterations: 200,
        }
    }

    #[test]
    fn finds_square_root_with_newton_steps() {
        let result = solve_root(|x| (x * x - 2.0, 2.0 * x), RootSolveConfig {
            initial_guess: 1.0,
            ..config(0.0, 4.0)
        })
        .expect("must solve");
        assert_close(result.root, 2.0_f64.sqrt(), 1e-10);
        assert!(result.iterations < 20);
    }

    #[test]
    fn falls_back_to_bisection_when_derivative_is_useless() {
        let result = solve_root(|x| (x.powi(3) - 0.5, 0.0), config(-1.0, 1.0))
            .expect("bisection must converge");
        assert_close(result.root, 0.5_f64.cbrt(), 1e-9);
    }

    #[test]
    fn reports_missing_sign_change() {
        let err = solve_root(|x| (x * x + 1.0, 2.0 * x), config(-2.0, 2.0))
            .expect_err("no root in bracket");
        assert!(matches!(err, RootSolveError::NoSignChange { .. }));
    }

    #[test]
    fn reports_non_convergence_when_iterations_run_out() {
        let err = solve_root(
            |x| (x - 0.123_456_789, 0.0),
            RootSolveConfig {
                max_iterations: 3,
                ..config(-1_000.0, 1_000.0)
            },
        )
        .expect_err("three bisection steps cannot reach 1e-12");
        assert!(matches!(
            err,
            RootSolveError::NonConvergence { iterations: 3, .. }
        ));
    }

    #[test]
    fn errors_render_their_context() {
        let err = RootSolveError::NoSignChange {
            lower_value: 1.0,
            upper_value: 2.0,
        };
        assert_eq!(
            err.to_string(),
            "no sign change over bracket (f(lo)=1, f(hi)=2)"
        );
        let err = RootSolveError::InvalidConfig("tolerance must be > 0".to_string());
        assert!(err.to_string().starts_with("invalid solver config"));
    }

    #[test]
    fn rejects_inverted_bracket() {
        let err = solve_root(|x| (x, 1.0), config(1.0, -1.0)).expect_err("bad bracket");
        assert!(matches!(err, RootSolveError::InvalidConfig(_)));
    }
}
