mod config;
mod corpus;
mod engine;
mod error;
mod prices;
mod returns;
mod solver;
mod types;
mod withdrawal;

pub use config::EngineConfig;
pub use corpus::{
    GapAnalysis, corpus_gap, manual_monthly_withdrawal, project_future_value,
    required_extra_contribution, solve_target_corpus,
};
pub use engine::Analyzer;
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use prices::{
    InMemoryPriceSource, Portfolio, PricePoint, PriceSeries, PriceSource,
    compose_portfolio_series,
};
pub use returns::{RollingWindowSample, estimate, estimate_portfolio_rate, rolling_window_samples, xirr};
pub use solver::{RootSolveConfig, RootSolveError, RootSolveResult, solve_root};
pub use types::{
    AnalysisResult, CorpusFigure, CorpusKind, EstimateMode, RateEstimate, RateSource,
    RiskProfile, ScenarioResult, ScheduleRow, SwpMode, UserProfile, WithdrawalFormula,
    WithdrawalPlan,
};
pub use withdrawal::{
    monthly_rate, plan_withdrawal, render_schedule, simulate_schedule, solve_flat_withdrawal,
    solve_inflation_indexed_withdrawal, solve_plain_annuity_withdrawal,
};
