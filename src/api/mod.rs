use axum::{
    Router,
    extract::{Json, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    AnalysisResult, Analyzer, EngineConfig, EngineError, ErrorCategory, EstimateMode,
    InMemoryPriceSource, RiskProfile, SwpMode, UserProfile, WithdrawalPlan, render_schedule,
};

pub mod data;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSwpMode {
    Aggressive,
    Conservative,
}

impl From<CliSwpMode> for SwpMode {
    fn from(value: CliSwpMode) -> Self {
        match value {
            CliSwpMode::Aggressive => SwpMode::Aggressive,
            CliSwpMode::Conservative => SwpMode::Conservative,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRiskProfile {
    Conservative,
    Balanced,
    Aggressive,
}

impl From<CliRiskProfile> for RiskProfile {
    fn from(value: CliRiskProfile) -> Self {
        match value {
            CliRiskProfile::Conservative => RiskProfile::Conservative,
            CliRiskProfile::Balanced => RiskProfile::Balanced,
            CliRiskProfile::Aggressive => RiskProfile::Aggressive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliEstimateMode {
    Mean,
    Median,
    Pessimistic,
    Optimistic,
}

impl From<CliEstimateMode> for EstimateMode {
    fn from(value: CliEstimateMode) -> Self {
        match value {
            CliEstimateMode::Mean => EstimateMode::Mean,
            CliEstimateMode::Median => EstimateMode::Median,
            CliEstimateMode::Pessimistic => EstimateMode::Pessimistic,
            CliEstimateMode::Optimistic => EstimateMode::Optimistic,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiSwpMode {
    #[serde(alias = "Aggressive")]
    Aggressive,
    #[serde(alias = "Conservative")]
    Conservative,
}

impl From<ApiSwpMode> for CliSwpMode {
    fn from(value: ApiSwpMode) -> Self {
        match value {
            ApiSwpMode::Aggressive => CliSwpMode::Aggressive,
            ApiSwpMode::Conservative => CliSwpMode::Conservative,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiRiskProfile {
    #[serde(alias = "Conservative")]
    Conservative,
    #[serde(alias = "Balanced")]
    Balanced,
    #[serde(alias = "Aggressive")]
    Aggressive,
}

impl From<ApiRiskProfile> for CliRiskProfile {
    fn from(value: ApiRiskProfile) -> Self {
        match value {
            ApiRiskProfile::Conservative => CliRiskProfile::Conservative,
            ApiRiskProfile::Balanced => CliRiskProfile::Balanced,
            ApiRiskProfile::Aggressive => CliRiskProfile::Aggressive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiEstimateMode {
    #[serde(alias = "Mean", alias = "average")]
    Mean,
    #[serde(alias = "Median")]
    Median,
    #[serde(alias = "Pessimistic", alias = "p25")]
    Pessimistic,
    #[serde(alias = "Optimistic", alias = "p75")]
    Optimistic,
}

impl From<ApiEstimateMode> for CliEstimateMode {
    fn from(value: ApiEstimateMode) -> Self {
        match value {
            ApiEstimateMode::Mean => CliEstimateMode::Mean,
            ApiEstimateMode::Median => CliEstimateMode::Median,
            ApiEstimateMode::Pessimistic => CliEstimateMode::Pessimistic,
            ApiEstimateMode::Optimistic => CliEstimateMode::Optimistic,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnalyzePayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    monthly_expense: Option<f64>,
    current_corpus: Option<f64>,
    monthly_contribution: Option<f64>,
    swp_mode: Option<ApiSwpMode>,
    pre_retirement_risk: Option<ApiRiskProfile>,
    post_retirement_risk: Option<ApiRiskProfile>,
    life_expectancy: Option<u32>,
    inflation_rate: Option<f64>,
    estimate_mode: Option<ApiEstimateMode>,
    full_schedule: Option<bool>,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "swp",
    about = "Retirement corpus projection and systematic withdrawal planner",
    after_help = "Run `swp serve [port] [data-dir]` to start the HTTP API instead."
)]
pub struct Cli {
    #[arg(long)]
    current_age: u32,
    #[arg(long)]
    retirement_age: u32,
    #[arg(long, help = "Monthly expenses in today's money")]
    monthly_expense: f64,
    #[arg(long, default_value_t = 0.0)]
    current_corpus: f64,
    #[arg(long, default_value_t = 0.0)]
    monthly_contribution: f64,
    #[arg(long, value_enum, default_value_t = CliSwpMode::Aggressive)]
    swp_mode: CliSwpMode,
    #[arg(long, value_enum, default_value_t = CliRiskProfile::Aggressive)]
    pre_retirement_risk: CliRiskProfile,
    #[arg(long, value_enum, default_value_t = CliRiskProfile::Conservative)]
    post_retirement_risk: CliRiskProfile,
    #[arg(
        long,
        default_value = "data",
        help = "Directory of <asset>.csv price files (date,price)"
    )]
    data_dir: PathBuf,
    #[arg(long, help = "JSON file overriding engine defaults")]
    config: Option<PathBuf>,
    #[arg(long, help = "Life expectancy in years, overrides the config value")]
    life_expectancy: Option<u32>,
    #[arg(long, help = "Annual inflation in percent, e.g. 5")]
    inflation_rate: Option<f64>,
    #[arg(long, value_enum, help = "Statistic applied to rolling-window returns")]
    estimate_mode: Option<CliEstimateMode>,
    #[arg(long, help = "Write month-by-month schedules into this directory")]
    dump_schedules: Option<PathBuf>,
    #[arg(long, help = "Emit every month of both schedules instead of year ends")]
    full_schedule: bool,
}

#[derive(Debug)]
struct AnalysisRequest {
    profile: UserProfile,
    mode: SwpMode,
    pre_retirement_risk: RiskProfile,
    post_retirement_risk: RiskProfile,
}

#[derive(Debug, Clone, Copy, Default)]
struct ConfigOverrides {
    life_expectancy: Option<u32>,
    inflation_rate_pct: Option<f64>,
    estimate_mode: Option<EstimateMode>,
}

impl ConfigOverrides {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            life_expectancy: cli.life_expectancy,
            inflation_rate_pct: cli.inflation_rate,
            estimate_mode: cli.estimate_mode.map(Into::into),
        }
    }

    fn apply(&self, base: &EngineConfig) -> Result<EngineConfig, String> {
        let mut config = base.clone();
        if let Some(age) = self.life_expectancy {
            config.life_expectancy = age;
        }
        if let Some(pct) = self.inflation_rate_pct {
            if !pct.is_finite() {
                return Err("--inflation-rate must be finite".to_string());
            }
            config.inflation_rate = pct / 100.0;
        }
        if let Some(mode) = self.estimate_mode {
            config.estimate_mode = mode;
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

#[derive(Debug)]
struct ApiRequest {
    request: AnalysisRequest,
    overrides: ConfigOverrides,
    full_schedule: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

struct AnalysisContext {
    config: EngineConfig,
    prices: InMemoryPriceSource,
}

fn build_request(cli: &Cli) -> Result<AnalysisRequest, String> {
    if cli.current_age == 0 {
        return Err("--current-age must be > 0".to_string());
    }

    if cli.retirement_age <= cli.current_age {
        return Err("--retirement-age must be > --current-age".to_string());
    }

    if !cli.monthly_expense.is_finite() || cli.monthly_expense <= 0.0 {
        return Err("--monthly-expense must be > 0".to_string());
    }

    if !cli.current_corpus.is_finite() || cli.current_corpus < 0.0 {
        return Err("--current-corpus must be >= 0".to_string());
    }

    if !cli.monthly_contribution.is_finite() || cli.monthly_contribution < 0.0 {
        return Err("--monthly-contribution must be >= 0".to_string());
    }

    Ok(AnalysisRequest {
        profile: UserProfile {
            current_age: cli.current_age,
            retirement_age: cli.retirement_age,
            monthly_expense_today: cli.monthly_expense,
            current_corpus: cli.current_corpus,
            monthly_contribution: cli.monthly_contribution,
        },
        mode: cli.swp_mode.into(),
        pre_retirement_risk: cli.pre_retirement_risk.into(),
        post_retirement_risk: cli.post_retirement_risk.into(),
    })
}

fn run_analysis(
    config: &EngineConfig,
    prices: &InMemoryPriceSource,
    request: &AnalysisRequest,
) -> Result<AnalysisResult, EngineError> {
    Analyzer::new(config, prices).run(
        &request.profile,
        request.mode,
        request.pre_retirement_risk,
        request.post_retirement_risk,
    )
}

fn load_config_file(path: &Path) -> Result<EngineConfig, String> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("--config {}: {e}", path.display()))?;
    EngineConfig::from_json(&json).map_err(|e| format!("--config {}: {e}", path.display()))
}

pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    let base = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => EngineConfig::default(),
    };
    let config = ConfigOverrides::from_cli(&cli).apply(&base)?;
    let request = build_request(&cli)?;
    let prices = data::load_price_dir(&cli.data_dir).map_err(|e| e.to_string())?;

    let mut result = run_analysis(&config, &prices, &request).map_err(|e| e.to_string())?;
    if let Some(dir) = &cli.dump_schedules {
        write_schedule_dumps(dir, &result)
            .map_err(|e| format!("--dump-schedules {}: {e}", dir.display()))?;
    }
    if !cli.full_schedule {
        condense_schedules(&mut result);
    }
    serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
}

pub async fn run_http_server(port: u16, data_dir: PathBuf) -> std::io::Result<()> {
    let prices = data::load_price_dir(&data_dir).map_err(|e| std::io::Error::other(e.to_string()))?;
    let context = Arc::new(AnalysisContext {
        config: EngineConfig::default(),
        prices,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/analyze",
            get(analyze_get_handler).post(analyze_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(context);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, data_dir = %data_dir.display(), "SWP HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn analyze_get_handler(
    State(context): State<Arc<AnalysisContext>>,
    Query(payload): Query<AnalyzePayload>,
) -> Response {
    analyze_handler_impl(&context, payload)
}

async fn analyze_post_handler(
    State(context): State<Arc<AnalysisContext>>,
    Json(payload): Json<AnalyzePayload>,
) -> Response {
    analyze_handler_impl(&context, payload)
}

fn analyze_handler_impl(context: &AnalysisContext, payload: AnalyzePayload) -> Response {
    match analyze(context, payload) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err((status, msg)) => error_response(status, &msg),
    }
}

fn analyze(
    context: &AnalysisContext,
    payload: AnalyzePayload,
) -> Result<AnalysisResult, (StatusCode, String)> {
    let api_request =
        api_request_from_payload(payload).map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;
    let config = api_request
        .overrides
        .apply(&context.config)
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    let mut result =
        run_analysis(&config, &context.prices, &api_request.request).map_err(|err| {
            let status = status_for(&err);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                error!(error = %err, "analysis failed");
            }
            (status, err.to_string())
        })?;
    if !api_request.full_schedule {
        condense_schedules(&mut result);
    }
    Ok(result)
}

fn status_for(err: &EngineError) -> StatusCode {
    match err.category() {
        ErrorCategory::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCategory::Infeasible => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn condense_schedules(result: &mut AnalysisResult) {
    for plan in [
        &mut result.current.sustainable_plan,
        &mut result.target.sustainable_plan,
    ] {
        condense_plan(plan);
    }
}

fn condense_plan(plan: &mut WithdrawalPlan) {
    plan.schedule = plan.year_end_rows();
}

fn write_schedule_dumps(dir: &Path, result: &AnalysisResult) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(
        dir.join("current_schedule.txt"),
        render_schedule(&result.current.sustainable_plan),
    )?;
    fs::write(
        dir.join("target_schedule.txt"),
        render_schedule(&result.target.sustainable_plan),
    )?;
    info!(dir = %dir.display(), "schedules written");
    Ok(())
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<AnalyzePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: AnalyzePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.monthly_expense {
        cli.monthly_expense = v;
    }
    if let Some(v) = payload.current_corpus {
        cli.current_corpus = v;
    }
    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = v;
    }
    if let Some(v) = payload.swp_mode {
        cli.swp_mode = v.into();
    }
    if let Some(v) = payload.pre_retirement_risk {
        cli.pre_retirement_risk = v.into();
    }
    if let Some(v) = payload.post_retirement_risk {
        cli.post_retirement_risk = v.into();
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = Some(v);
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = Some(v);
    }
    if let Some(v) = payload.estimate_mode {
        cli.estimate_mode = Some(CliEstimateMode::from(v));
    }
    if let Some(v) = payload.full_schedule {
        cli.full_schedule = v;
    }

    let request = build_request(&cli)?;
    Ok(ApiRequest {
        request,
        overrides: ConfigOverrides::from_cli(&cli),
        full_schedule: cli.full_schedule,
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 30,
        retirement_age: 60,
        monthly_expense: 50_000.0,
        current_corpus: 1_000_000.0,
        monthly_contribution: 10_000.0,
        swp_mode: CliSwpMode::Aggressive,
        pre_retirement_risk: CliRiskProfile::Aggressive,
        post_retirement_risk: CliRiskProfile::Conservative,
        data_dir: PathBuf::from("data"),
        config: None,
        life_expectancy: None,
        inflation_rate: None,
        estimate_mode: None,
        dump_schedules: None,
        full_schedule: false,
    }
}
