use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    ConfidenceSolveConfig, ConfidenceSolveResult, DEFAULT_PATH_COUNT, ProjectionError,
    ProjectionInput, ProjectionResult, project_as_of, solve_contribution_for_confidence,
};

#[derive(Parser, Debug)]
#[command(
    name = "wealth-projection",
    about = "Seeded Monte Carlo investment projection (deterministic path, percentile bands, goal solving)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one projection and print the result as JSON.
    Project(ProjectArgs),
    /// Serve the projection API over HTTP.
    Serve {
        #[arg(long, env = "PROJECTION_PORT", default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long)]
    initial_amount: f64,
    #[arg(long, help = "Monthly contribution for the average path and every simulated path")]
    monthly_contribution: f64,
    #[arg(long, help = "Monthly contribution for the goal path; defaults to --monthly-contribution")]
    monthly_contribution_goal: Option<f64>,
    #[arg(long, default_value_t = 10.0, help = "Expected annual return in percent")]
    annual_return: f64,
    #[arg(long, default_value_t = 15.0, help = "Annual return volatility in percent")]
    annual_volatility: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual growth of the contribution itself, in percent"
    )]
    contribution_growth: f64,
    #[arg(long, default_value_t = 10)]
    horizon_years: u32,
    #[arg(long, default_value_t = 0.0, help = "Target amount; 0 disables goal solving")]
    target_amount: f64,
    #[arg(long, help = "Target date, YYYY-MM-DD")]
    target_date: Option<String>,
    #[arg(long, default_value_t = DEFAULT_PATH_COUNT)]
    path_count: usize,
    #[arg(long, help = "Treat this date (YYYY-MM-DD) as today")]
    as_of: Option<String>,
    #[arg(
        long,
        help = "Also solve the contribution reaching the target with this probability, in percent"
    )]
    target_confidence: Option<f64>,
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    initial_amount: Option<f64>,
    monthly_contribution_average: Option<f64>,
    monthly_contribution_goal: Option<f64>,
    annual_return: Option<f64>,
    annual_volatility: Option<f64>,
    contribution_annual_growth: Option<f64>,
    horizon_years: Option<u32>,
    target_amount: Option<f64>,
    target_date: Option<String>,

    path_count: Option<usize>,
    as_of: Option<String>,
    target_confidence: Option<f64>,
}

#[derive(Debug, Clone)]
struct ApiOptions {
    path_count: usize,
    as_of: Option<NaiveDate>,
    target_confidence: Option<f64>,
}

#[derive(Debug, Clone)]
struct ApiRequest {
    input: ProjectionInput,
    options: ApiOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    as_of: String,
    path_count: usize,
    #[serde(flatten)]
    projection: ProjectionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence_solve: Option<ConfidenceSolveResult>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(args: ProjectArgs) -> Result<ApiRequest, String> {
    let target_confidence = match args.target_confidence {
        Some(pct) if !(pct > 0.0 && pct <= 100.0) => {
            return Err("--target-confidence must be in (0, 100]".to_string());
        }
        Some(pct) => Some(pct / 100.0),
        None => None,
    };
    let as_of = args
        .as_of
        .as_deref()
        .map(parse_as_of)
        .transpose()
        .map_err(|e| format!("--as-of: {e}"))?;

    let input = ProjectionInput {
        initial_amount: args.initial_amount,
        monthly_contribution_average: args.monthly_contribution,
        monthly_contribution_goal: args
            .monthly_contribution_goal
            .unwrap_or(args.monthly_contribution),
        annual_return: args.annual_return / 100.0,
        annual_volatility: args.annual_volatility / 100.0,
        contribution_annual_growth: args.contribution_growth / 100.0,
        horizon_years: args.horizon_years,
        target_amount: args.target_amount,
        target_date: args.target_date,
    };

    Ok(ApiRequest {
        input,
        options: ApiOptions {
            path_count: args.path_count,
            as_of,
            target_confidence,
        },
    })
}

fn parse_as_of(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("'{raw}' is not a valid date (expected YYYY-MM-DD)"))
}

fn default_input_for_api() -> ProjectionInput {
    ProjectionInput {
        initial_amount: 10_000.0,
        monthly_contribution_average: 500.0,
        monthly_contribution_goal: 500.0,
        annual_return: 0.10,
        annual_volatility: 0.15,
        contribution_annual_growth: 0.0,
        horizon_years: 10,
        target_amount: 0.0,
        target_date: None,
    }
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: ProjectPayload) -> Result<ApiRequest, String> {
    let mut input = default_input_for_api();

    if let Some(v) = payload.initial_amount {
        input.initial_amount = v;
    }
    if let Some(v) = payload.monthly_contribution_average {
        input.monthly_contribution_average = v;
        input.monthly_contribution_goal = v;
    }
    if let Some(v) = payload.monthly_contribution_goal {
        input.monthly_contribution_goal = v;
    }
    if let Some(v) = payload.annual_return {
        input.annual_return = v;
    }
    if let Some(v) = payload.annual_volatility {
        input.annual_volatility = v;
    }
    if let Some(v) = payload.contribution_annual_growth {
        input.contribution_annual_growth = v;
    }
    if let Some(v) = payload.horizon_years {
        input.horizon_years = v;
    }
    if let Some(v) = payload.target_amount {
        input.target_amount = v;
    }
    if payload.target_date.is_some() {
        input.target_date = payload.target_date;
    }

    if payload
        .target_confidence
        .is_some_and(|v| !(v > 0.0 && v <= 1.0))
    {
        return Err("targetConfidence must be in (0, 1]".to_string());
    }
    let as_of = payload
        .as_of
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_as_of)
        .transpose()
        .map_err(|e| format!("asOf: {e}"))?;

    Ok(ApiRequest {
        input,
        options: ApiOptions {
            path_count: payload.path_count.unwrap_or(DEFAULT_PATH_COUNT),
            as_of,
            target_confidence: payload.target_confidence,
        },
    })
}

fn run_request(request: &ApiRequest) -> Result<ProjectResponse, ProjectionError> {
    let today = request
        .options
        .as_of
        .unwrap_or_else(|| Local::now().date_naive());
    let path_count = request.options.path_count;
    let projection = project_as_of(&request.input, path_count, today)?;

    let confidence_solve = match request.options.target_confidence {
        Some(p) => Some(solve_contribution_for_confidence(
            &request.input,
            today,
            ConfidenceSolveConfig::for_input(&request.input, p, path_count),
        )?),
        None => None,
    };

    Ok(ProjectResponse {
        as_of: today.format("%Y-%m-%d").to_string(),
        path_count,
        projection,
        confidence_solve,
    })
}

/// Entry point for the `project` subcommand; returns the JSON document to print.
pub fn run_cli_projection(args: ProjectArgs) -> Result<String, String> {
    let pretty = args.pretty;
    let request = build_request(args)?;
    let response = run_request(&request).map_err(|e| e.to_string())?;
    let json = if pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    };
    json.map_err(|e| format!("Failed to encode result: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/healthz", get(health_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "projection HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_handler_impl(payload: ProjectPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected projection request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    // Path simulation is CPU-bound; keep it off the async workers.
    let outcome = tokio::task::spawn_blocking(move || run_request(&request)).await;
    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(err)) => {
            warn!(error = %err, "projection failed");
            error_response(status_for(&err), &err.to_string())
        }
        Err(join_err) => {
            warn!(error = %join_err, "projection worker panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Projection failed")
        }
    }
}

fn status_for(err: &ProjectionError) -> StatusCode {
    match err {
        ProjectionError::NonFiniteResult(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
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
