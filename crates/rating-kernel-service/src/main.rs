use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use http::header::CONTENT_TYPE;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use rating_kernel_api::{ApiResponse, RatingApi};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const APPLICATION_NAME: &str = "rating-kernel";
const APPLICATION_VERSION: &str = env!("CARGO_PKG_VERSION");
const ENDPOINT_LABELS: [&str; 3] = ["endpoint", "pid", "status_code"];

#[derive(Debug, Parser)]
#[command(name = "rating-kernel-service")]
#[command(about = "HTTP service for sentiment labelling and deduplicated result storage")]
struct Args {
    #[arg(long, env = "DATA_DIRECTORY", default_value = "./ratings")]
    data_directory: PathBuf,
    #[arg(long, env = "RATING_KERNEL_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,
}

/// Process metrics, kept in a private registry so every router gets its own set.
struct ServiceMetrics {
    registry: Registry,
    up: IntGauge,
    endpoint_calls: IntCounterVec,
    endpoint_duration_seconds: GaugeVec,
}

impl ServiceMetrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let up = IntGauge::new("up", "1 if API is running, 0 otherwise.")?;
        let endpoint_calls = IntCounterVec::new(
            Opts::new("endpoint_calls", "How many times the endpoint was called."),
            &ENDPOINT_LABELS,
        )?;
        let endpoint_duration_seconds = GaugeVec::new(
            Opts::new("endpoint_duration_seconds", "How long the endpoint took to respond."),
            &ENDPOINT_LABELS,
        )?;
        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(endpoint_calls.clone()))?;
        registry.register(Box::new(endpoint_duration_seconds.clone()))?;
        up.set(0);
        Ok(Self {
            registry,
            up,
            endpoint_calls,
            endpoint_duration_seconds,
        })
    }

    fn observe(&self, endpoint: &str, status: StatusCode, seconds: f64) {
        let pid = std::process::id().to_string();
        let status_code = status.as_u16().to_string();
        let labels = [endpoint, pid.as_str(), status_code.as_str()];
        self.endpoint_duration_seconds.with_label_values(&labels).set(seconds);
        self.endpoint_calls.with_label_values(&labels).inc();
    }

    fn render(&self) -> prometheus::Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_owned(), buffer))
    }
}

#[derive(Clone)]
struct ServiceState {
    api: Arc<RatingApi>,
    metrics: Arc<ServiceMetrics>,
}

impl ServiceState {
    fn open(data_directory: PathBuf) -> Result<Self> {
        let api = RatingApi::open(&data_directory).with_context(|| {
            format!("failed to open data directory {}", data_directory.display())
        })?;
        let metrics = ServiceMetrics::new().context("failed to register metrics")?;
        Ok(Self {
            api: Arc::new(api),
            metrics: Arc::new(metrics),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct IndexResponse {
    application_name: &'static str,
    version: &'static str,
}

struct JsonOutcome(ApiResponse);

impl IntoResponse for JsonOutcome {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body)).into_response()
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/label_sentiment", post(label_sentiment))
        .route("/save_sentiment", post(save_sentiment))
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let state = ServiceState::open(args.data_directory.clone())?;
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(
        bind = %args.bind,
        data_directory = %args.data_directory.display(),
        "rating kernel service listening"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn track_request(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;

    let seconds = started.elapsed().as_secs_f64();
    let status = response.status();
    tracing::info!(
        request_method = %method,
        request_path = %path,
        response_status_code = status.as_u16(),
        response_duration_seconds = seconds,
        "request"
    );
    state.metrics.observe(&path, status, seconds);
    response
}

/// Bodies that are not JSON are handed to validation as `null`, which fails the object check.
fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        application_name: APPLICATION_NAME,
        version: APPLICATION_VERSION,
    })
}

async fn status(State(state): State<ServiceState>) -> &'static str {
    state.metrics.up.set(1);
    "OK"
}

async fn metrics(State(state): State<ServiceState>) -> Response {
    match state.metrics.render() {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn label_sentiment(State(state): State<ServiceState>, body: Bytes) -> JsonOutcome {
    JsonOutcome(state.api.rate(&parse_body(&body)))
}

async fn save_sentiment(State(state): State<ServiceState>, body: Bytes) -> JsonOutcome {
    JsonOutcome(state.api.save_rating(&parse_body(&body)))
}
