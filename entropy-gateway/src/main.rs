// SPDX-License-Identifier: MIT
//
// QRNG Entropy Engine: Multi-Technique Quantum Randomness Service
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/yourusername/qrng-entropy-engine

//! Entropy Gateway - HTTP surface of the QRNG entropy engine
//!
//! Maps JSON requests onto the engine's technique registry and metrics aggregator. All
//! generation, validation and accounting happens in `entropy-core`; this binary only parses
//! bodies, renders results and turns engine errors into HTTP statuses.
//!
//! # Endpoints
//!
//! - `POST /api/generate/{boolean,hash,number,custom}` - formatted values
//! - `GET  /api/generate/techniques` - technique listing with live status
//! - `POST /api/random` - raw bytes (hex, base64 or byte array)
//! - `POST /api/keys` - symmetric keys and RSA seed material
//! - `POST /api/validate` - statistical test battery
//! - `GET  /api/stats`, `/api/throughput`, `/api/health` - metrics views
//! - `GET  /health` - liveness, `GET /metrics` - Prometheus text

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use entropy_core::{
    config::GatewayConfig,
    metrics::{StatsSnapshot, SystemHealth, ThroughputFeed},
    protocol::{
        BooleanRequest, CustomRequest, ErrorBody, HashRequest, KeyBody, KeyMetadata, KeyRequest,
        KeyResponse, NumberRequest, RandomMetadata, RandomRequest, RandomResponse,
        TechniqueListing, ValidateRequest, ValidateResponse,
    },
    registry::GenerationResult,
    validator::ValidatorStats,
    ErrorKind, MetricsAggregator, TechniqueRegistry,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "entropy-gateway")]
#[command(about = "QRNG Entropy Gateway - Serves generated randomness and engine metrics over HTTP", long_about = None)]
struct Args {
    /// Path to configuration file (ignored if --env-mode is set)
    #[arg(short, long, default_value = "config/gateway.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load configuration from environment variables instead of file
    #[arg(long, default_value = "false")]
    env_mode: bool,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    registry: Arc<TechniqueRegistry>,
    metrics: MetricsAggregator,
    metrics_enabled: bool,
}

/// Engine error rendered as `{error_kind, message, retry_after_seconds?}`
struct ApiError(entropy_core::Error);

impl From<entropy_core::Error> for ApiError {
    fn from(err: entropy_core::Error) -> Self {
        Self(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::DebiasStarvation | ErrorKind::UnknownTechnique => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
        ErrorKind::SourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            error!(error_kind = self.0.kind().as_str(), "Request failed: {}", self.0);
        } else if self.0.is_client_error() {
            debug!(error_kind = self.0.kind().as_str(), "Rejected request: {}", self.0);
        }

        let body = ErrorBody::from(&self.0);
        match body.retry_after_seconds {
            Some(secs) => (
                status,
                [(hyper::header::RETRY_AFTER, secs.to_string())],
                Json(body),
            )
                .into_response(),
            None => (status, Json(body)).into_response(),
        }
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Parse a JSON body; an empty body means "all defaults"
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> std::result::Result<T, ApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw).map_err(|e| {
        ApiError(entropy_core::Error::InvalidRequest(format!(
            "Malformed request body: {}",
            e
        )))
    })
}

/// POST /api/generate/boolean
async fn generate_boolean(State(state): State<AppState>, body: Bytes) -> ApiResult<GenerationResult> {
    let request: BooleanRequest = parse_body(&body)?;
    Ok(Json(state.registry.generate(request.into_request()).await?))
}

/// POST /api/generate/hash
async fn generate_hash(State(state): State<AppState>, body: Bytes) -> ApiResult<GenerationResult> {
    let request: HashRequest = parse_body(&body)?;
    Ok(Json(state.registry.generate(request.into_request()).await?))
}

/// POST /api/generate/number
async fn generate_number(State(state): State<AppState>, body: Bytes) -> ApiResult<GenerationResult> {
    let request: NumberRequest = parse_body(&body)?;
    Ok(Json(state.registry.generate(request.into_request()).await?))
}

/// POST /api/generate/custom
async fn generate_custom(State(state): State<AppState>, body: Bytes) -> ApiResult<GenerationResult> {
    let request: CustomRequest = parse_body(&body)?;
    Ok(Json(state.registry.generate(request.into_request()).await?))
}

/// GET /api/generate/techniques
async fn list_techniques(State(state): State<AppState>) -> Json<TechniqueListing> {
    Json(TechniqueListing::new(
        state.registry.list(),
        state.registry.default_technique(),
    ))
}

/// POST /api/random - raw bytes
async fn generate_random(State(state): State<AppState>, body: Bytes) -> ApiResult<RandomResponse> {
    let request: RandomRequest = parse_body(&body)?;
    let result = state
        .registry
        .generate_bytes(request.technique, request.size_bytes)
        .await?;

    Ok(Json(RandomResponse {
        data: request.format.encode(&result.data),
        metadata: RandomMetadata {
            size_bytes: result.data.len(),
            technique: result.technique,
            source: result.source,
            format: request.format,
            generation_time_ms: result.generation_time_ms,
            throughput_mbps: (result.throughput_mbps * 100.0).round() / 100.0,
            timestamp: result.timestamp,
            validation: result.validation,
        },
    }))
}

/// POST /api/keys - key material
async fn generate_key(State(state): State<AppState>, body: Bytes) -> ApiResult<KeyResponse> {
    let request: KeyRequest = parse_body(&body)?;
    let result = state
        .registry
        .generate_key(request.technique, request.key_type, request.key_size_bits)
        .await?;

    Ok(Json(KeyResponse {
        key: KeyBody::encode(&result.key, request.format),
        metadata: KeyMetadata {
            key_size_bits: result.key_size_bits,
            key_type: result.key_type,
            format: request.format,
            generation_time_ms: result.generation_time_ms,
            entropy_source: result.technique,
            entropy_bytes: result.entropy_bytes,
            timestamp: result.timestamp,
        },
    }))
}

/// POST /api/validate - statistical test battery
async fn validate_randomness(State(state): State<AppState>, body: Bytes) -> ApiResult<ValidateResponse> {
    let request: ValidateRequest = parse_body(&body)?;
    let report = state
        .registry
        .validate_randomness(request.technique, request.size_bytes)
        .await?;

    Ok(Json(ValidateResponse {
        validation_results: report,
        size_bytes: request.size_bytes,
        technique: request.technique,
        timestamp: Utc::now(),
    }))
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    snapshot: StatsSnapshot,
    external_validator: ValidatorStats,
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        snapshot: state.metrics.snapshot(),
        external_validator: state.registry.validator().stats(),
    })
}

/// GET /api/throughput
async fn get_throughput(State(state): State<AppState>) -> Json<ThroughputFeed> {
    Json(state.metrics.throughput_feed())
}

/// GET /api/health - composite health score
async fn get_system_health(State(state): State<AppState>) -> Json<SystemHealth> {
    Json(state.metrics.system_health())
}

/// GET /health - process liveness only
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// GET /metrics - Prometheus metrics
async fn get_metrics(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(hyper::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.prometheus_format(),
    )
        .into_response()
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate/boolean", post(generate_boolean))
        .route("/api/generate/hash", post(generate_hash))
        .route("/api/generate/number", post(generate_number))
        .route("/api/generate/custom", post(generate_custom))
        .route("/api/generate/techniques", get(list_techniques))
        .route("/api/random", post(generate_random))
        .route("/api/keys", post(generate_key))
        .route("/api/validate", post(validate_randomness))
        .route("/api/stats", get(get_stats))
        .route("/api/throughput", get(get_throughput))
        .route("/api/health", get(get_system_health))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

fn build_state(config: &GatewayConfig) -> Result<AppState> {
    let metrics = MetricsAggregator::new(config.engine.metrics_config());
    let registry = TechniqueRegistry::new(config.engine.clone(), metrics.clone())
        .context("Failed to initialize technique registry")?;

    Ok(AppState {
        registry: Arc::new(registry),
        metrics,
        metrics_enabled: config.metrics_enabled,
    })
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use futures::stream::StreamExt;
        use signal_hook::consts::signal::*;
        use signal_hook_tokio::Signals;

        match Signals::new([SIGINT, SIGTERM]) {
            Ok(mut signals) => {
                if let Some(signal) = signals.next().await {
                    info!("Received signal: {:?}", signal);
                }
            }
            Err(e) => {
                error!("Failed to register signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C signal");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = args.log_level.parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("QRNG Entropy Gateway v{}", entropy_core::VERSION);

    // Load configuration
    let config = if args.env_mode {
        info!("Loading configuration from environment variables");
        GatewayConfig::from_env()
            .context("Failed to load configuration from environment")?
    } else {
        info!("Loading configuration from file: {:?}", args.config);
        GatewayConfig::from_file(&args.config)
            .context("Failed to load configuration from file")?
    };

    info!("Listen address: {}", config.listen_address);
    info!("External validator: {}", config.engine.validator_url);

    let state = build_state(&config)?;

    let app = router(state)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Parse listen address
    let addr: std::net::SocketAddr = config.listen_address.parse()
        .context("Invalid listen address")?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use entropy_core::{config::EngineConfig, Error, TechniqueId};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = GatewayConfig {
            engine: EngineConfig {
                noise_seed: Some(7),
                ..EngineConfig::default()
            },
            ..GatewayConfig::default()
        };
        router(build_state(&config).unwrap())
    }

    async fn call(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_liveness() {
        let (status, _) = call(app(), "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_generate_booleans() {
        let (status, json) = call(app(), "POST", "/api/generate/boolean", r#"{"count": 5}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["results"].as_array().unwrap().len(), 5);
        assert_eq!(json["metadata"]["technique"], "fpga");
        assert_eq!(json["metadata"]["type"], "boolean");
    }

    #[tokio::test]
    async fn test_empty_body_uses_defaults() {
        let (status, json) = call(app(), "POST", "/api/generate/number", "").await;
        assert_eq!(status, StatusCode::OK);
        let value = json["results"][0].as_i64().unwrap();
        assert!((1..=100).contains(&value));
        assert_eq!(json["metadata"]["range"], "1-100");
    }

    #[tokio::test]
    async fn test_invalid_range_is_bad_request() {
        let (status, json) = call(
            app(),
            "POST",
            "/api/generate/number",
            r#"{"min": 10, "max": 1}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error_kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_technique_is_bad_request() {
        let (status, json) = call(
            app(),
            "POST",
            "/api/generate/custom",
            r#"{"options": ["a"], "technique": "lava-lamp"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["message"].as_str().unwrap().contains("lava-lamp"));
    }

    #[tokio::test]
    async fn test_random_bytes_encoding() {
        let (status, json) = call(
            app(),
            "POST",
            "/api/random",
            r#"{"size_bytes": 16, "technique": "cryptographic", "format": "hex"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_str().unwrap().len(), 32);
        assert_eq!(json["metadata"]["size_bytes"], 16);
        assert_eq!(json["metadata"]["source"], "OS Cryptographic");
    }

    #[tokio::test]
    async fn test_key_endpoint() {
        let (status, json) = call(
            app(),
            "POST",
            "/api/keys",
            r#"{"key_size_bits": 128, "type": "aes", "format": "base64"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["key"].as_str().unwrap().len(), 24);
        assert_eq!(json["metadata"]["key_type"], "aes");
    }

    #[tokio::test]
    async fn test_techniques_listing() {
        let (status, json) = call(app(), "GET", "/api/generate/techniques", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["techniques"].as_object().unwrap().len(), 4);
        assert_eq!(json["default_technique"], "fpga");
        assert_eq!(json["techniques"]["anu"]["status"], "available");
    }

    #[tokio::test]
    async fn test_stats_after_generation() {
        let app = app();
        call(app.clone(), "POST", "/api/random", r#"{"size_bytes": 64}"#).await;
        let (status, json) = call(app.clone(), "GET", "/api/stats", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["real_time_metrics"]["total_requests"], 1);
        assert_eq!(json["source_statistics"]["fpga"]["bytes_generated"], 64);
        assert_eq!(json["external_validator"]["total_requests"], 0);

        let (status, json) = call(app, "GET", "/api/throughput", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["historical_data"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError(Error::RateLimited {
            technique: TechniqueId::Anu,
            retry_after_seconds: 12,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[hyper::header::RETRY_AFTER], "12");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::UpstreamError), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(ErrorKind::SourceUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(ErrorKind::DebiasStarvation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
