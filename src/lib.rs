//! Enrol provisions accounts across an identity directory and a profile
//! store: one identity and one profile per account, or neither.
#![forbid(unsafe_code)]
#![deny(unused_mut)]

pub mod account;
pub mod classify;
pub mod config;
mod database;
pub mod directory;
pub mod error;
pub mod faults;
pub mod profile;
pub mod provision;
pub mod retry;
mod router;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use directory::GoTrueDirectory;
use error::ProvisionError;
use profile::PostgresProfileStore;
use provision::ProvisioningService;

/// Registration may wait on several backoffs.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub provisioning: ProvisioningService,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /register` goes to `register`.
        .route("/register", post(router::register::handler))
        .route("/metrics", get(router::metrics))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let path = std::env::var(config::CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_default();
    let config = config::Configuration::default().path(path).read()?;

    let settings =
        config.directory(std::env::var(config::SERVICE_KEY_ENV).ok())?;
    let directory = GoTrueDirectory::new(
        settings.url,
        &settings.service_key,
        &settings.client_info,
        settings.timeout,
    )?;

    let Some(postgres) = &config.postgres else {
        return Err(ProvisionError::Config(
            "missing `postgres` entry on `config.yaml` file".into(),
        )
        .into());
    };
    let db = database::Database::new(
        &postgres.address,
        postgres
            .username
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .password
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .database
            .as_deref()
            .unwrap_or(database::DEFAULT_DATABASE_NAME),
        postgres.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
    )
    .await?;

    let provisioning = ProvisioningService::builder()
        .with_directory(Arc::new(directory))
        .with_profile_store(Arc::new(PostgresProfileStore::new(db.postgres)))
        .with_lookup_policy((&config.retry.lookup).into())
        .with_identity_policy((&config.retry.identity).into())
        .with_profile_policy((&config.retry.profile).into())
        .with_call_timeout(settings.timeout)
        .build()?;

    // fail fast on a wrong key or an unreachable backend.
    provisioning.verify().await?;

    Ok(AppState {
        config,
        provisioning,
        metrics,
    })
}
