//! Public server status.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::config::Retries;

/// Structured status.
#[derive(Debug, Serialize)]
pub struct Status {
    version: String,
    name: String,
    retry: Retries,
}

/// Instance name, version and the retry budgets in use.
pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        version: env!("CARGO_PKG_VERSION").into(),
        name: state.config.name.clone(),
        retry: state.config.retry.clone(),
    })
}
