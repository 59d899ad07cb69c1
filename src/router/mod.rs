pub mod register;
pub mod status;

use axum::Json;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppState;
use crate::error::ServerError;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Prometheus exposition of the process metrics.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::default()),
    }
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) fn state(
    directory: std::sync::Arc<crate::directory::MemoryDirectory>,
    profiles: std::sync::Arc<crate::profile::MemoryProfileStore>,
) -> AppState {
    use crate::provision::ProvisioningService;

    let provisioning = ProvisioningService::builder()
        .with_directory(directory)
        .with_profile_store(profiles)
        .build()
        .unwrap();

    AppState {
        config: std::sync::Arc::new(crate::config::Configuration::default()),
        provisioning,
        metrics: None,
    }
}
