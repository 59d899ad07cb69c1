use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::account::AccountRequest;
use crate::error::Result;
use crate::router::Valid;

#[derive(Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 72,
        message = "Password must contain at least 6 characters."
    ))]
    pub password: String,
    #[validate(must_match(
        other = "password",
        message = "Passwords do not match."
    ))]
    pub confirm_password: String,
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must contain between 1 and 100 characters."
    ))]
    pub name: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub user_id: String,
}

/// Handler to register a new account.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let request =
        AccountRequest::new(body.email.trim(), body.password, body.name.trim());

    let provisioned = state.provisioning.provision(&request).await?;

    tracing::info!(user_id = %provisioned.identity_id, "account registered");

    Ok((
        StatusCode::CREATED,
        Json(Response {
            user_id: provisioned.identity_id,
        }),
    ))
}
