//! Error handler for enrol.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// What happened to the orphaned identity after a profile failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Identity deleted, nothing left behind.
    Deleted,
    /// Deletion failed, the identity has no profile.
    Orphaned { identity_id: String, error: String },
}

/// Outcome of a failed provisioning call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("an account already exists for this email")]
    DuplicateAccount,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("identity directory unavailable: {last_error}")]
    Unavailable { last_error: String },

    #[error("profile creation failed: {reason}")]
    ProfileCreationFailed {
        reason: String,
        compensation: Compensation,
    },

    #[error("collaborators are not configured: {0}")]
    Config(String),
}

impl ProvisionError {
    /// Label used on logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::DuplicateAccount => "duplicate_account",
            ProvisionError::InvalidRequest(_) => "invalid_request",
            ProvisionError::Unavailable { .. } => "unavailable",
            ProvisionError::ProfileCreationFailed { .. } => {
                "profile_creation_failed"
            },
            ProvisionError::Config(_) => "config_error",
        }
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

fn provision_response(err: &ProvisionError) -> ResponseError {
    let response = ResponseError::default().details(&err.to_string());

    match err {
        ProvisionError::DuplicateAccount => response
            .title("An account with this email already exists.")
            .status(StatusCode::CONFLICT),
        ProvisionError::InvalidRequest(_) => response
            .title("There were validation errors with your request.")
            .status(StatusCode::BAD_REQUEST),
        ProvisionError::Unavailable { .. } => response
            .title("Account service is temporarily unavailable.")
            .status(StatusCode::SERVICE_UNAVAILABLE),
        ProvisionError::ProfileCreationFailed { .. } => response
            .title("Profile could not be created.")
            .status(StatusCode::BAD_GATEWAY),
        ProvisionError::Config(details) => {
            tracing::error!(%details, "server returned 500 status");

            ResponseError::default()
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },
            ServerError::Axum(rejection) => response
                .details(&rejection.body_text())
                .status(rejection.status()),
            ServerError::Provision(err) => provision_response(err),
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_status_codes() {
        let cases = [
            (ProvisionError::DuplicateAccount, StatusCode::CONFLICT),
            (
                ProvisionError::InvalidRequest("email is empty".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ProvisionError::Unavailable {
                    last_error: "Database error".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ProvisionError::ProfileCreationFailed {
                    reason: "timeout".into(),
                    compensation: Compensation::Deleted,
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                ProvisionError::Config("missing key".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = ServerError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
