//! GoTrue admin API client.
//!
//! Hosted backends expose their authentication server under `/auth/v1`. The
//! admin endpoints used here need the service role key, never an anonymous
//! key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::IdentityDirectory;
use crate::account::{Identity, NewIdentity};
use crate::classify::BackendError;
use crate::error::ProvisionError;

pub const DEFAULT_CLIENT_INFO: &str = "projects-tracker-admin";
const ADMIN_USERS_PATH: &str = "auth/v1/admin/users";
const HEALTH_PATH: &str = "auth/v1/health";
const PAGE_SIZE: usize = 50;
const MAX_PAGES: u32 = 200;

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Error body. GoTrue changed its field names over time.
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    error_code: Option<String>,
    code: Option<serde_json::Value>,
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Identity directory backed by a GoTrue server.
#[derive(Debug, Clone)]
pub struct GoTrueDirectory {
    client: Client,
    base: Url,
}

impl GoTrueDirectory {
    /// Create a new [`GoTrueDirectory`].
    pub fn new(
        base: Url,
        service_key: &str,
        client_info: &str,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        Self::with_builder(
            Client::builder(),
            base,
            service_key,
            client_info,
            timeout,
        )
    }

    /// Create a new [`GoTrueDirectory`] on top of a custom HTTP client.
    pub fn with_builder(
        builder: ClientBuilder,
        base: Url,
        service_key: &str,
        client_info: &str,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        if service_key.trim().is_empty() {
            return Err(ProvisionError::Config(
                "identity directory service key is empty".into(),
            ));
        }

        let invalid = |_| {
            ProvisionError::Config(
                "identity directory credentials are not valid header values"
                    .into(),
            )
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(service_key).map_err(invalid)?,
        );
        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {service_key}"))
                .map_err(invalid)?;
        bearer.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(
            "x-client-info",
            HeaderValue::from_str(client_info).map_err(invalid)?,
        );

        let client = builder
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ProvisionError::Config(err.to_string()))?;

        // `Url::join` drops the last segment unless it ends with a slash.
        let base = if base.path().ends_with('/') {
            base
        } else {
            let path = format!("{}/", base.path());
            let mut base = base;
            base.set_path(&path);
            base
        };

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|err| BackendError::Transport(err.to_string()))
    }

    /// Turn a non-2xx response into a [`BackendError`].
    async fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ApiError = response.json().await.unwrap_or_default();
        let code = body.error_code.or_else(|| match body.code {
            Some(serde_json::Value::String(code)) => Some(code),
            _ => None,
        });
        let message = body
            .msg
            .or(body.message)
            .or(body.error_description)
            .or(body.error)
            .unwrap_or_else(|| status.to_string());

        Err(BackendError::Api {
            status: Some(status.as_u16()),
            code,
            message,
        })
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(err.without_url().to_string())
    }
}

#[async_trait]
impl IdentityDirectory for GoTrueDirectory {
    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<Identity>, BackendError> {
        let url = self.endpoint(ADMIN_USERS_PATH)?;

        // The filter is a hint, not every server version applies it.
        for page in 1..=MAX_PAGES {
            let response = self
                .client
                .get(url.clone())
                .query(&[
                    ("filter", email.to_owned()),
                    ("page", page.to_string()),
                    ("per_page", PAGE_SIZE.to_string()),
                ])
                .send()
                .await
                .map_err(transport)?;
            let list: UserList = Self::check(response)
                .await?
                .json()
                .await
                .map_err(transport)?;

            let last_page = list.users.len() < PAGE_SIZE;
            let found: Vec<Identity> = list
                .users
                .into_iter()
                .filter_map(|user| {
                    let found = user.email?;
                    found.eq_ignore_ascii_case(email).then_some(Identity {
                        id: user.id,
                        email: found,
                    })
                })
                .collect();

            if !found.is_empty() || last_page {
                return Ok(found);
            }
        }

        tracing::warn!(
            pages = MAX_PAGES,
            "user listing truncated, creation stays the only guard"
        );
        Ok(Vec::new())
    }

    async fn create(
        &self,
        identity: NewIdentity<'_>,
    ) -> Result<Identity, BackendError> {
        let response = self
            .client
            .post(self.endpoint(ADMIN_USERS_PATH)?)
            .json(&json!({
                "email": identity.email,
                "password": identity.password,
                "email_confirm": identity.email_confirmed,
                "user_metadata": { "name": identity.display_name },
            }))
            .send()
            .await
            .map_err(transport)?;
        let user: User = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;

        Ok(Identity {
            id: user.id,
            email: user.email.unwrap_or_else(|| identity.email.to_owned()),
        })
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        let mut url = self.endpoint(ADMIN_USERS_PATH)?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Transport("invalid base url".into()))?
            .push(id);

        let response =
            self.client.delete(url).send().await.map_err(transport)?;
        Self::check(response).await?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(self.endpoint(HEALTH_PATH)?)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;

        // Health is public, the admin list is not.
        let response = self
            .client
            .get(self.endpoint(ADMIN_USERS_PATH)?)
            .query(&[("per_page", "1")])
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;

        Ok(())
    }
}
