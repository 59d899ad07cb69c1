//! Configuration manager for enrol.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::directory::DEFAULT_CLIENT_INFO;
use crate::error::ProvisionError;
use crate::retry::{Backoff, RetryPolicy};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding `identity.service_key`.
pub const SERVICE_KEY_ENV: &str = "SERVICE_ROLE_KEY";
/// Environment variable overriding the configuration path.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to the identity directory.
    #[serde(skip_serializing)]
    pub identity: Option<Identity>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Retry budgets per step.
    #[serde(default)]
    pub retry: Retries,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_CRATE_NAME").into(),
            port: DEFAULT_PORT,
            version: String::default(),
            path: PathBuf::default(),
            identity: None,
            postgres: None,
            retry: Retries::default(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Identity directory (GoTrue) configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Base URL of the backend, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Service role key. `SERVICE_ROLE_KEY` takes precedence.
    pub service_key: Option<String>,
    /// Sent as `X-Client-Info`.
    pub client_info: Option<String>,
    /// Bound on each remote call, in seconds.
    pub timeout: Option<u64>,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// One retry budget, as written in the file.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Retry {
    pub attempts: u32,
    pub base_delay_ms: u64,
    #[serde(default)]
    pub jitter_ms: u64,
    #[serde(default)]
    pub exponential: bool,
}

impl From<&Retry> for RetryPolicy {
    fn from(retry: &Retry) -> Self {
        Self {
            max_attempts: retry.attempts,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            backoff: if retry.exponential {
                Backoff::Exponential
            } else {
                Backoff::Fixed
            },
            max_jitter: Duration::from_millis(retry.jitter_ms),
        }
    }
}

impl From<&RetryPolicy> for Retry {
    fn from(policy: &RetryPolicy) -> Self {
        Self {
            attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            jitter_ms: policy.max_jitter.as_millis() as u64,
            exponential: policy.backoff == Backoff::Exponential,
        }
    }
}

/// Retry budgets of the provisioning steps.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Retries {
    pub lookup: Retry,
    pub identity: Retry,
    pub profile: Retry,
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            lookup: (&RetryPolicy::lookup()).into(),
            identity: (&RetryPolicy::identity_creation()).into(),
            profile: (&RetryPolicy::profile_insertion()).into(),
        }
    }
}

/// Errors raised while reading the configuration file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration is malformed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),
}

/// Identity directory settings once checked.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorySettings {
    pub url: Url,
    pub service_key: String,
    pub client_info: String,
    pub timeout: Duration,
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, Error> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration = serde_yaml::from_reader(file)
                    .inspect_err(|err| {
                        tracing::error!(
                            path = %file_path.display(),
                            error = %err,
                            "`config.yaml` file is malformed"
                        );
                    })?;

                // set app version.
                config.version = VERSION.to_owned();
                config.path = file_path.clone();

                // normalize URLs.
                if let Some(identity) = config.identity.as_mut() {
                    identity.url = normalize_url(&identity.url)?;
                }

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    /// Check the identity directory section, with the service key taken
    /// from `service_key` (usually the environment) when present.
    pub fn directory(
        &self,
        service_key: Option<String>,
    ) -> Result<DirectorySettings, ProvisionError> {
        let Some(identity) = &self.identity else {
            return Err(ProvisionError::Config(
                "missing `identity` entry on `config.yaml` file".into(),
            ));
        };

        let url = Url::parse(&identity.url).map_err(|err| {
            ProvisionError::Config(format!("invalid identity url: {err}"))
        })?;
        let service_key = service_key
            .or_else(|| identity.service_key.clone())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ProvisionError::Config(format!(
                    "missing `{SERVICE_KEY_ENV}` environnement variable"
                ))
            })?;

        Ok(DirectorySettings {
            url,
            service_key,
            client_info: identity
                .client_info
                .clone()
                .unwrap_or_else(|| DEFAULT_CLIENT_INFO.to_owned()),
            timeout: Duration::from_secs(
                identity.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }
}

/// Normalizes a URL string by ensuring it starts with a valid scheme
/// (`http` or `https`).
fn normalize_url(url: &str) -> Result<String, url::ParseError> {
    let url_with_scheme =
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };

    let parsed_url = Url::parse(&url_with_scheme)?;
    Ok(parsed_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: tracker
port: 9000
identity:
  url: xyz.supabase.co
  client_info: tests
postgres:
  address: localhost:5432
retry:
  lookup: { attempts: 2, base_delay_ms: 500 }
  identity: { attempts: 4, base_delay_ms: 1000, jitter_ms: 250, exponential: true }
  profile: { attempts: 3, base_delay_ms: 1000 }
"#;

    fn from_yaml(yaml: &str) -> Configuration {
        let mut config: Configuration = serde_yaml::from_str(yaml).unwrap();
        if let Some(identity) = config.identity.as_mut() {
            identity.url = normalize_url(&identity.url).unwrap();
        }
        config
    }

    #[test]
    fn test_parse() {
        let config = from_yaml(YAML);

        assert_eq!(config.name, "tracker");
        assert_eq!(config.port, 9000);
        assert_eq!(config.postgres.unwrap().address, "localhost:5432");

        let identity = RetryPolicy::from(&config.retry.identity);
        assert_eq!(identity.max_attempts, 4);
        assert_eq!(identity.backoff, Backoff::Exponential);
        assert_eq!(identity.max_jitter, Duration::from_millis(250));
        assert_eq!(
            RetryPolicy::from(&config.retry.lookup).backoff,
            Backoff::Fixed
        );
    }

    #[test]
    fn test_default_retries_match_presets() {
        let retries = Retries::default();

        assert_eq!(
            RetryPolicy::from(&retries.identity),
            RetryPolicy::identity_creation()
        );
        assert_eq!(
            RetryPolicy::from(&retries.profile),
            RetryPolicy::profile_insertion()
        );
    }

    #[test]
    fn test_directory_settings() {
        let config = from_yaml(YAML);

        let settings = config.directory(Some("key".into())).unwrap();
        assert_eq!(settings.url.as_str(), "https://xyz.supabase.co/");
        assert_eq!(settings.client_info, "tests");
        assert_eq!(settings.timeout, Duration::from_secs(20));

        assert!(matches!(
            config.directory(None),
            Err(ProvisionError::Config(_))
        ));
        assert!(matches!(
            Configuration::default().directory(Some("key".into())),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Configuration::default()
            .path(PathBuf::from("/nonexistent/config.yaml"))
            .read()
            .unwrap();

        assert_eq!(config.version(), VERSION);
        assert!(config.identity.is_none());
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let path = std::env::temp_dir()
            .join(format!("enrol-malformed-{}.yaml", std::process::id()));
        std::fs::write(&path, "name: [unclosed\nport: nine").unwrap();

        let result = Configuration::default().path(path.clone()).read();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("xyz.supabase.co").unwrap(),
            "https://xyz.supabase.co/"
        );
        assert_eq!(
            normalize_url("http://localhost:9999").unwrap(),
            "http://localhost:9999/"
        );
    }
}
