//! Collaborator error shape and its classification.
//!
//! Adapters translate their native errors into [`BackendError`]. Deciding
//! what is worth retrying happens here and nowhere else.

use thiserror::Error;

/// Error returned by an identity directory or a profile store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{message}")]
    Api {
        /// HTTP status, if the collaborator speaks HTTP.
        status: Option<u16>,
        /// Machine code: API error code or SQLSTATE.
        code: Option<String>,
        message: String,
    },
}

impl BackendError {
    /// Shortcut for an [`BackendError::Api`] error.
    pub fn api(
        status: Option<u16>,
        code: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            status,
            code: code.map(str::to_owned),
            message: message.into(),
        }
    }
}

/// Abstract failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    /// Timeout, DNS, refused or aborted connection.
    Network,
    /// Collaborator reachable but failing internally.
    Server,
    /// Email or key already taken.
    Duplicate,
    /// Request rejected as malformed.
    Invalid,
    /// Credentials rejected.
    Unauthorized,
    Unknown,
}

impl Failure {
    /// Whether a later attempt may succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, Failure::Network | Failure::Server)
    }

    /// Label used on logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Failure::Network => "network",
            Failure::Server => "server",
            Failure::Duplicate => "duplicate",
            Failure::Invalid => "invalid",
            Failure::Unauthorized => "unauthorized",
            Failure::Unknown => "unknown",
        }
    }
}

const DUPLICATE_CODES: &[&str] =
    &["23505", "email_exists", "user_already_exists"];
const DUPLICATE_MARKERS: &[&str] = &[
    "duplicate key",
    "already exists",
    "already been registered",
    "already registered",
];

const NETWORK_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "fetch failed",
    "enotfound",
    "network",
    "connection",
    "abort",
];

const SERVER_CODES: &[&str] = &["unexpected_failure", "40001", "40P01"];
const SERVER_MARKERS: &[&str] =
    &["database error", "unexpected_failure", "unexpected failure"];

const INVALID_CODES: &[&str] =
    &["validation_failed", "weak_password", "email_address_invalid"];

/// Map a [`BackendError`] onto the [`Failure`] taxonomy.
pub fn classify(error: &BackendError) -> Failure {
    let (status, code, message) = match error {
        BackendError::Timeout | BackendError::Transport(_) => {
            return Failure::Network;
        },
        BackendError::Api {
            status,
            code,
            message,
        } => (*status, code.as_deref().unwrap_or_default(), message),
    };
    let message = message.to_lowercase();
    let mentions =
        |markers: &[&str]| markers.iter().any(|m| message.contains(m));

    if status == Some(409)
        || DUPLICATE_CODES.contains(&code)
        || mentions(DUPLICATE_MARKERS)
    {
        return Failure::Duplicate;
    }

    if matches!(status, Some(408 | 429))
        || code.starts_with("08")
        || mentions(NETWORK_MARKERS)
    {
        return Failure::Network;
    }

    if status.is_some_and(|s| s >= 500)
        || SERVER_CODES.contains(&code)
        || code.starts_with("53")
        || code.starts_with("57P")
        || mentions(SERVER_MARKERS)
    {
        return Failure::Server;
    }

    match status {
        Some(401 | 403) => Failure::Unauthorized,
        Some(400..=499) => Failure::Invalid,
        _ if INVALID_CODES.contains(&code)
            || code.starts_with("22")
            || code.starts_with("23") =>
        {
            Failure::Invalid
        },
        _ => Failure::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_network() {
        assert_eq!(classify(&BackendError::Timeout), Failure::Network);
        assert_eq!(
            classify(&BackendError::Transport("dns error".into())),
            Failure::Network
        );
    }

    #[test]
    fn test_directory_errors() {
        let cases = [
            (
                Some(500),
                None,
                "Database error creating new user",
                Failure::Server,
            ),
            (Some(500), Some("unexpected_failure"), "boom", Failure::Server),
            (Some(502), None, "Bad Gateway", Failure::Server),
            (
                Some(422),
                Some("email_exists"),
                "A user with this email address has already been registered",
                Failure::Duplicate,
            ),
            (
                Some(422),
                Some("weak_password"),
                "Password should be at least 6 characters",
                Failure::Invalid,
            ),
            (
                Some(400),
                None,
                "Unable to validate email address",
                Failure::Invalid,
            ),
            (Some(401), None, "Invalid API key", Failure::Unauthorized),
            (Some(429), None, "Too many requests", Failure::Network),
            (None, None, "fetch failed", Failure::Network),
            (None, None, "something odd", Failure::Unknown),
        ];

        for (status, code, message, expected) in cases {
            let err = BackendError::api(status, code, message);
            assert_eq!(classify(&err), expected, "{message}");
        }
    }

    #[test]
    fn test_sqlstate_codes() {
        let cases = [
            ("23505", Failure::Duplicate),
            ("08006", Failure::Network),
            ("40001", Failure::Server),
            ("53300", Failure::Server),
            ("57P01", Failure::Server),
            ("23502", Failure::Invalid),
            ("22001", Failure::Invalid),
            ("42P01", Failure::Unknown),
        ];

        for (code, expected) in cases {
            let err = BackendError::api(None, Some(code), "postgres says no");
            assert_eq!(classify(&err), expected, "{code}");
        }
    }

    #[test]
    fn test_transient() {
        assert!(Failure::Network.is_transient());
        assert!(Failure::Server.is_transient());
        assert!(!Failure::Duplicate.is_transient());
        assert!(!Failure::Invalid.is_transient());
        assert!(!Failure::Unauthorized.is_transient());
        assert!(!Failure::Unknown.is_transient());
    }
}
