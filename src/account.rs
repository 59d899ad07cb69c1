//! Data handled while provisioning an account.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;

/// Transient input of a provisioning call. Never persisted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccountRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

impl AccountRequest {
    /// Create a new [`AccountRequest`].
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            display_name: display_name.into(),
        }
    }

    /// Reject blank fields. Deeper validation belongs to the caller.
    pub fn check(&self) -> Result<(), ProvisionError> {
        let blank = [
            ("email", &self.email),
            ("password", &self.password),
            ("display name", &self.display_name),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        match blank {
            Some((field, _)) => {
                Err(ProvisionError::InvalidRequest(format!("{field} is empty")))
            },
            None => Ok(()),
        }
    }
}

// Keep passwords out of logs.
impl fmt::Debug for AccountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRequest")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Authentication identity, owned by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

/// Attributes sent to the directory to create an [`Identity`].
#[derive(Clone, Copy)]
pub struct NewIdentity<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub display_name: &'a str,
    /// Skip the directory's own confirmation mail.
    pub email_confirmed: bool,
}

impl<'a> From<&'a AccountRequest> for NewIdentity<'a> {
    fn from(request: &'a AccountRequest) -> Self {
        Self {
            email: &request.email,
            password: &request.password,
            display_name: &request.display_name,
            email_confirmed: true,
        }
    }
}

/// Profile row, one per [`Identity`] and sharing its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Build the profile of a freshly created identity.
    pub fn for_identity(identity: &Identity, request: &AccountRequest) -> Self {
        Self {
            id: identity.id.clone(),
            email: request.email.clone(),
            name: request.display_name.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Successful provisioning result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provisioned {
    pub identity_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_rejects_blank_fields() {
        assert!(AccountRequest::new("a@b.com", "secret1", "A").check().is_ok());

        for request in [
            AccountRequest::new("", "secret1", "A"),
            AccountRequest::new("a@b.com", "   ", "A"),
            AccountRequest::new("a@b.com", "secret1", ""),
        ] {
            assert!(matches!(
                request.check(),
                Err(ProvisionError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_debug_hides_password() {
        let request = AccountRequest::new("a@b.com", "secret1", "A");
        let output = format!("{request:?}");

        assert!(output.contains("a@b.com"));
        assert!(!output.contains("secret1"));
    }

    #[test]
    fn test_profile_shares_identity_id() {
        let request = AccountRequest::new("a@b.com", "secret1", "A");
        let identity = Identity {
            id: "42".into(),
            email: "a@b.com".into(),
        };
        let profile = Profile::for_identity(&identity, &request);

        assert_eq!(profile.id, identity.id);
        assert_eq!(profile.name, "A");
        assert_eq!(profile.email, "a@b.com");
    }
}
