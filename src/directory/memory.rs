//! In-process identity directory.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::IdentityDirectory;
use crate::account::{Identity, NewIdentity};
use crate::classify::BackendError;
use crate::faults::Faults;

/// Operations of [`MemoryDirectory`] that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryOp {
    FindByEmail,
    Create,
    Delete,
}

/// Identity directory kept in memory. Email uniqueness is enforced
/// case-insensitively, like a hosted directory would.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    identities: Mutex<BTreeMap<String, Identity>>,
    faults: Faults<DirectoryOp>,
}

impl MemoryDirectory {
    /// Create an empty [`MemoryDirectory`].
    pub fn new() -> Self {
        Self::default()
    }

    fn identities(&self) -> MutexGuard<'_, BTreeMap<String, Identity>> {
        self.identities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Failure plan of this directory.
    pub fn faults(&self) -> &Faults<DirectoryOp> {
        &self.faults
    }

    /// Every stored identity, ordered by id.
    pub fn snapshot(&self) -> Vec<Identity> {
        self.identities().values().cloned().collect()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<Identity>, BackendError> {
        self.faults.check(DirectoryOp::FindByEmail)?;

        Ok(self
            .identities()
            .values()
            .filter(|identity| identity.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        identity: NewIdentity<'_>,
    ) -> Result<Identity, BackendError> {
        self.faults.check(DirectoryOp::Create)?;

        let mut identities = self.identities();
        if identities
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(identity.email))
        {
            return Err(BackendError::api(
                Some(422),
                Some("email_exists"),
                "A user with this email address has already been registered",
            ));
        }

        let created = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            email: identity.email.to_owned(),
        };
        identities.insert(created.id.clone(), created.clone());

        Ok(created)
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.faults.check(DirectoryOp::Delete)?;

        match self.identities().remove(id) {
            Some(_) => Ok(()),
            None => Err(BackendError::api(
                Some(404),
                Some("user_not_found"),
                "User not found",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_identity(email: &str) -> NewIdentity<'_> {
        NewIdentity {
            email,
            password: "secret1",
            display_name: "A",
            email_confirmed: true,
        }
    }

    #[tokio::test]
    async fn test_create_find_delete() {
        let directory = MemoryDirectory::new();

        let identity = directory.create(new_identity("a@b.com")).await.unwrap();
        assert_eq!(identity.email, "a@b.com");

        let found = directory.find_by_email("A@B.com").await.unwrap();
        assert_eq!(found, vec![identity.clone()]);

        directory.delete(&identity.id).await.unwrap();
        assert!(directory.snapshot().is_empty());
        assert!(directory.delete(&identity.id).await.is_err());
    }

    #[tokio::test]
    async fn test_email_is_unique() {
        let directory = MemoryDirectory::new();
        directory.create(new_identity("a@b.com")).await.unwrap();

        let err = directory.create(new_identity("A@b.com")).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::Api { status: Some(422), .. }
        ));
        assert_eq!(directory.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let directory = MemoryDirectory::new();
        directory
            .faults()
            .fail_times(DirectoryOp::Create, 1, BackendError::Timeout);

        assert_eq!(
            directory.create(new_identity("a@b.com")).await,
            Err(BackendError::Timeout)
        );
        assert!(directory.create(new_identity("a@b.com")).await.is_ok());
        assert_eq!(directory.faults().calls(DirectoryOp::Create), 2);
    }
}
