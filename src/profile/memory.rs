//! In-process profile store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::ProfileStore;
use crate::account::Profile;
use crate::classify::BackendError;
use crate::faults::Faults;

/// Operations of [`MemoryProfileStore`] that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileOp {
    Insert,
    FindById,
}

/// Profile store kept in memory, with the same unique constraints as the
/// `users` table.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<BTreeMap<String, Profile>>,
    faults: Faults<ProfileOp>,
}

impl MemoryProfileStore {
    /// Create an empty [`MemoryProfileStore`].
    pub fn new() -> Self {
        Self::default()
    }

    fn profiles(&self) -> MutexGuard<'_, BTreeMap<String, Profile>> {
        self.profiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Failure plan of this store.
    pub fn faults(&self) -> &Faults<ProfileOp> {
        &self.faults
    }

    /// Every stored profile, ordered by id.
    pub fn snapshot(&self) -> Vec<Profile> {
        self.profiles().values().cloned().collect()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn insert(&self, profile: &Profile) -> Result<(), BackendError> {
        self.faults.check(ProfileOp::Insert)?;

        let mut profiles = self.profiles();
        if profiles.contains_key(&profile.id) {
            return Err(BackendError::api(
                None,
                Some("23505"),
                "duplicate key value violates unique constraint \"users_pkey\"",
            ));
        }
        if profiles
            .values()
            .any(|known| known.email.eq_ignore_ascii_case(&profile.email))
        {
            return Err(BackendError::api(
                None,
                Some("23505"),
                "duplicate key value violates unique constraint \"users_email_key\"",
            ));
        }

        profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Profile>, BackendError> {
        self.faults.check(ProfileOp::FindById)?;

        Ok(self.profiles().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn profile(id: &str, email: &str) -> Profile {
        Profile {
            id: id.into(),
            email: email.into(),
            name: "A".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryProfileStore::new();
        let row = profile("1", "a@b.com");

        store.insert(&row).await.unwrap();
        assert_eq!(store.find_by_id("1").await.unwrap(), Some(row));
        assert_eq!(store.find_by_id("2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = MemoryProfileStore::new();
        store.insert(&profile("1", "a@b.com")).await.unwrap();

        assert!(store.insert(&profile("1", "c@d.com")).await.is_err());
        assert!(store.insert(&profile("2", "A@b.com")).await.is_err());
        assert_eq!(store.snapshot().len(), 1);
    }
}
