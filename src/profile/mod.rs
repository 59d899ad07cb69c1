//! Profile store port and adapters.

mod memory;
mod postgres;

pub use memory::*;
pub use postgres::*;

use async_trait::async_trait;

use crate::account::Profile;
use crate::classify::BackendError;

/// Owner of profile rows, keyed by identity id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert a new profile. Must reject an id already in use.
    async fn insert(&self, profile: &Profile) -> Result<(), BackendError>;

    /// Find a profile by identity id.
    async fn find_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Profile>, BackendError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
