//! Identity directory port and adapters.

mod gotrue;
mod memory;

pub use gotrue::*;
pub use memory::*;

use async_trait::async_trait;

use crate::account::{Identity, NewIdentity};
use crate::classify::BackendError;

/// Owner of authentication identities.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Identities registered under `email`.
    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<Identity>, BackendError>;

    /// Create an identity. Must reject an email already in use.
    async fn create(
        &self,
        identity: NewIdentity<'_>,
    ) -> Result<Identity, BackendError>;

    /// Delete an identity by id.
    async fn delete(&self, id: &str) -> Result<(), BackendError>;

    /// Check the directory is reachable and accepts our credentials.
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
