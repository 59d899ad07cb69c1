//! Builder for ProvisioningService.

use std::sync::Arc;
use std::time::Duration;

use crate::directory::IdentityDirectory;
use crate::error::ProvisionError;
use crate::profile::ProfileStore;
use crate::provision::{Policies, ProvisioningService};
use crate::retry::{DEFAULT_CALL_TIMEOUT, RetryPolicy};

/// [`ProvisioningService`] builder.
#[derive(Clone)]
pub struct ProvisioningServiceBuilder {
    directory: Option<Arc<dyn IdentityDirectory>>,
    profiles: Option<Arc<dyn ProfileStore>>,
    policies: Policies,
    call_timeout: Duration,
}

impl Default for ProvisioningServiceBuilder {
    fn default() -> Self {
        Self {
            directory: None,
            profiles: None,
            policies: Policies::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ProvisioningServiceBuilder {
    /// Create a new [`ProvisioningServiceBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity directory.
    pub fn with_directory(
        mut self,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the profile store.
    pub fn with_profile_store(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Update retry budget of the duplicate pre-check.
    pub fn with_lookup_policy(mut self, policy: RetryPolicy) -> Self {
        self.policies.lookup = policy;
        self
    }

    /// Update retry budget of identity creation.
    pub fn with_identity_policy(mut self, policy: RetryPolicy) -> Self {
        self.policies.identity = policy;
        self
    }

    /// Update retry budget of profile insertion.
    pub fn with_profile_policy(mut self, policy: RetryPolicy) -> Self {
        self.policies.profile = policy;
        self
    }

    /// Update the bound on every remote call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Build the service. Both collaborators are required.
    pub fn build(self) -> Result<ProvisioningService, ProvisionError> {
        let directory = self.directory.ok_or_else(|| {
            ProvisionError::Config("identity directory is not configured".into())
        })?;
        let profiles = self.profiles.ok_or_else(|| {
            ProvisionError::Config("profile store is not configured".into())
        })?;

        if self.call_timeout.is_zero() {
            return Err(ProvisionError::Config(
                "call timeout must be greater than zero".into(),
            ));
        }

        Ok(ProvisioningService {
            directory,
            profiles,
            policies: self.policies,
            call_timeout: self.call_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::profile::MemoryProfileStore;

    #[test]
    fn test_missing_collaborators() {
        let err = ProvisioningServiceBuilder::new()
            .with_profile_store(Arc::new(MemoryProfileStore::new()))
            .build()
            .err();
        assert!(matches!(err, Some(ProvisionError::Config(_))));

        let err = ProvisioningServiceBuilder::new()
            .with_directory(Arc::new(MemoryDirectory::new()))
            .build()
            .err();
        assert!(matches!(err, Some(ProvisionError::Config(_))));
    }

    #[test]
    fn test_zero_timeout() {
        let err = ProvisioningServiceBuilder::new()
            .with_directory(Arc::new(MemoryDirectory::new()))
            .with_profile_store(Arc::new(MemoryProfileStore::new()))
            .with_call_timeout(Duration::ZERO)
            .build()
            .err();

        assert!(matches!(err, Some(ProvisionError::Config(_))));
    }
}
