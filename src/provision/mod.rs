//! Account provisioning: one identity and one profile, or neither.
mod builder;
mod service;

pub use builder::*;
pub use service::*;

use crate::retry::RetryPolicy;

/// Retry budgets of each remote step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policies {
    pub lookup: RetryPolicy,
    pub identity: RetryPolicy,
    pub profile: RetryPolicy,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            lookup: RetryPolicy::lookup(),
            identity: RetryPolicy::identity_creation(),
            profile: RetryPolicy::profile_insertion(),
        }
    }
}
