//! Provisioning flow with compensation.

use std::sync::Arc;
use std::time::Duration;

use crate::account::{
    AccountRequest, Identity, NewIdentity, Profile, Provisioned,
};
use crate::classify::{BackendError, Failure, classify};
use crate::directory::IdentityDirectory;
use crate::error::{Compensation, ProvisionError};
use crate::profile::ProfileStore;
use crate::provision::{Policies, ProvisioningServiceBuilder};
use crate::retry::{retry, with_timeout};

const LOOKUP: &str = "lookup";
const CREATE_IDENTITY: &str = "create_identity";
const INSERT_PROFILE: &str = "insert_profile";
const FIND_PROFILE: &str = "find_profile";

/// Creates an identity and its profile, rolling the identity back when the
/// profile cannot be written.
#[derive(Clone)]
pub struct ProvisioningService {
    pub(crate) directory: Arc<dyn IdentityDirectory>,
    pub(crate) profiles: Arc<dyn ProfileStore>,
    pub(crate) policies: Policies,
    pub(crate) call_timeout: Duration,
}

impl ProvisioningService {
    /// Create a [`ProvisioningServiceBuilder`].
    pub fn builder() -> ProvisioningServiceBuilder {
        ProvisioningServiceBuilder::new()
    }

    /// Retry budgets in use.
    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    /// Ping both collaborators once. Meant for start-up.
    pub async fn verify(&self) -> Result<(), ProvisionError> {
        with_timeout(self.call_timeout, self.directory.ping())
            .await
            .map_err(|err| {
                ProvisionError::Config(format!(
                    "identity directory check failed: {err}"
                ))
            })?;
        with_timeout(self.call_timeout, self.profiles.ping())
            .await
            .map_err(|err| {
                ProvisionError::Config(format!(
                    "profile store check failed: {err}"
                ))
            })?;

        tracing::info!("provisioning collaborators reachable");
        Ok(())
    }

    /// Ensure exactly one identity and one profile exist for the request,
    /// or that nothing new does.
    pub async fn provision(
        &self,
        request: &AccountRequest,
    ) -> Result<Provisioned, ProvisionError> {
        let outcome = self.run(request).await;

        let label = match &outcome {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        metrics::counter!("provision_outcomes_total", "outcome" => label)
            .increment(1);

        outcome
    }

    async fn run(
        &self,
        request: &AccountRequest,
    ) -> Result<Provisioned, ProvisionError> {
        request.check()?;

        // Fast path only. Creation below is the authoritative guard.
        let existing = self.find_identities(&request.email).await?;
        if !existing.is_empty() {
            tracing::info!(
                identities = existing.len(),
                "email already has an identity"
            );
            return Err(ProvisionError::DuplicateAccount);
        }

        let mut attempts = 0u32;
        let created = retry(
            &self.policies.identity,
            CREATE_IDENTITY,
            Failure::is_transient,
            || {
                attempts += 1;
                with_timeout(
                    self.call_timeout,
                    self.directory.create(NewIdentity::from(request)),
                )
            },
        )
        .await;

        let identity = match created {
            Ok(identity) => identity,
            // An earlier attempt may have landed with its reply lost.
            Err(err)
                if attempts > 1 && classify(&err) == Failure::Duplicate =>
            {
                self.adopt(request).await?
            },
            Err(err) => return Err(escalate(err)),
        };

        tracing::debug!(identity_id = %identity.id, "identity created");

        let profile = Profile::for_identity(&identity, request);
        let inserted = retry(
            &self.policies.profile,
            INSERT_PROFILE,
            |failure| failure == Failure::Network,
            || with_timeout(self.call_timeout, self.profiles.insert(&profile)),
        )
        .await;

        if let Err(err) = inserted {
            let landed = match self.profile_landed(&identity.id, &err).await {
                Ok(landed) => landed,
                Err(lookup) => {
                    tracing::error!(
                        identity_id = %identity.id,
                        error = %err,
                        lookup_error = %lookup,
                        "profile state unknown, identity kept"
                    );

                    return Err(ProvisionError::ProfileCreationFailed {
                        reason: err.to_string(),
                        compensation: Compensation::Orphaned {
                            identity_id: identity.id,
                            error: lookup.to_string(),
                        },
                    });
                },
            };

            if !landed {
                tracing::error!(
                    identity_id = %identity.id,
                    error = %err,
                    "profile insertion failed"
                );

                let compensation = self.compensate(&identity.id).await;
                return Err(ProvisionError::ProfileCreationFailed {
                    reason: err.to_string(),
                    compensation,
                });
            }
        }

        tracing::info!(identity_id = %identity.id, "account provisioned");
        Ok(Provisioned {
            identity_id: identity.id,
        })
    }

    async fn find_identities(
        &self,
        email: &str,
    ) -> Result<Vec<Identity>, ProvisionError> {
        retry(
            &self.policies.lookup,
            LOOKUP,
            |failure| failure == Failure::Network,
            || {
                with_timeout(
                    self.call_timeout,
                    self.directory.find_by_email(email),
                )
            },
        )
        .await
        .map_err(escalate)
    }

    /// Take over the identity an unacknowledged creation left behind,
    /// unless another call already gave it a profile.
    async fn adopt(
        &self,
        request: &AccountRequest,
    ) -> Result<Identity, ProvisionError> {
        let Some(identity) =
            self.find_identities(&request.email).await?.into_iter().next()
        else {
            return Err(ProvisionError::DuplicateAccount);
        };

        let profile = retry(
            &self.policies.lookup,
            FIND_PROFILE,
            |failure| failure == Failure::Network,
            || {
                with_timeout(
                    self.call_timeout,
                    self.profiles.find_by_id(&identity.id),
                )
            },
        )
        .await
        .map_err(escalate)?;
        if profile.is_some() {
            return Err(ProvisionError::DuplicateAccount);
        }

        tracing::warn!(
            identity_id = %identity.id,
            "identity created by an unacknowledged attempt"
        );
        Ok(identity)
    }

    /// Whether a duplicate on insertion is our own earlier write. Profile
    /// ids come from fresh identities, so a row with that id is ours.
    async fn profile_landed(
        &self,
        identity_id: &str,
        err: &BackendError,
    ) -> Result<bool, BackendError> {
        if classify(err) != Failure::Duplicate {
            return Ok(false);
        }

        let found = retry(
            &self.policies.lookup,
            FIND_PROFILE,
            |failure| failure == Failure::Network,
            || {
                with_timeout(
                    self.call_timeout,
                    self.profiles.find_by_id(identity_id),
                )
            },
        )
        .await?;

        if found.is_some() {
            tracing::warn!(
                identity_id,
                "profile written by an unacknowledged attempt"
            );
        }
        Ok(found.is_some())
    }

    /// Delete an identity left without profile. One attempt only.
    async fn compensate(&self, identity_id: &str) -> Compensation {
        let deleted =
            with_timeout(self.call_timeout, self.directory.delete(identity_id))
                .await;

        match deleted {
            Ok(()) => {
                tracing::warn!(identity_id, "identity rolled back");
                metrics::counter!(
                    "provision_compensations_total",
                    "result" => "deleted"
                )
                .increment(1);

                Compensation::Deleted
            },
            Err(err) => {
                tracing::error!(
                    identity_id,
                    error = %err,
                    "identity rollback failed, orphan left behind"
                );
                metrics::counter!(
                    "provision_compensations_total",
                    "result" => "orphaned"
                )
                .increment(1);

                Compensation::Orphaned {
                    identity_id: identity_id.to_owned(),
                    error: err.to_string(),
                }
            },
        }
    }
}

/// Terminal outcome of a failed lookup or identity creation.
fn escalate(err: BackendError) -> ProvisionError {
    match classify(&err) {
        Failure::Duplicate => ProvisionError::DuplicateAccount,
        Failure::Invalid => ProvisionError::InvalidRequest(err.to_string()),
        Failure::Unauthorized => ProvisionError::Config(format!(
            "identity directory rejected credentials: {err}"
        )),
        Failure::Network | Failure::Server | Failure::Unknown => {
            ProvisionError::Unavailable {
                last_error: err.to_string(),
            }
        },
    }
}
