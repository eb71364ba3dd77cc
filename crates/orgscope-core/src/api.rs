use std::future::Future;

use crate::error::Result;
use crate::types::{Environment, OrgTree};

/// The organization API the resolver consumes.
///
/// Implementations own transport concerns (auth, timeouts, retry). Errors
/// must be classified: 403-class failures as [`ScopeError::Permission`],
/// everything else that came back from the platform or the network as
/// [`ScopeError::Upstream`].
///
/// [`ScopeError::Permission`]: crate::error::ScopeError::Permission
/// [`ScopeError::Upstream`]: crate::error::ScopeError::Upstream
pub trait OrganizationApi: Send + Sync {
    /// Environments visible under `organization_id` (root or business group).
    fn fetch_environments(
        &self,
        organization_id: &str,
    ) -> impl Future<Output = Result<Vec<Environment>>> + Send;

    /// The hierarchy rooted at the account's root organization.
    fn fetch_hierarchy(
        &self,
        account_id: &str,
        organization_id: &str,
    ) -> impl Future<Output = Result<OrgTree>> + Send;
}

impl<T: OrganizationApi> OrganizationApi for std::sync::Arc<T> {
    fn fetch_environments(
        &self,
        organization_id: &str,
    ) -> impl Future<Output = Result<Vec<Environment>>> + Send {
        (**self).fetch_environments(organization_id)
    }

    fn fetch_hierarchy(
        &self,
        account_id: &str,
        organization_id: &str,
    ) -> impl Future<Output = Result<OrgTree>> + Send {
        (**self).fetch_hierarchy(account_id, organization_id)
    }
}
