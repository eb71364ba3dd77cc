//! Business-group scope resolution.
//!
//! The resolver is the single source of truth for "which organization id
//! governs this call" and the only writer of an account's business group,
//! environments and hierarchy cache.
//!
//! ```text
//!            select_business_group
//!   ROOT_SCOPE ───────────────────▶ GROUP_SCOPE
//!        ▲                               │
//!        └────── clear_business_group ◀──┘
//! ```
//!
//! Scope changes follow fetch-then-commit: environments for the target scope
//! are fetched first and only then written together with the group in one
//! store transaction. A failed fetch writes nothing, so the previous scope
//! stands untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::OrganizationApi;
use crate::config::ScopeConfig;
use crate::context::ScopeContext;
use crate::error::{Result, ScopeError};
use crate::events::ScopeEvent;
use crate::store::AccountStore;
use crate::types::{validate_id, Account, AccountUpdate, BusinessGroup, Environment, OrgTree};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Identity returned by the platform at login.
#[derive(Debug, Clone, Default)]
pub struct SignIn {
    pub account_id: String,
    pub organization_id: String,
    pub organization_name: Option<String>,
    pub display_name: Option<String>,
}

/// A cached hierarchy handed back to callers that want to show possibly
/// stale data after a failed refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedHierarchy {
    pub tree: OrgTree,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Reconciliation {
    /// No business group selected.
    RootScope,
    Unchanged { group: BusinessGroup },
    /// The group still exists under a new display name.
    Renamed { group: BusinessGroup },
    /// The group no longer exists; the account is back on its root organization.
    Reverted { group: BusinessGroup },
}

// ---------------------------------------------------------------------------
// ScopeResolver
// ---------------------------------------------------------------------------

pub struct ScopeResolver<A> {
    ctx: Arc<ScopeContext>,
    api: A,
    hierarchy_ttl: chrono::Duration,
}

impl<A: OrganizationApi> ScopeResolver<A> {
    pub fn new(ctx: Arc<ScopeContext>, api: A, config: &ScopeConfig) -> Self {
        Self {
            ctx,
            api,
            hierarchy_ttl: config.hierarchy_ttl(),
        }
    }

    pub fn context(&self) -> &ScopeContext {
        &self.ctx
    }

    fn store(&self) -> &AccountStore {
        self.ctx.store()
    }

    fn require_account(&self, account_id: &str) -> Result<Account> {
        self.store()
            .account(account_id)?
            .ok_or_else(|| ScopeError::AccountNotFound(account_id.to_string()))
    }

    pub fn active_account(&self) -> Result<Option<Account>> {
        self.store().active_account()
    }

    // -----------------------------------------------------------------------
    // Effective organization id
    // -----------------------------------------------------------------------

    /// The organization id every outbound call should use.
    ///
    /// Never fails and never touches the network. With no active account the
    /// result is `fallback` or `""`; callers treat `""` as "no scope" and
    /// return an empty result rather than erroring.
    pub fn effective_organization_id(&self, fallback: Option<&str>) -> String {
        match self.store().active_account() {
            Ok(Some(account)) => account.effective_organization_id().to_string(),
            Ok(None) => fallback.unwrap_or_default().to_string(),
            Err(e) => {
                warn!(error = %e, "could not read active account; treating as unscoped");
                fallback.unwrap_or_default().to_string()
            }
        }
    }

    /// Same projection for a named account; `""` if it does not exist.
    pub fn effective_organization_id_for(&self, account_id: &str) -> String {
        match self.store().account(account_id) {
            Ok(Some(account)) => account.effective_organization_id().to_string(),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(account = %account_id, error = %e, "could not read account; treating as unscoped");
                String::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scope changes
    // -----------------------------------------------------------------------

    /// Move `account_id` into business group `group_id`.
    ///
    /// Selecting the root organization's own id is the same as
    /// [`clear_business_group`](Self::clear_business_group).
    pub async fn select_business_group(
        &self,
        account_id: &str,
        group_id: &str,
        group_name: &str,
    ) -> Result<Account> {
        let account = self.require_account(account_id)?;
        validate_id("business group", group_id)?;
        if group_id == account.organization_id {
            return self.apply_scope(account_id, None).await;
        }
        // Only a fresh tree can rule a group out; otherwise the fetch decides.
        if let Some(entry) = self.store().hierarchy_cache(account_id)? {
            if entry.is_fresh(Utc::now(), self.hierarchy_ttl) && !entry.tree.contains(group_id) {
                return Err(ScopeError::BusinessGroupNotFound(group_id.to_string()));
            }
        }
        let name = if group_name.trim().is_empty() {
            group_id
        } else {
            group_name
        };
        self.apply_scope(account_id, Some(BusinessGroup::new(group_id, name)))
            .await
    }

    /// Return `account_id` to its root organization.
    pub async fn clear_business_group(&self, account_id: &str) -> Result<Account> {
        self.require_account(account_id)?;
        self.apply_scope(account_id, None).await
    }

    async fn apply_scope(&self, account_id: &str, target: Option<BusinessGroup>) -> Result<Account> {
        let before = self.require_account(account_id)?;
        let epoch = self.ctx.epoch();
        let target_org = target
            .as_ref()
            .map(|g| g.id.clone())
            .unwrap_or_else(|| before.organization_id.clone());

        debug!(account = %account_id, org = %target_org, "fetching environments for scope change");
        let environments = match self.api.fetch_environments(&target_org).await {
            Ok(envs) => envs,
            Err(e) => {
                warn!(
                    account = %account_id,
                    org = %target_org,
                    error = %e,
                    "environment fetch failed; keeping previous scope"
                );
                return Err(e);
            }
        };

        if self.ctx.epoch() != epoch {
            info!(account = %account_id, org = %target_org, "discarding scope change from a previous session");
            return Err(ScopeError::Superseded(account_id.to_string()));
        }

        // Re-read: another commit may have landed while we were fetching.
        let current = self.require_account(account_id)?;
        let previous_org_id = current.effective_organization_id().to_string();
        let updated = self.store().upsert_account(
            AccountUpdate::new(account_id)
                .business_group(target.clone())
                .environments(environments),
        )?;

        info!(
            account = %account_id,
            from = %previous_org_id,
            to = %target_org,
            environments = updated.environments.len(),
            "scope changed"
        );
        self.ctx.publish(ScopeEvent::ScopeChanged {
            account_id: account_id.to_string(),
            previous_org_id,
            current_org_id: target_org,
            business_group: target,
        });
        Ok(updated)
    }

    /// Refetch environments for the account's current scope and replace them.
    pub async fn refresh_environments(&self, account_id: &str) -> Result<Vec<Environment>> {
        let before = self.require_account(account_id)?;
        let epoch = self.ctx.epoch();
        let org = before.effective_organization_id().to_string();
        let environments = self.api.fetch_environments(&org).await?;

        if self.ctx.epoch() != epoch {
            return Err(ScopeError::Superseded(account_id.to_string()));
        }
        let current = self.require_account(account_id)?;
        if current.effective_organization_id() != org {
            // A scope change committed meanwhile; these belong to the old scope.
            return Err(ScopeError::Superseded(account_id.to_string()));
        }
        let updated = self
            .store()
            .upsert_account(AccountUpdate::new(account_id).environments(environments))?;
        debug!(account = %account_id, org = %org, count = updated.environments.len(), "environments refreshed");
        self.ctx.publish(ScopeEvent::EnvironmentsRefreshed {
            account_id: account_id.to_string(),
            org_id: org,
            count: updated.environments.len(),
        });
        Ok(updated.environments)
    }

    // -----------------------------------------------------------------------
    // Hierarchy
    // -----------------------------------------------------------------------

    /// The organization tree for `account_id`, served from cache while fresh.
    ///
    /// A failed fetch leaves any existing cache entry in place; use
    /// [`cached_hierarchy`](Self::cached_hierarchy) to fall back to it.
    pub async fn get_organization_hierarchy(
        &self,
        account_id: &str,
        force_refresh: bool,
    ) -> Result<OrgTree> {
        let account = self.require_account(account_id)?;
        if !force_refresh {
            if let Some(entry) = self.store().hierarchy_cache(account_id)? {
                if entry.is_fresh(Utc::now(), self.hierarchy_ttl) {
                    debug!(account = %account_id, "hierarchy cache hit");
                    return Ok(entry.tree);
                }
            }
        }

        let epoch = self.ctx.epoch();
        let tree = match self
            .api
            .fetch_hierarchy(account_id, &account.organization_id)
            .await
        {
            Ok(tree) => tree,
            Err(e) => {
                warn!(account = %account_id, error = %e, "hierarchy fetch failed; cache left as is");
                return Err(e);
            }
        };

        if self.ctx.epoch() != epoch || self.store().account(account_id)?.is_none() {
            info!(account = %account_id, "discarding hierarchy from a previous session");
            return Err(ScopeError::Superseded(account_id.to_string()));
        }
        self.store()
            .set_hierarchy_cache(account_id, &tree, Utc::now())?;
        debug!(account = %account_id, nodes = tree.flatten().len(), "hierarchy cached");
        Ok(tree)
    }

    pub fn cached_hierarchy(&self, account_id: &str) -> Result<Option<CachedHierarchy>> {
        let now = Utc::now();
        Ok(self
            .store()
            .hierarchy_cache(account_id)?
            .map(|entry| CachedHierarchy {
                stale: !entry.is_fresh(now, self.hierarchy_ttl),
                tree: entry.tree,
                fetched_at: entry.fetched_at,
            }))
    }

    /// Manual refresh: the next hierarchy read goes to the network.
    pub fn invalidate_hierarchy(&self, account_id: &str) -> Result<bool> {
        self.store().invalidate_hierarchy_cache(account_id)
    }

    /// Check the selected business group against the hierarchy and revert to
    /// root if it no longer exists.
    pub async fn reconcile_business_group(&self, account_id: &str) -> Result<Reconciliation> {
        let account = self.require_account(account_id)?;
        let Some(group) = account.business_group.clone() else {
            return Ok(Reconciliation::RootScope);
        };
        let tree = self.get_organization_hierarchy(account_id, false).await?;
        match tree.find(&group.id) {
            Some(node) if node.name == group.name => Ok(Reconciliation::Unchanged { group }),
            Some(node) => {
                let renamed = BusinessGroup::new(group.id.clone(), node.name.clone());
                self.store().upsert_account(
                    AccountUpdate::new(account_id).business_group(Some(renamed.clone())),
                )?;
                info!(account = %account_id, group = %renamed.id, name = %renamed.name, "business group renamed");
                self.ctx.publish(ScopeEvent::ScopeChanged {
                    account_id: account_id.to_string(),
                    previous_org_id: renamed.id.clone(),
                    current_org_id: renamed.id.clone(),
                    business_group: Some(renamed.clone()),
                });
                Ok(Reconciliation::Renamed { group: renamed })
            }
            None => {
                warn!(account = %account_id, group = %group.id, "selected business group no longer exists, reverting to root");
                self.apply_scope(account_id, None).await?;
                Ok(Reconciliation::Reverted { group })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Account lifecycle
    // -----------------------------------------------------------------------

    /// Store and activate a freshly authenticated account.
    ///
    /// A previously selected business group survives re-login as long as the
    /// root organization is the same. Environment fetch is best effort: on
    /// failure the account is still signed in.
    pub async fn sign_in(&self, sign_in: SignIn) -> Result<Account> {
        validate_id("account", &sign_in.account_id)?;
        validate_id("organization", &sign_in.organization_id)?;
        let previous = self.store().active_account_id()?;
        let existing = self.store().account(&sign_in.account_id)?;
        let same_org = existing
            .as_ref()
            .is_some_and(|a| a.organization_id == sign_in.organization_id);
        let group = existing
            .as_ref()
            .filter(|_| same_org)
            .and_then(|a| a.business_group.clone());
        let effective = group
            .as_ref()
            .map(|g| g.id.clone())
            .unwrap_or_else(|| sign_in.organization_id.clone());

        let environments = match self.api.fetch_environments(&effective).await {
            Ok(envs) => envs,
            Err(e) => {
                warn!(account = %sign_in.account_id, error = %e, "could not fetch environments at sign-in");
                existing
                    .as_ref()
                    .filter(|a| a.effective_organization_id() == effective)
                    .map(|a| a.environments.clone())
                    .unwrap_or_default()
            }
        };

        let mut update = AccountUpdate::new(&sign_in.account_id)
            .organization_id(&sign_in.organization_id)
            .business_group(group)
            .environments(environments);
        if let Some(name) = sign_in.organization_name {
            update = update.organization_name(name);
        }
        if let Some(name) = sign_in.display_name {
            update = update.display_name(name);
        }
        if existing.is_some() && !same_org {
            update = update.last_hierarchy_fetch(None);
            self.store().invalidate_hierarchy_cache(&sign_in.account_id)?;
        }
        let account = self.store().upsert_account(update)?;
        self.store().set_active_account(&account.account_id)?;
        self.ctx.bump_epoch();
        info!(account = %account.account_id, org = %account.organization_id, "signed in");
        self.ctx.publish(ScopeEvent::AccountSwitched {
            previous,
            current: account.account_id.clone(),
        });
        Ok(account)
    }

    /// Make another stored account active.
    pub fn switch_account(&self, account_id: &str) -> Result<Account> {
        let previous = self.store().active_account_id()?;
        if previous.as_deref() == Some(account_id) {
            return self.require_account(account_id);
        }
        self.store().set_active_account(account_id)?;
        self.ctx.bump_epoch();
        info!(account = %account_id, "switched account");
        self.ctx.publish(ScopeEvent::AccountSwitched {
            previous,
            current: account_id.to_string(),
        });
        self.require_account(account_id)
    }

    /// Forget one account. Signing out the active one leaves no active account.
    pub fn remove_account(&self, account_id: &str) -> Result<()> {
        let was_active = self.store().active_account_id()?.as_deref() == Some(account_id);
        if !self.store().delete_account(account_id)? {
            return Err(ScopeError::AccountNotFound(account_id.to_string()));
        }
        if was_active {
            self.ctx.bump_epoch();
            self.ctx.publish(ScopeEvent::SignedOut);
        }
        info!(account = %account_id, "account removed");
        Ok(())
    }

    /// Delete every account. In-flight scope changes are discarded.
    pub fn sign_out(&self) -> Result<usize> {
        let removed = self.store().delete_all_accounts()?;
        self.ctx.bump_epoch();
        info!(accounts = removed, "signed out");
        self.ctx.publish(ScopeEvent::SignedOut);
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
