use crate::config::ScopeConfig;
use crate::error::Result;
use crate::types::{Account, Environment};
use serde::Deserialize;

/// Run any pending schema migrations on a loaded [`ScopeConfig`].
///
/// Schema v1 has no migrations yet. When the config schema changes in ways
/// that require data transforms, add a match arm on `cfg.version` here.
pub fn migrate_config(cfg: ScopeConfig) -> Result<ScopeConfig> {
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Single-account legacy layout
// ---------------------------------------------------------------------------

/// Legacy key holding the `/accounts/api/me` payload.
pub const LEGACY_USER_INFO: &str = "user_info";
/// Legacy key holding the environment list for the single signed-in user.
pub const LEGACY_ENVIRONMENTS: &str = "environments";

#[derive(Debug, Deserialize)]
struct LegacyMe {
    user: LegacyUser,
}

#[derive(Debug, Deserialize)]
struct LegacyUser {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    organization: LegacyOrganization,
}

#[derive(Debug, Deserialize)]
struct LegacyOrganization {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyEnvironments {
    Wrapped { data: Vec<Environment> },
    Bare(Vec<Environment>),
}

/// Build an account from the flat legacy keys.
///
/// The account id is the platform user id, falling back to the email. The
/// business group is always absent: the legacy layout only knew the root
/// organization.
pub fn account_from_legacy(user_info: &[u8], environments: Option<&[u8]>) -> Result<Account> {
    let me: LegacyMe = serde_json::from_slice(user_info)?;
    let account_id = me
        .user
        .id
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| me.user.email.clone().filter(|s| !s.is_empty()))
        .ok_or_else(|| {
            crate::error::ScopeError::InvalidAccount(
                "legacy user info has neither id nor email".to_string(),
            )
        })?;

    let mut account = Account::new(account_id, me.user.organization.id);
    account.organization_name = me.user.organization.name;
    account.display_name = me.user.username.or(me.user.email);

    if let Some(raw) = environments {
        account.environments = match serde_json::from_slice(raw)? {
            LegacyEnvironments::Wrapped { data } => data,
            LegacyEnvironments::Bare(list) => list,
        };
    }
    Ok(account)
}
