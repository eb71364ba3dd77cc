use serde::Serialize;

use crate::types::BusinessGroup;

/// Published on the context's broadcast channel whenever scope-dependent
/// state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScopeEvent {
    /// The effective organization of `account_id` was (re)committed.
    ScopeChanged {
        account_id: String,
        previous_org_id: String,
        current_org_id: String,
        business_group: Option<BusinessGroup>,
    },
    /// Environments were refetched without a scope change.
    EnvironmentsRefreshed {
        account_id: String,
        org_id: String,
        count: usize,
    },
    AccountSwitched {
        previous: Option<String>,
        current: String,
    },
    SignedOut,
}

impl ScopeEvent {
    /// Whether a view showing data scoped to `org_id` must close or reload.
    pub fn invalidates(&self, org_id: &str) -> bool {
        match self {
            ScopeEvent::ScopeChanged {
                previous_org_id,
                current_org_id,
                ..
            } => previous_org_id == org_id || current_org_id == org_id,
            ScopeEvent::EnvironmentsRefreshed { org_id: o, .. } => o == org_id,
            ScopeEvent::AccountSwitched { .. } | ScopeEvent::SignedOut => true,
        }
    }
}
