use crate::error::{Result, ScopeError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    /// `sandbox`, `production` or `design` on current platforms; kept as a
    /// plain string so new kinds round-trip untouched.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Environment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn is_production(&self) -> bool {
        self.kind.as_deref() == Some("production")
    }
}

// ---------------------------------------------------------------------------
// BusinessGroup
// ---------------------------------------------------------------------------

/// A selected sub-scope. Id and name travel together so one can never be
/// stored without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessGroup {
    pub id: String,
    pub name: String,
}

impl BusinessGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_group: Option<BusinessGroup>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hierarchy_fetch: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(account_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            account_id: account_id.into(),
            display_name: None,
            organization_id: organization_id.into(),
            organization_name: None,
            business_group: None,
            environments: Vec::new(),
            last_hierarchy_fetch: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The organization id that governs calls made on behalf of this account.
    pub fn effective_organization_id(&self) -> &str {
        self.business_group
            .as_ref()
            .map(|bg| bg.id.as_str())
            .unwrap_or(&self.organization_id)
    }

    pub fn is_group_scoped(&self) -> bool {
        self.business_group.is_some()
    }

    /// Human label for the current scope, e.g. for a status indicator.
    pub fn scope_label(&self) -> String {
        match &self.business_group {
            Some(bg) => bg.name.clone(),
            None => self
                .organization_name
                .clone()
                .unwrap_or_else(|| self.organization_id.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// AccountUpdate
// ---------------------------------------------------------------------------

/// Partial account write. `None` keeps the stored value; the nested
/// `Option`s on `business_group` and `last_hierarchy_fetch` allow clearing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountUpdate {
    pub account_id: String,
    pub display_name: Option<String>,
    pub organization_id: Option<String>,
    pub organization_name: Option<String>,
    pub business_group: Option<Option<BusinessGroup>>,
    pub environments: Option<Vec<Environment>>,
    pub last_hierarchy_fetch: Option<Option<DateTime<Utc>>>,
}

impl AccountUpdate {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Default::default()
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn organization_id(mut self, id: impl Into<String>) -> Self {
        self.organization_id = Some(id.into());
        self
    }

    pub fn organization_name(mut self, name: impl Into<String>) -> Self {
        self.organization_name = Some(name.into());
        self
    }

    pub fn business_group(mut self, group: Option<BusinessGroup>) -> Self {
        self.business_group = Some(group);
        self
    }

    pub fn environments(mut self, envs: Vec<Environment>) -> Self {
        self.environments = Some(envs);
        self
    }

    pub fn last_hierarchy_fetch(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.last_hierarchy_fetch = Some(at);
        self
    }

    /// Apply onto an existing record. Does not touch `account_id` or `created_at`.
    pub fn apply_to(self, account: &mut Account) {
        if let Some(v) = self.display_name {
            account.display_name = Some(v);
        }
        if let Some(v) = self.organization_id {
            account.organization_id = v;
        }
        if let Some(v) = self.organization_name {
            account.organization_name = Some(v);
        }
        if let Some(v) = self.business_group {
            account.business_group = v;
        }
        if let Some(v) = self.environments {
            account.environments = v;
        }
        if let Some(v) = self.last_hierarchy_fetch {
            account.last_hierarchy_fetch = v;
        }
        account.updated_at = Utc::now();
    }

    /// Build a fresh record. Requires `organization_id`.
    pub fn into_new_account(self) -> Result<Account> {
        let org = self
            .organization_id
            .clone()
            .filter(|o| !o.is_empty())
            .ok_or_else(|| {
                ScopeError::InvalidAccount(format!(
                    "new account '{}' needs an organization id",
                    self.account_id
                ))
            })?;
        let mut account = Account::new(self.account_id.clone(), org);
        self.apply_to(&mut account);
        Ok(account)
    }
}

impl From<Account> for AccountUpdate {
    /// Full replacement of every mutable field.
    fn from(a: Account) -> Self {
        Self {
            account_id: a.account_id,
            display_name: a.display_name,
            organization_id: Some(a.organization_id),
            organization_name: a.organization_name,
            business_group: Some(a.business_group),
            environments: Some(a.environments),
            last_hierarchy_fetch: Some(a.last_hierarchy_fetch),
        }
    }
}

// ---------------------------------------------------------------------------
// OrgTree
// ---------------------------------------------------------------------------

/// A root organization and its nested business groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgTree {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub sub_organizations: Vec<OrgTree>,
}

impl OrgTree {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            sub_organizations: Vec::new(),
        }
    }

    pub fn with_child(mut self, mut child: OrgTree) -> Self {
        child.parent_id = Some(self.id.clone());
        self.sub_organizations.push(child);
        self
    }

    pub fn find(&self, id: &str) -> Option<&OrgTree> {
        if self.id == id {
            return Some(self);
        }
        self.sub_organizations.iter().find_map(|c| c.find(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Depth-first listing of every node with its depth (root = 0).
    pub fn flatten(&self) -> Vec<(usize, &OrgTree)> {
        let mut out = Vec::new();
        self.walk(0, &mut out);
        out
    }

    fn walk<'a>(&'a self, depth: usize, out: &mut Vec<(usize, &'a OrgTree)>) {
        out.push((depth, self));
        for child in &self.sub_organizations {
            child.walk(depth + 1, out);
        }
    }
}

// ---------------------------------------------------------------------------
// HierarchyCacheEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyCacheEntry {
    pub tree: OrgTree,
    pub fetched_at: DateTime<Utc>,
}

impl HierarchyCacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

// ---------------------------------------------------------------------------
// Id validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@+\-]*$").unwrap())
}

/// Account, organization and group ids are opaque but must be non-empty and
/// free of whitespace or path separators.
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.len() > 256 || !id_re().is_match(id) {
        return Err(ScopeError::InvalidAccount(format!("invalid {kind} id '{id}'")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> OrgTree {
        OrgTree::new("root-1", "Acme")
            .with_child(
                OrgTree::new("bg-emea", "EMEA").with_child(OrgTree::new("bg-uk", "UK")),
            )
            .with_child(OrgTree::new("bg-sales", "Sales"))
    }

    #[test]
    fn effective_org_prefers_business_group() {
        let mut a = Account::new("alice", "root-1");
        assert_eq!(a.effective_organization_id(), "root-1");
        a.business_group = Some(BusinessGroup::new("bg-9", "EMEA"));
        assert_eq!(a.effective_organization_id(), "bg-9");
        assert_eq!(a.scope_label(), "EMEA");
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let mut a = Account::new("alice", "root-1");
        a.environments = vec![Environment::new("e1", "Prod")];
        AccountUpdate::new("alice")
            .business_group(Some(BusinessGroup::new("bg-1", "Sales")))
            .apply_to(&mut a);
        assert_eq!(a.environments.len(), 1);
        assert_eq!(a.business_group.as_ref().unwrap().id, "bg-1");
    }

    #[test]
    fn update_can_clear_business_group() {
        let mut a = Account::new("alice", "root-1");
        a.business_group = Some(BusinessGroup::new("bg-1", "Sales"));
        AccountUpdate::new("alice").business_group(None).apply_to(&mut a);
        assert!(a.business_group.is_none());
    }

    #[test]
    fn new_account_requires_organization() {
        let err = AccountUpdate::new("alice").into_new_account().unwrap_err();
        assert!(matches!(err, ScopeError::InvalidAccount(_)));
    }

    #[test]
    fn tree_find_and_flatten() {
        let tree = sample_tree();
        assert_eq!(tree.find("bg-uk").unwrap().name, "UK");
        assert_eq!(
            tree.find("bg-uk").unwrap().parent_id.as_deref(),
            Some("bg-emea")
        );
        assert!(!tree.contains("bg-missing"));
        let flat: Vec<_> = tree.flatten().iter().map(|(d, n)| (*d, n.id.clone())).collect();
        assert_eq!(
            flat,
            vec![
                (0, "root-1".to_string()),
                (1, "bg-emea".to_string()),
                (2, "bg-uk".to_string()),
                (1, "bg-sales".to_string()),
            ]
        );
    }

    #[test]
    fn tree_parses_platform_payload() {
        let json = r#"{
            "id": "root-1",
            "name": "Acme",
            "subOrganizations": [
                { "id": "bg-1", "name": "Sales", "parentId": "root-1", "subOrganizations": [] }
            ]
        }"#;
        let tree: OrgTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.sub_organizations[0].id, "bg-1");
    }

    #[test]
    fn environment_type_field() {
        let env: Environment =
            serde_json::from_str(r#"{"id":"e1","name":"Prod","type":"production"}"#).unwrap();
        assert!(env.is_production());
        let bare: Environment = serde_json::from_str(r#"{"id":"e2","name":"Dev"}"#).unwrap();
        assert_eq!(bare.kind, None);
    }

    #[test]
    fn id_validation() {
        for id in ["root-1", "alice@example.com", "a1b2c3", "user+tag@x.io"] {
            validate_id("account", id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
        for id in ["", " lead", "a b", "a/b", "-x"] {
            assert!(validate_id("account", id).is_err(), "expected invalid: {id}");
        }
    }
}
