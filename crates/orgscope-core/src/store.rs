//! Durable account and scope state using redb.
//!
//! # Table design
//!
//! ```text
//! accounts   account_id        -> JSON Account
//! meta       "active_account"  -> account_id bytes
//! hierarchy  account_id        -> JSON HierarchyCacheEntry
//! legacy     flat legacy key   -> raw JSON (single-account layout)
//! ```
//!
//! Every mutation is one write transaction committed before the call
//! returns, so a successful call survives a crash right after it.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, ScopeError};
use crate::migrations::{self, LEGACY_ENVIRONMENTS, LEGACY_USER_INFO};
use crate::types::{Account, AccountUpdate, HierarchyCacheEntry, OrgTree};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

const ACCOUNTS: JsonTable = TableDefinition::new("accounts");
const META: JsonTable = TableDefinition::new("meta");
const HIERARCHY: JsonTable = TableDefinition::new("hierarchy");
const LEGACY: JsonTable = TableDefinition::new("legacy");

const ACTIVE_ACCOUNT_KEY: &str = "active_account";

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

/// Persistent store for accounts, the active-account pointer and the
/// per-account hierarchy cache.
///
/// The store holds no opinion about which organization is effective; that
/// lives in [`crate::resolver::ScopeResolver`].
pub struct AccountStore {
    db: Database,
}

impl AccountStore {
    /// Open or create the database at `path`, then run the one-time legacy
    /// migration.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path)?;
        // Ensure every table exists before any reads
        let wt = db.begin_write()?;
        for def in [ACCOUNTS, META, HIERARCHY, LEGACY] {
            wt.open_table(def)?;
        }
        wt.commit()?;

        let store = Self { db };
        if let Some(account) = store.migrate_legacy_if_needed()? {
            info!(account = %account.account_id, "migrated legacy single-account state");
        }
        Ok(store)
    }

    /// Open the store under an orgscope home directory.
    pub fn open_in(home: &Path) -> Result<Self> {
        Self::open(&crate::paths::store_path(home))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> Result<Option<T>> {
        let rt = self.db.begin_read()?;
        let table = rt.open_table(def)?;
        let value = match table.get(key)? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        Ok(value)
    }

    pub fn account(&self, account_id: &str) -> Result<Option<Account>> {
        self.get_json(ACCOUNTS, account_id)
    }

    /// All stored accounts, sorted by id.
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let rt = self.db.begin_read()?;
        let table = rt.open_table(ACCOUNTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_, v) = entry?;
            result.push(decode::<Account>(v.value())?);
        }
        result.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(result)
    }

    pub fn active_account_id(&self) -> Result<Option<String>> {
        let rt = self.db.begin_read()?;
        let table = rt.open_table(META)?;
        let id = table
            .get(ACTIVE_ACCOUNT_KEY)?
            .map(|g| String::from_utf8_lossy(g.value()).into_owned());
        Ok(id)
    }

    /// The active account, or `None`. A pointer to a record that no longer
    /// exists reads as `None`.
    pub fn active_account(&self) -> Result<Option<Account>> {
        match self.active_account_id()? {
            Some(id) => self.account(&id),
            None => Ok(None),
        }
    }

    pub fn hierarchy_cache(&self, account_id: &str) -> Result<Option<HierarchyCacheEntry>> {
        self.get_json(HIERARCHY, account_id)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert or merge an account.
    ///
    /// Fields left as `None` in `update` keep their stored values. A new
    /// record needs `organization_id`. Returns the record as stored.
    pub fn upsert_account(&self, update: AccountUpdate) -> Result<Account> {
        crate::types::validate_id("account", &update.account_id)?;
        let wt = self.db.begin_write()?;
        let account = {
            let mut table = wt.open_table(ACCOUNTS)?;
            let existing: Option<Account> = match table.get(update.account_id.as_str())? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let account = match existing {
                Some(mut current) => {
                    update.apply_to(&mut current);
                    current
                }
                None => update.into_new_account()?,
            };
            let bytes = encode(&account)?;
            table.insert(account.account_id.as_str(), bytes.as_slice())?;
            account
        };
        wt.commit()?;
        Ok(account)
    }

    /// Point the active-account pointer at `account_id`.
    pub fn set_active_account(&self, account_id: &str) -> Result<()> {
        let wt = self.db.begin_write()?;
        {
            let accounts = wt.open_table(ACCOUNTS)?;
            if accounts.get(account_id)?.is_none() {
                return Err(ScopeError::AccountNotFound(account_id.to_string()));
            }
            let mut meta = wt.open_table(META)?;
            meta.insert(ACTIVE_ACCOUNT_KEY, account_id.as_bytes())?;
        }
        wt.commit()?;
        Ok(())
    }

    /// Remove one account and its hierarchy cache. Clears the active pointer
    /// if it referenced this account. Returns false if there was nothing to
    /// delete.
    pub fn delete_account(&self, account_id: &str) -> Result<bool> {
        let wt = self.db.begin_write()?;
        let removed = {
            let mut accounts = wt.open_table(ACCOUNTS)?;
            let removed = accounts.remove(account_id)?.is_some();
            let mut hierarchy = wt.open_table(HIERARCHY)?;
            hierarchy.remove(account_id)?;
            let mut meta = wt.open_table(META)?;
            let points_here = meta
                .get(ACTIVE_ACCOUNT_KEY)?
                .map(|g| g.value() == account_id.as_bytes())
                .unwrap_or(false);
            if points_here {
                meta.remove(ACTIVE_ACCOUNT_KEY)?;
            }
            removed
        };
        wt.commit()?;
        Ok(removed)
    }

    /// Clear every account, the active pointer and all hierarchy caches.
    /// Irreversible.
    pub fn delete_all_accounts(&self) -> Result<usize> {
        let wt = self.db.begin_write()?;
        let count = {
            let mut accounts = wt.open_table(ACCOUNTS)?;
            let ids = collect_keys(&accounts)?;
            for id in &ids {
                accounts.remove(id.as_str())?;
            }
            let mut hierarchy = wt.open_table(HIERARCHY)?;
            for id in collect_keys(&hierarchy)? {
                hierarchy.remove(id.as_str())?;
            }
            let mut meta = wt.open_table(META)?;
            meta.remove(ACTIVE_ACCOUNT_KEY)?;
            ids.len()
        };
        wt.commit()?;
        Ok(count)
    }

    /// Store a hierarchy snapshot and stamp the owning account's
    /// `last_hierarchy_fetch` in the same transaction.
    pub fn set_hierarchy_cache(
        &self,
        account_id: &str,
        tree: &OrgTree,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = HierarchyCacheEntry {
            tree: tree.clone(),
            fetched_at,
        };
        let bytes = encode(&entry)?;
        let wt = self.db.begin_write()?;
        {
            let mut hierarchy = wt.open_table(HIERARCHY)?;
            hierarchy.insert(account_id, bytes.as_slice())?;

            let mut accounts = wt.open_table(ACCOUNTS)?;
            let existing: Option<Account> = match accounts.get(account_id)? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            if let Some(mut account) = existing {
                account.last_hierarchy_fetch = Some(fetched_at);
                let bytes = encode(&account)?;
                accounts.insert(account_id, bytes.as_slice())?;
            }
        }
        wt.commit()?;
        Ok(())
    }

    /// Drop the cached hierarchy for `account_id`. Returns true if one existed.
    pub fn invalidate_hierarchy_cache(&self, account_id: &str) -> Result<bool> {
        let wt = self.db.begin_write()?;
        let removed = {
            let mut hierarchy = wt.open_table(HIERARCHY)?;
            let removed = hierarchy.remove(account_id)?.is_some();
            removed
        };
        wt.commit()?;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Legacy migration
    // -----------------------------------------------------------------------

    /// Synthesize an account from the single-account legacy keys.
    ///
    /// Only runs when no structured account exists yet. On success the
    /// account is stored, made active and the legacy keys are removed in the
    /// same transaction. A malformed legacy payload is logged and left in
    /// place.
    pub fn migrate_legacy_if_needed(&self) -> Result<Option<Account>> {
        let wt = self.db.begin_write()?;
        let migrated = {
            let mut accounts = wt.open_table(ACCOUNTS)?;
            if accounts.iter()?.next().is_some() {
                None
            } else {
                let mut legacy = wt.open_table(LEGACY)?;
                let user_info = legacy.get(LEGACY_USER_INFO)?.map(|g| g.value().to_vec());
                let environments = legacy
                    .get(LEGACY_ENVIRONMENTS)?
                    .map(|g| g.value().to_vec());
                match user_info {
                    None => None,
                    Some(raw) => {
                        match migrations::account_from_legacy(&raw, environments.as_deref()) {
                            Ok(account) => {
                                let bytes = encode(&account)?;
                                accounts.insert(account.account_id.as_str(), bytes.as_slice())?;
                                let mut meta = wt.open_table(META)?;
                                meta.insert(
                                    ACTIVE_ACCOUNT_KEY,
                                    account.account_id.as_bytes(),
                                )?;
                                legacy.remove(LEGACY_USER_INFO)?;
                                legacy.remove(LEGACY_ENVIRONMENTS)?;
                                Some(account)
                            }
                            Err(e) => {
                                warn!(error = %e, "legacy account state is unreadable; skipping migration");
                                None
                            }
                        }
                    }
                }
            }
        };
        wt.commit()?;
        Ok(migrated)
    }

    #[cfg(test)]
    fn put_legacy(&self, key: &str, value: &[u8]) -> Result<()> {
        let wt = self.db.begin_write()?;
        {
            let mut legacy = wt.open_table(LEGACY)?;
            legacy.insert(key, value)?;
        }
        wt.commit()?;
        Ok(())
    }
}

fn collect_keys<T: ReadableTable<&'static str, &'static [u8]>>(table: &T) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for entry in table.iter()? {
        let (k, _) = entry?;
        keys.push(k.value().to_string());
    }
    Ok(keys)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BusinessGroup, Environment};
    use chrono::Duration as CDur;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, AccountStore) {
        let dir = TempDir::new().unwrap();
        let store = AccountStore::open(&dir.path().join("store.redb")).unwrap();
        (dir, store)
    }

    fn seed(store: &AccountStore, id: &str, org: &str) -> Account {
        store
            .upsert_account(AccountUpdate::new(id).organization_id(org))
            .unwrap()
    }

    #[test]
    fn empty_store_has_no_active_account() {
        let (_dir, store) = open_tmp();
        assert!(store.active_account().unwrap().is_none());
        assert!(store.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn upsert_merges_partial_updates() {
        let (_dir, store) = open_tmp();
        store
            .upsert_account(
                AccountUpdate::new("alice")
                    .organization_id("root-1")
                    .environments(vec![Environment::new("e1", "Prod")]),
            )
            .unwrap();
        let merged = store
            .upsert_account(
                AccountUpdate::new("alice")
                    .business_group(Some(BusinessGroup::new("bg-1", "Sales"))),
            )
            .unwrap();
        assert_eq!(merged.environments, vec![Environment::new("e1", "Prod")]);
        assert_eq!(merged.organization_id, "root-1");
        let stored = store.account("alice").unwrap().unwrap();
        assert_eq!(stored, merged);
    }

    #[test]
    fn full_account_replaces_fields() {
        let (_dir, store) = open_tmp();
        let mut a = seed(&store, "alice", "root-1");
        store
            .upsert_account(AccountUpdate::new("alice").environments(vec![Environment::new(
                "e1", "Prod",
            )]))
            .unwrap();
        a.environments.clear();
        a.display_name = Some("Alice".into());
        let stored = store.upsert_account(a.into()).unwrap();
        assert!(stored.environments.is_empty());
        assert_eq!(stored.display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn insert_without_org_is_rejected() {
        let (_dir, store) = open_tmp();
        let err = store.upsert_account(AccountUpdate::new("alice")).unwrap_err();
        assert!(matches!(err, ScopeError::InvalidAccount(_)));
    }

    #[test]
    fn set_active_requires_existing_account() {
        let (_dir, store) = open_tmp();
        let err = store.set_active_account("ghost").unwrap_err();
        assert!(matches!(err, ScopeError::AccountNotFound(ref id) if id == "ghost"));

        seed(&store, "alice", "root-1");
        store.set_active_account("alice").unwrap();
        assert_eq!(
            store.active_account().unwrap().unwrap().account_id,
            "alice"
        );
    }

    #[test]
    fn delete_all_clears_everything() {
        let (_dir, store) = open_tmp();
        seed(&store, "alice", "root-1");
        seed(&store, "bob", "root-2");
        store.set_active_account("bob").unwrap();
        store
            .set_hierarchy_cache("bob", &OrgTree::new("root-2", "Bob Co"), Utc::now())
            .unwrap();

        assert_eq!(store.delete_all_accounts().unwrap(), 2);
        assert!(store.active_account().unwrap().is_none());
        assert!(store.active_account_id().unwrap().is_none());
        assert!(store.list_accounts().unwrap().is_empty());
        assert!(store.hierarchy_cache("bob").unwrap().is_none());
    }

    #[test]
    fn delete_account_clears_pointer_only_when_active() {
        let (_dir, store) = open_tmp();
        seed(&store, "alice", "root-1");
        seed(&store, "bob", "root-2");
        store.set_active_account("alice").unwrap();

        assert!(store.delete_account("bob").unwrap());
        assert_eq!(store.active_account_id().unwrap().as_deref(), Some("alice"));

        assert!(store.delete_account("alice").unwrap());
        assert!(store.active_account_id().unwrap().is_none());
        assert!(!store.delete_account("alice").unwrap());
    }

    #[test]
    fn hierarchy_cache_stamps_account() {
        let (_dir, store) = open_tmp();
        seed(&store, "alice", "root-1");
        let at = Utc::now() - CDur::minutes(3);
        let tree = OrgTree::new("root-1", "Acme").with_child(OrgTree::new("bg-1", "Sales"));
        store.set_hierarchy_cache("alice", &tree, at).unwrap();

        let entry = store.hierarchy_cache("alice").unwrap().unwrap();
        assert_eq!(entry.tree, tree);
        assert_eq!(entry.fetched_at, at);
        assert_eq!(
            store.account("alice").unwrap().unwrap().last_hierarchy_fetch,
            Some(at)
        );

        assert!(store.invalidate_hierarchy_cache("alice").unwrap());
        assert!(store.hierarchy_cache("alice").unwrap().is_none());
        assert!(!store.invalidate_hierarchy_cache("alice").unwrap());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        {
            let store = AccountStore::open(&path).unwrap();
            seed(&store, "alice", "root-1");
            store.set_active_account("alice").unwrap();
        }
        let store = AccountStore::open(&path).unwrap();
        assert_eq!(
            store.active_account().unwrap().unwrap().organization_id,
            "root-1"
        );
    }

    #[test]
    fn legacy_keys_become_active_account() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        {
            let store = AccountStore::open(&path).unwrap();
            store
                .put_legacy(
                    LEGACY_USER_INFO,
                    br#"{"user":{"id":"u-1","username":"alice","organization":{"id":"root-1","name":"Acme"}}}"#,
                )
                .unwrap();
            store
                .put_legacy(LEGACY_ENVIRONMENTS, br#"{"data":[{"id":"e1","name":"Prod"}]}"#)
                .unwrap();
        }

        let store = AccountStore::open(&path).unwrap();
        let active = store.active_account().unwrap().unwrap();
        assert_eq!(active.account_id, "u-1");
        assert_eq!(active.organization_id, "root-1");
        assert!(active.business_group.is_none());
        assert_eq!(active.environments, vec![Environment::new("e1", "Prod")]);

        // One-time: legacy keys are gone, a second pass is a no-op.
        assert!(store.migrate_legacy_if_needed().unwrap().is_none());
    }

    #[test]
    fn legacy_migration_skipped_when_accounts_exist() {
        let (_dir, store) = open_tmp();
        seed(&store, "alice", "root-1");
        store
            .put_legacy(
                LEGACY_USER_INFO,
                br#"{"user":{"id":"u-1","organization":{"id":"root-9"}}}"#,
            )
            .unwrap();
        assert!(store.migrate_legacy_if_needed().unwrap().is_none());
        assert!(store.account("u-1").unwrap().is_none());
    }

    #[test]
    fn malformed_legacy_is_not_an_error() {
        let (_dir, store) = open_tmp();
        store.put_legacy(LEGACY_USER_INFO, b"not json").unwrap();
        assert!(store.migrate_legacy_if_needed().unwrap().is_none());
        assert!(store.active_account().unwrap().is_none());
    }
}
