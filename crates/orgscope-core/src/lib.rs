//! `orgscope-core`: account state and business-group scope resolution.
//!
//! ```text
//! AccountStore   ← redb tables: accounts, meta, hierarchy, legacy
//!     │
//!     ▼
//! ScopeContext   ← store handle + session epoch + broadcast<ScopeEvent>
//!     │
//!     ▼
//! ScopeResolver  ← effective org id, select/clear group, hierarchy cache
//!     │
//!     ▼
//! OrganizationApi (trait; HTTP implementation lives in orgscope-client)
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod io;
pub mod migrations;
pub mod paths;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod types;

pub use api::OrganizationApi;
pub use context::ScopeContext;
pub use error::{Result, ScopeError};
pub use events::ScopeEvent;
pub use resolver::{CachedHierarchy, Reconciliation, ScopeResolver, SignIn};
pub use store::AccountStore;
pub use types::{Account, AccountUpdate, BusinessGroup, Environment, OrgTree};
