//! `orgscope-client`: HTTP implementation of the organization API.
//!
//! ```text
//! ScopeResolver ──▶ OrganizationApi (trait, orgscope-core)
//!                        ▲
//!                        │ impl
//!                   OrgApiClient ── reqwest ──▶ /accounts/api/...
//!                        │
//!                   TokenSource   ← bearer token + optional refresher
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use orgscope_client::{OrgApiClient, TokenSource};
//! use orgscope_core::config::ScopeConfig;
//!
//! let config = ScopeConfig::default();
//! let client = OrgApiClient::new(&config, TokenSource::new(Some(token)))?;
//! let me = client.fetch_me().await?;
//! ```

pub mod client;
pub mod error;
pub mod token;

pub use client::OrgApiClient;
pub use error::ClientError;
pub use token::TokenSource;
