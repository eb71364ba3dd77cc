use anyhow::Context;
use orgscope_client::{OrgApiClient, TokenSource};
use orgscope_core::config::ScopeConfig;
use orgscope_core::{paths, Account, AccountStore, ScopeContext, ScopeResolver};
use std::path::PathBuf;
use std::sync::Arc;

/// Flags shared by every subcommand.
pub struct GlobalOpts {
    pub home: Option<PathBuf>,
    pub token: Option<String>,
    pub json: bool,
}

/// Everything a command needs: config, store-backed resolver and the HTTP
/// client it drives.
pub struct App {
    pub home: PathBuf,
    pub client: Arc<OrgApiClient>,
    pub resolver: ScopeResolver<Arc<OrgApiClient>>,
}

impl App {
    pub fn open(opts: &GlobalOpts) -> anyhow::Result<Self> {
        let home = paths::resolve_home(opts.home.as_deref())?;
        let config = ScopeConfig::load(&home)
            .with_context(|| format!("failed to load config from {}", home.display()))?;
        let store = AccountStore::open_in(&home)
            .with_context(|| format!("failed to open account store in {}", home.display()))?;
        let client = Arc::new(OrgApiClient::new(
            &config,
            TokenSource::new(opts.token.clone()),
        )?);
        let ctx = Arc::new(ScopeContext::new(Arc::new(store)));
        let resolver = ScopeResolver::new(ctx, client.clone(), &config);
        Ok(Self {
            home,
            client,
            resolver,
        })
    }

    pub fn active_account(&self) -> anyhow::Result<Account> {
        self.resolver
            .active_account()?
            .ok_or_else(|| anyhow::anyhow!("no active account: run 'orgscope login'"))
    }
}
