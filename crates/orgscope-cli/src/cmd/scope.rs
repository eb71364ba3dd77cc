use crate::app::{App, GlobalOpts};
use crate::output::print_json;
use clap::Subcommand;
use orgscope_core::Reconciliation;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ScopeSubcommand {
    /// Print the organization id outbound calls use
    Show {
        /// Value to print when no account is active
        #[arg(long)]
        fallback: Option<String>,
    },

    /// Scope the active account to a business group
    Select {
        /// Business group (sub-organization) id
        group_id: String,
        /// Display name (default: taken from the cached hierarchy)
        #[arg(long)]
        name: Option<String>,
    },

    /// Return the active account to its root organization
    Clear,

    /// Revert to root if the selected business group no longer exists
    Reconcile,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run(opts: &GlobalOpts, subcmd: ScopeSubcommand) -> anyhow::Result<()> {
    let app = App::open(opts)?;
    match subcmd {
        ScopeSubcommand::Show { fallback } => show(&app, fallback.as_deref(), opts.json),
        ScopeSubcommand::Select { group_id, name } => {
            select(&app, &group_id, name, opts.json).await
        }
        ScopeSubcommand::Clear => {
            let account = app.active_account()?;
            let updated = app
                .resolver
                .clear_business_group(&account.account_id)
                .await?;
            report_scope(&updated, opts.json)
        }
        ScopeSubcommand::Reconcile => reconcile(&app, opts.json).await,
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(app: &App, fallback: Option<&str>, json: bool) -> anyhow::Result<()> {
    let org_id = app.resolver.effective_organization_id(fallback);
    if json {
        let account = app.resolver.active_account()?;
        let value = serde_json::json!({
            "organization_id": org_id,
            "account_id": account.as_ref().map(|a| a.account_id.clone()),
            "business_group": account.and_then(|a| a.business_group),
        });
        return print_json(&value);
    }
    println!("{org_id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// select
// ---------------------------------------------------------------------------

async fn select(
    app: &App,
    group_id: &str,
    name: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let account = app.active_account()?;
    // Name lookup never goes to the network; the resolver falls back to the id.
    let name = match name {
        Some(n) => n,
        None => app
            .resolver
            .cached_hierarchy(&account.account_id)?
            .and_then(|cached| cached.tree.find(group_id).map(|node| node.name.clone()))
            .unwrap_or_default(),
    };
    let updated = app
        .resolver
        .select_business_group(&account.account_id, group_id, &name)
        .await?;
    report_scope(&updated, json)
}

fn report_scope(account: &orgscope_core::Account, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(account);
    }
    println!(
        "Scope: {} ({}), {} environment(s)",
        account.scope_label(),
        account.effective_organization_id(),
        account.environments.len()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

async fn reconcile(app: &App, json: bool) -> anyhow::Result<()> {
    let account = app.active_account()?;
    let outcome = app
        .resolver
        .reconcile_business_group(&account.account_id)
        .await?;
    if json {
        return print_json(&outcome);
    }
    match outcome {
        Reconciliation::RootScope => println!("No business group selected."),
        Reconciliation::Unchanged { group } => {
            println!("Business group {} ({}) is still valid.", group.name, group.id)
        }
        Reconciliation::Renamed { group } => {
            println!("Business group {} was renamed to {}.", group.id, group.name)
        }
        Reconciliation::Reverted { group } => println!(
            "Business group {} ({}) no longer exists; scope reverted to root.",
            group.name, group.id
        ),
    }
    Ok(())
}
