use crate::app::{App, GlobalOpts};
use crate::output::{or_dash, print_json, print_table};
use clap::Subcommand;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum AccountsSubcommand {
    /// List stored accounts
    List,

    /// Make a stored account active
    Use {
        /// Account id
        account_id: String,
    },

    /// Forget one account
    Remove {
        /// Account id
        account_id: String,
    },

    /// Sign out of every account and delete all stored state
    Logout,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run(opts: &GlobalOpts, subcmd: AccountsSubcommand) -> anyhow::Result<()> {
    let app = App::open(opts)?;
    match subcmd {
        AccountsSubcommand::List => list(&app, opts.json),
        AccountsSubcommand::Use { account_id } => {
            let account = app.resolver.switch_account(&account_id)?;
            if opts.json {
                print_json(&account)?;
            } else {
                println!(
                    "Active account: {} (scope {})",
                    account.account_id,
                    account.scope_label()
                );
            }
            Ok(())
        }
        AccountsSubcommand::Remove { account_id } => {
            app.resolver.remove_account(&account_id)?;
            if opts.json {
                print_json(&serde_json::json!({ "removed": account_id }))?;
            } else {
                println!("Removed account {account_id}");
            }
            Ok(())
        }
        AccountsSubcommand::Logout => {
            let removed = app.resolver.sign_out()?;
            if opts.json {
                print_json(&serde_json::json!({ "removed": removed }))?;
            } else {
                println!("Signed out; removed {removed} account(s)");
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(app: &App, json: bool) -> anyhow::Result<()> {
    let store = app.resolver.context().store();
    let accounts = store.list_accounts()?;
    let active = store.active_account_id()?;

    if json {
        let scopes: serde_json::Map<String, serde_json::Value> = accounts
            .iter()
            .map(|a| {
                (
                    a.account_id.clone(),
                    app.resolver.effective_organization_id_for(&a.account_id).into(),
                )
            })
            .collect();
        let value = serde_json::json!({
            "active": active,
            "accounts": accounts,
            "scopes": scopes,
        });
        return print_json(&value);
    }

    if accounts.is_empty() {
        println!("No accounts stored in {}", app.home.display());
        return Ok(());
    }

    let rows = accounts
        .iter()
        .map(|a| {
            vec![
                if active.as_deref() == Some(a.account_id.as_str()) {
                    "*".to_string()
                } else {
                    String::new()
                },
                a.account_id.clone(),
                or_dash(a.display_name.as_deref()),
                a.organization_id.clone(),
                or_dash(a.business_group.as_ref().map(|bg| bg.name.as_str())),
                app.resolver.effective_organization_id_for(&a.account_id),
                a.environments.len().to_string(),
            ]
        })
        .collect();
    print_table(
        &["", "ACCOUNT", "NAME", "ORGANIZATION", "BUSINESS GROUP", "SCOPE", "ENVS"],
        rows,
    );
    Ok(())
}
