use crate::app::{App, GlobalOpts};
use crate::output::{or_dash, print_json, print_table};

pub async fn run(opts: &GlobalOpts, refresh: bool) -> anyhow::Result<()> {
    let app = App::open(opts)?;
    let account = app.active_account()?;

    let environments = if refresh {
        app.resolver
            .refresh_environments(&account.account_id)
            .await?
    } else {
        account.environments.clone()
    };

    if opts.json {
        let value = serde_json::json!({
            "organization_id": account.effective_organization_id(),
            "environments": environments,
        });
        return print_json(&value);
    }

    let kind = if account.is_group_scoped() {
        "Business group"
    } else {
        "Organization"
    };
    println!(
        "{kind}: {} ({})",
        account.scope_label(),
        account.effective_organization_id()
    );
    if environments.is_empty() {
        println!("No environments.");
        return Ok(());
    }
    let rows = environments
        .iter()
        .map(|e| {
            vec![
                e.id.clone(),
                e.name.clone(),
                or_dash(e.kind.as_deref()),
                if e.is_production() { "yes" } else { "" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "TYPE", "PROD"], rows);
    Ok(())
}
