use crate::app::{App, GlobalOpts};
use crate::output::print_json;
use anyhow::Context;
use orgscope_core::SignIn;

pub struct LoginArgs {
    pub account_id: Option<String>,
    pub org_id: Option<String>,
    pub org_name: Option<String>,
    pub name: Option<String>,
}

pub async fn run(opts: &GlobalOpts, args: LoginArgs) -> anyhow::Result<()> {
    let app = App::open(opts)?;

    let mut sign_in = match (args.account_id, args.org_id) {
        (Some(account_id), Some(organization_id)) => SignIn {
            account_id,
            organization_id,
            ..Default::default()
        },
        _ => {
            if opts.token.is_none() {
                anyhow::bail!(
                    "no access token: set ORGSCOPE_TOKEN or pass --account-id and --org-id"
                );
            }
            app.client
                .fetch_me()
                .await
                .context("failed to read profile for the access token")?
        }
    };
    if args.org_name.is_some() {
        sign_in.organization_name = args.org_name;
    }
    if args.name.is_some() {
        sign_in.display_name = args.name;
    }

    let account = app.resolver.sign_in(sign_in).await?;

    if opts.json {
        print_json(&account)?;
    } else {
        println!(
            "Signed in as {} (organization {}, {} environment(s))",
            account
                .display_name
                .as_deref()
                .unwrap_or(&account.account_id),
            account.scope_label(),
            account.environments.len()
        );
    }
    Ok(())
}
