use crate::app::{App, GlobalOpts};
use crate::output::print_json;
use orgscope_core::OrgTree;

pub async fn run(opts: &GlobalOpts, refresh: bool) -> anyhow::Result<()> {
    let app = App::open(opts)?;
    let account = app.active_account()?;

    let (tree, stale) = match app
        .resolver
        .get_organization_hierarchy(&account.account_id, refresh)
        .await
    {
        Ok(tree) => (tree, false),
        Err(e) => match app.resolver.cached_hierarchy(&account.account_id)? {
            Some(cached) => {
                eprintln!(
                    "warning: {}; showing hierarchy cached at {}",
                    e.user_message(),
                    cached.fetched_at.format("%Y-%m-%d %H:%M UTC")
                );
                (cached.tree, true)
            }
            None => return Err(e.into()),
        },
    };

    if opts.json {
        let value = serde_json::json!({
            "stale": stale,
            "tree": tree,
        });
        return print_json(&value);
    }
    print_tree(&tree, account.effective_organization_id());
    Ok(())
}

fn print_tree(tree: &OrgTree, selected: &str) {
    for (depth, node) in tree.flatten() {
        let marker = if node.id == selected { "*" } else { " " };
        println!(
            "{marker} {}{} ({})",
            "  ".repeat(depth),
            node.name,
            node.id
        );
    }
}
