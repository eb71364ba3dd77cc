mod app;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{
    accounts::AccountsSubcommand, config::ConfigSubcommand, scope::ScopeSubcommand,
};
use orgscope_core::ScopeError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "orgscope",
    about = "Business-group scope for platform console accounts: sign in, pick a business group, inspect environments",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data directory (default: ~/.orgscope)
    #[arg(long, global = true, env = "ORGSCOPE_HOME")]
    home: Option<PathBuf>,

    /// Bearer token for the organization API
    #[arg(long, global = true, env = "ORGSCOPE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and make the account active
    Login {
        /// Account id (default: looked up from the token's profile)
        #[arg(long, requires = "org_id")]
        account_id: Option<String>,
        /// Root organization id
        #[arg(long, requires = "account_id")]
        org_id: Option<String>,
        /// Root organization display name
        #[arg(long)]
        org_name: Option<String>,
        /// Display name for the account
        #[arg(long)]
        name: Option<String>,
    },

    /// Manage stored accounts
    Accounts {
        #[command(subcommand)]
        subcommand: AccountsSubcommand,
    },

    /// Show or change the business-group scope of the active account
    Scope {
        #[command(subcommand)]
        subcommand: ScopeSubcommand,
    },

    /// List environments of the active scope
    Envs {
        /// Refetch from the organization API first
        #[arg(long)]
        refresh: bool,
    },

    /// Show the organization hierarchy of the active account
    Hierarchy {
        /// Bypass the hierarchy cache
        #[arg(long)]
        refresh: bool,
    },

    /// Inspect and initialize configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let opts = app::GlobalOpts {
        home: cli.home,
        token: cli.token,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Login {
            account_id,
            org_id,
            org_name,
            name,
        } => {
            cmd::login::run(
                &opts,
                cmd::login::LoginArgs {
                    account_id,
                    org_id,
                    org_name,
                    name,
                },
            )
            .await
        }
        Commands::Accounts { subcommand } => cmd::accounts::run(&opts, subcommand).await,
        Commands::Scope { subcommand } => cmd::scope::run(&opts, subcommand).await,
        Commands::Envs { refresh } => cmd::envs::run(&opts, refresh).await,
        Commands::Hierarchy { refresh } => cmd::hierarchy::run(&opts, refresh).await,
        Commands::Config { subcommand } => cmd::config::run(&opts, subcommand),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        if let Some(scope) = e.downcast_ref::<ScopeError>() {
            let hint = scope.user_message();
            if hint != scope.to_string() {
                eprintln!("hint: {hint}");
            }
        }
        std::process::exit(1);
    }
}
