use crate::app::GlobalOpts;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use orgscope_core::config::{ScopeConfig, WarnLevel};
use orgscope_core::paths;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Write a default config.yaml if none exists
    Init,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(opts: &GlobalOpts, subcmd: ConfigSubcommand) -> anyhow::Result<()> {
    let home = paths::resolve_home(opts.home.as_deref())?;
    match subcmd {
        ConfigSubcommand::Show => {
            let config = ScopeConfig::load(&home).context("failed to load config")?;
            if opts.json {
                print_json(&config)?;
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
            }
            Ok(())
        }
        ConfigSubcommand::Init => {
            let created = ScopeConfig::init(&home)?;
            let path = paths::config_path(&home);
            if created {
                println!("Wrote {}", path.display());
            } else {
                println!("{} already exists", path.display());
            }
            Ok(())
        }
        ConfigSubcommand::Validate => validate(&home, opts.json),
    }
}

fn validate(home: &std::path::Path, json: bool) -> anyhow::Result<()> {
    let config = ScopeConfig::load(home).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
