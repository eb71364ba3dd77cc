use crate::error::{Result, ScopeError};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const HOME_DIR: &str = ".orgscope";
pub const HOME_ENV: &str = "ORGSCOPE_HOME";

pub const CONFIG_FILE: &str = "config.yaml";
pub const STORE_FILE: &str = "store.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve the data directory.
///
/// Priority:
/// 1. `explicit` (the `--home` flag)
/// 2. `ORGSCOPE_HOME` env var
/// 3. `~/.orgscope`
pub fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    home::home_dir()
        .map(|h| h.join(HOME_DIR))
        .ok_or(ScopeError::HomeNotFound)
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

pub fn store_path(home: &Path) -> PathBuf {
    home.join(STORE_FILE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
