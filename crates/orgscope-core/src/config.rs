use crate::error::Result;
use crate::paths;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://anypoint.mulesoft.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// ScopeConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub api: ApiConfig,
    /// Hierarchy cache freshness window.
    #[serde(default = "default_hierarchy_ttl_secs")]
    pub hierarchy_ttl_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_version() -> u32 {
    1
}

/// One year. Longer windows are accepted but flagged by `validate()`.
const MAX_HIERARCHY_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn default_hierarchy_ttl_secs() -> u64 {
    15 * 60
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            api: ApiConfig::default(),
            hierarchy_ttl_secs: default_hierarchy_ttl_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ScopeConfig {
    /// Values beyond what a `chrono::Duration` can hold saturate to the maximum.
    pub fn hierarchy_ttl(&self) -> chrono::Duration {
        i64::try_from(self.hierarchy_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Load `<home>/config.yaml`, falling back to defaults when absent.
    pub fn load(home: &Path) -> Result<Self> {
        let path = paths::config_path(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: ScopeConfig = serde_yaml::from_str(&data)?;
        crate::migrations::migrate_config(cfg)
    }

    pub fn save(&self, home: &Path) -> Result<()> {
        let path = paths::config_path(home);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Write the default config unless one already exists. Returns true if written.
    pub fn init(home: &Path) -> Result<bool> {
        let data = serde_yaml::to_string(&Self::default())?;
        crate::io::write_if_missing(&paths::config_path(home), data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if !(self.api.base_url.starts_with("https://") || self.api.base_url.starts_with("http://"))
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("api.base_url '{}' is not an http(s) URL", self.api.base_url),
            });
        } else if self.api.base_url.starts_with("http://") {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "api.base_url uses plain http; tokens will be sent unencrypted"
                    .to_string(),
            });
        }
        if self.api.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "api.timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.hierarchy_ttl_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "hierarchy_ttl_secs is 0: every hierarchy read hits the network"
                    .to_string(),
            });
        }
        if self.hierarchy_ttl_secs > MAX_HIERARCHY_TTL_SECS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "hierarchy_ttl_secs {} exceeds {MAX_HIERARCHY_TTL_SECS}; the cache never expires",
                    self.hierarchy_ttl_secs
                ),
            });
        }
        if self.retry.max_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "retry.max_attempts is 0; treated as a single attempt".to_string(),
            });
        }
        if self.retry.multiplier < 1.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "retry.multiplier below 1.0 shrinks delays between attempts"
                    .to_string(),
            });
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
