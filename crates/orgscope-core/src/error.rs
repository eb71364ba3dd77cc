use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("business group not found: {0}")]
    BusinessGroupNotFound(String),

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("organization API error{}: {message}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("scope change for '{0}' was superseded by an account switch or sign-out")]
    Superseded(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("home directory not found: set HOME or ORGSCOPE_HOME")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl ScopeError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        ScopeError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Rate limits, server errors and transport failures (no status) are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScopeError::Upstream { status: None, .. } => true,
            ScopeError::Upstream {
                status: Some(s), ..
            } => *s == 429 || (500..600).contains(s),
            _ => false,
        }
    }

    /// Text suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            ScopeError::BusinessGroupNotFound(id) => format!(
                "Business group '{id}' was not found; the current scope is unchanged."
            ),
            ScopeError::AccountNotFound(id) => {
                format!("Account '{id}' is not signed in. Sign in again to continue.")
            }
            ScopeError::Permission(msg) => {
                format!("Access denied by the platform: {msg}. Check your role assignments.")
            }
            ScopeError::Upstream { status: Some(429), .. } => {
                "The platform is rate limiting requests. Try again in a moment.".to_string()
            }
            ScopeError::Upstream { .. } => {
                format!("Could not reach the organization API ({self}). Try again.")
            }
            ScopeError::Superseded(_) => {
                "The account changed while the request was in flight; nothing was applied."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

macro_rules! store_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ScopeError {
                fn from(e: $ty) -> Self {
                    ScopeError::Store(e.to_string())
                }
            }
        )*
    };
}

store_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

pub type Result<T> = std::result::Result<T, ScopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ScopeError::upstream(None, "connection reset").is_retryable());
        assert!(ScopeError::upstream(Some(429), "slow down").is_retryable());
        assert!(ScopeError::upstream(Some(503), "unavailable").is_retryable());
        assert!(!ScopeError::upstream(Some(400), "bad request").is_retryable());
        assert!(!ScopeError::Permission("nope".into()).is_retryable());
        assert!(!ScopeError::AccountNotFound("a".into()).is_retryable());
    }

    #[test]
    fn upstream_display_includes_status() {
        let e = ScopeError::upstream(Some(502), "bad gateway");
        assert_eq!(e.to_string(), "organization API error (502): bad gateway");
        let e = ScopeError::upstream(None, "timed out");
        assert_eq!(e.to_string(), "organization API error: timed out");
    }

    #[test]
    fn user_message_for_missing_group_says_scope_unchanged() {
        let msg = ScopeError::BusinessGroupNotFound("bg-1".into()).user_message();
        assert!(msg.contains("'bg-1' was not found"), "{msg}");
        assert!(msg.contains("scope is unchanged"), "{msg}");
        assert!(!msg.contains("reverting"), "{msg}");
    }
}
