use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use orgscope_core::Result;
use tokio::sync::RwLock;

type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Bearer token holder with an optional refresher invoked on 401.
pub struct TokenSource {
    current: RwLock<Option<String>>,
    refresh: Option<RefreshFn>,
}

impl TokenSource {
    pub fn new(token: Option<String>) -> Self {
        Self {
            current: RwLock::new(token.filter(|t| !t.trim().is_empty())),
            refresh: None,
        }
    }

    /// Install a refresher, e.g. an OAuth refresh-token exchange.
    pub fn with_refresh<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.refresh = Some(Arc::new(move || f().boxed()));
        self
    }

    pub async fn current(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    /// Run the refresher and store its token. `Ok(None)` when no refresher
    /// is installed.
    pub async fn refresh(&self) -> Result<Option<String>> {
        let Some(refresh) = &self.refresh else {
            return Ok(None);
        };
        let token = refresh().await?;
        *self.current.write().await = Some(token.clone());
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn blank_token_is_absent() {
        assert_eq!(TokenSource::new(Some("  ".into())).current().await, None);
    }

    #[tokio::test]
    async fn refresh_replaces_current_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = TokenSource::new(Some("old".into())).with_refresh(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("new-{n}")) }
        });
        assert!(source.can_refresh());
        assert_eq!(source.refresh().await.unwrap(), Some("new-0".into()));
        assert_eq!(source.current().await, Some("new-0".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_without_refresher_is_noop() {
        let source = TokenSource::new(Some("t".into()));
        assert_eq!(source.refresh().await.unwrap(), None);
        assert_eq!(source.current().await, Some("t".into()));
    }
}
