use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::events::ScopeEvent;
use crate::store::AccountStore;

/// Explicit replacement for a process-global "active account".
///
/// Created once per host session and handed to the resolver. The session
/// epoch is bumped on every sign-in, account switch and sign-out; async work
/// that started under an older epoch discards its result.
pub struct ScopeContext {
    store: Arc<AccountStore>,
    epoch: AtomicU64,
    events: broadcast::Sender<ScopeEvent>,
}

impl ScopeContext {
    pub fn new(store: Arc<AccountStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            epoch: AtomicU64::new(0),
            events,
        }
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// Register an observer (status indicator, scoped panels).
    pub fn subscribe(&self) -> broadcast::Receiver<ScopeEvent> {
        self.events.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn publish(&self, event: ScopeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn epoch_bumps_and_events_reach_subscribers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(AccountStore::open(&dir.path().join("s.redb")).unwrap());
        let ctx = ScopeContext::new(store);
        let mut rx = ctx.subscribe();

        assert_eq!(ctx.epoch(), 0);
        assert_eq!(ctx.bump_epoch(), 1);
        ctx.publish(ScopeEvent::SignedOut);
        assert_eq!(rx.try_recv().unwrap(), ScopeEvent::SignedOut);
    }

    #[test]
    fn publish_without_subscribers_does_not_fail() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(AccountStore::open(&dir.path().join("s.redb")).unwrap());
        ScopeContext::new(store).publish(ScopeEvent::SignedOut);
    }
}
