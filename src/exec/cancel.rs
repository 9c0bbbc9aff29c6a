//! Cancellation of running statements from another task.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::driver::Canceller;

/// Caller-side handle. Cloned into the request; `cancel` may be called from
/// any task, before or during execution.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    canceller: Mutex<Option<Arc<dyn Canceller>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Mark the token cancelled and interrupt the attached statement, if any.
    pub async fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let canceller = self.inner.canceller.lock().clone();
        if let Some(canceller) = canceller {
            if let Err(e) = canceller.cancel().await {
                tracing::warn!(error = %e, "cancel request failed");
            }
        }
    }

    fn attach(&self, canceller: Arc<dyn Canceller>) {
        *self.inner.canceller.lock() = Some(canceller);
    }

    fn detach(&self) {
        self.inner.canceller.lock().take();
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Statements currently running, by statement id.
#[derive(Default)]
pub struct CancellationRegistry {
    next_id: AtomicU64,
    active: Mutex<HashMap<u64, Arc<dyn Canceller>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a statement until the returned registration is dropped.
    pub fn register(
        self: &Arc<Self>,
        canceller: Arc<dyn Canceller>,
        token: Option<&CancelToken>,
    ) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.active.lock().insert(id, canceller.clone());
        if let Some(token) = token {
            token.attach(canceller);
        }
        Registration {
            id,
            registry: Arc::clone(self),
            token: token.cloned(),
        }
    }

    /// Cancel the statement registered under `id`. Returns false when it is
    /// no longer running.
    pub async fn cancel(&self, id: u64) -> bool {
        let canceller = self.active.lock().get(&id).cloned();
        match canceller {
            Some(canceller) => {
                if let Err(e) = canceller.cancel().await {
                    tracing::warn!(statement = id, error = %e, "cancel request failed");
                }
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.active.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Removes its statement from the registry on drop.
pub struct Registration {
    id: u64,
    registry: Arc<CancellationRegistry>,
    token: Option<CancelToken>,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.active.lock().remove(&self.id);
        if let Some(token) = &self.token {
            token.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::error::DriverError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl Canceller for Counting {
        async fn cancel(&self) -> Result<(), DriverError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_registration_lifecycle() {
        let registry = Arc::new(CancellationRegistry::new());
        let canceller = Arc::new(Counting::default());
        let reg = registry.register(canceller.clone(), None);
        assert_eq!(registry.active(), vec![reg.id()]);

        assert!(registry.cancel(reg.id()).await);
        assert_eq!(canceller.0.load(Ordering::SeqCst), 1);

        let id = reg.id();
        drop(reg);
        assert!(registry.active().is_empty());
        assert!(!registry.cancel(id).await);
    }

    #[tokio::test]
    async fn test_token_reaches_attached_statement() {
        let registry = Arc::new(CancellationRegistry::new());
        let canceller = Arc::new(Counting::default());
        let token = CancelToken::new();
        let reg = registry.register(canceller.clone(), Some(&token));

        let remote = token.clone();
        tokio::spawn(async move { remote.cancel().await }).await.unwrap();
        assert!(token.is_cancelled());
        assert_eq!(canceller.0.load(Ordering::SeqCst), 1);

        drop(reg);
        token.cancel().await;
        assert_eq!(canceller.0.load(Ordering::SeqCst), 1);
    }
}
