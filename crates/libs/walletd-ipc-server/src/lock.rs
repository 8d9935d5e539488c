use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// The single lock serializing wallet operations.
///
/// Clones share one underlying mutex. The server and every connection
/// handler hold clones of the same instance; code outside the server that
/// touches wallet state directly should take it too.
#[derive(Clone, Debug, Default)]
pub struct MutationLock {
    inner: Arc<Mutex<()>>,
}

impl MutationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits at most `timeout`; `None` means the lock was not acquired.
    pub async fn acquire(&self, timeout: Duration) -> Option<OwnedMutexGuard<()>> {
        tokio::time::timeout(timeout, self.inner.clone().lock_owned()).await.ok()
    }

    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
