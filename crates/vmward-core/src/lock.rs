//! In-process per-machine lock

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::error;

use crate::error::CoreError;
use crate::traits::MachineLocker;

/// Run `task` on its own task while `machine_id` is locked
///
/// The lock is released on every path. A panic in `task` comes back as
/// `ActorError` instead of leaving the machine locked.
///
/// # Errors
/// Whatever `task` returns, or `ActorError` if it panicked
pub async fn run_exclusive<T, Fut>(
    locker: &dyn MachineLocker,
    machine_id: &str,
    task: Fut,
) -> Result<T, CoreError>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
{
    locker.lock(machine_id).await;

    let result = match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) => {
            error!(machine = %machine_id, error = %e, "locked task aborted");
            Err(CoreError::ActorError(e.to_string()))
        }
    };

    locker.unlock(machine_id).await;
    result
}

/// Keyed lock; a held guard lives in the locker until `unlock`
#[derive(Default)]
pub struct KeyedLocker {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    held: Mutex<HashMap<String, OwnedMutexGuard<()>>>,
}

impl KeyedLocker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_locked(&self, machine_id: &str) -> bool {
        self.held.lock().contains_key(machine_id)
    }
}

#[async_trait]
impl MachineLocker for KeyedLocker {
    async fn lock(&self, machine_id: &str) {
        let mutex = self
            .locks
            .lock()
            .entry(machine_id.to_string())
            .or_default()
            .clone();

        let guard = mutex.lock_owned().await;
        self.held.lock().insert(machine_id.to_string(), guard);
    }

    async fn unlock(&self, machine_id: &str) {
        let guard = self.held.lock().remove(machine_id);
        drop(guard);

        let mut locks = self.locks.lock();
        if locks
            .get(machine_id)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(machine_id);
        }
    }
}
