use std::sync::Arc;
use std::time::Duration;

use tokio::task::spawn_blocking;

use crate::contracts::{SequenceCounter, SequenceError, SequenceGenerator, SequenceStore};
use crate::storage::sequence::{Deadline, StoreSequenceGenerator};

/// Async front for [`StoreSequenceGenerator`].
///
/// Store calls block, so each request runs on tokio's blocking pool. The
/// configured operation timeout becomes one deadline, fixed before the
/// task is spawned, that the generator checks before committing. The
/// task is always awaited to completion: `Ok` means the number was
/// committed, [`SequenceError::Timeout`] means the attempt was rolled back.
pub struct AsyncSequenceGenerator<S: SequenceStore + 'static> {
    inner: Arc<StoreSequenceGenerator<S>>,
}

impl<S: SequenceStore + 'static> Clone for AsyncSequenceGenerator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SequenceStore + 'static> AsyncSequenceGenerator<S> {
    pub fn new(inner: StoreSequenceGenerator<S>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn inner(&self) -> &StoreSequenceGenerator<S> {
        &self.inner
    }

    /// Issues the next number for `name`.
    pub async fn next(&self, name: &str) -> Result<String, SequenceError> {
        let deadline = self.inner.config().operation_timeout.map(Deadline::after);
        let generator = Arc::clone(&self.inner);
        let name = name.to_string();

        let result = spawn_blocking(move || match deadline {
            Some(deadline) => generator.next_by(&name, deadline),
            None => generator.next(&name),
        })
        .await
        .map_err(|e| SequenceError::Task(e.to_string()))?;

        if let Err(SequenceError::Timeout(budget)) = &result {
            tracing::warn!(budget_ms = budget.as_millis() as u64, "next() timed out");
        }
        result
    }

    /// Reads the stored counter for `name` without advancing it.
    pub async fn current(&self, name: &str) -> Result<Option<SequenceCounter>, SequenceError> {
        let generator = Arc::clone(&self.inner);
        let name = name.to_string();
        spawn_blocking(move || generator.current(&name))
            .await
            .map_err(|e| SequenceError::Task(e.to_string()))?
    }

    /// Budget of the deadline applied to each call, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.config().operation_timeout
    }
}
