use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::contracts::{
    ConfigError, CounterRows, CounterTransaction, SequenceCounter, SequenceError,
    SequenceGenerator, SequenceStore, StorageError,
};
use crate::metrics::GeneratorMetrics;
use crate::storage::config::GeneratorConfig;
use crate::storage::retry::retry_on_conflict;

/// Insert attempts when lazily creating a counter: the first try plus one
/// retry after a concurrent creation that left no readable row.
const CREATE_ATTEMPTS: usize = 2;

/// Sequence generator backed by a [`SequenceStore`].
///
/// Each call runs read-or-create, increment, persist as one unit:
///
/// - If the store supports transactions, the unit runs inside a
///   transaction at the store's strongest isolation level and is restarted
///   by the retry policy on isolation conflicts.
/// - Otherwise the same steps run directly against the store. This mode
///   has no atomicity between the read and the write and is only meant for
///   single-caller or test use.
///
/// There is no in-process lock: concurrent callers are serialized by the
/// store alone.
pub struct StoreSequenceGenerator<S: SequenceStore> {
    store: Arc<S>,
    config: GeneratorConfig,
    metrics: Option<Arc<GeneratorMetrics>>,
    degraded_warned: AtomicBool,
}

/// Point in time after which an attempt must not commit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub(crate) fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn check(deadline: Option<Deadline>) -> Result<(), SequenceError> {
        match deadline {
            Some(d) if Instant::now() >= d.at => Err(SequenceError::Timeout(d.budget)),
            _ => Ok(()),
        }
    }
}

impl<S: SequenceStore> StoreSequenceGenerator<S> {
    pub fn new(store: Arc<S>, config: GeneratorConfig) -> Self {
        Self {
            store,
            config,
            metrics: None,
            degraded_warned: AtomicBool::new(false),
        }
    }

    /// Like [`new`](Self::new), but rejects invalid templates instead of
    /// clamping them when a counter is created.
    pub fn try_new(store: Arc<S>, config: GeneratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(store, config))
    }

    /// Creates a generator with default configuration.
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, GeneratorConfig::default())
    }

    pub fn with_metrics(mut self, metrics: Arc<GeneratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Like [`SequenceGenerator::next`], but bounded by `budget` when it is
    /// tighter than the configured timeout.
    pub fn next_within(&self, name: &str, budget: Duration) -> Result<String, SequenceError> {
        let budget = match self.config.operation_timeout {
            Some(configured) => configured.min(budget),
            None => budget,
        };
        self.issue(name, Some(Deadline::after(budget)))
    }

    /// Like [`SequenceGenerator::next`], but bounded by an absolute
    /// deadline instead of the configured timeout. Past `deadline` the
    /// attempt is rolled back and [`SequenceError::Timeout`] is returned.
    pub fn next_until(&self, name: &str, deadline: Instant) -> Result<String, SequenceError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        self.issue(name, Some(Deadline { at: deadline, budget }))
    }

    pub(crate) fn next_by(&self, name: &str, deadline: Deadline) -> Result<String, SequenceError> {
        self.issue(name, Some(deadline))
    }

    #[tracing::instrument(level = "debug", skip(self, deadline))]
    fn issue(&self, name: &str, deadline: Option<Deadline>) -> Result<String, SequenceError> {
        validate_name(name)?;

        let started = Instant::now();
        let transactional = self.store.capabilities().supports_transactions;
        let mut attempts: u64 = 0;

        let result = retry_on_conflict(&self.config.retry, name, || {
            attempts += 1;
            Deadline::check(deadline)?;
            if transactional {
                self.next_in_transaction(name, deadline)
            } else {
                self.next_direct(name)
            }
        });

        if let Some(metrics) = &self.metrics {
            metrics.record_isolation_retries(attempts.saturating_sub(1));
            match &result {
                Ok(_) => metrics.record_issued(name, started.elapsed().as_micros() as u64),
                Err(_) => metrics.record_failure(),
            }
        }

        let counter = result?;
        tracing::debug!(
            sequence = %name,
            value = counter.current_value,
            attempts,
            "Issued sequence number"
        );
        Ok(counter.format())
    }

    /// Mode A: one transaction per attempt.
    fn next_in_transaction(
        &self,
        name: &str,
        deadline: Option<Deadline>,
    ) -> Result<SequenceCounter, SequenceError> {
        let tx = self.store.begin().map_err(|e| classify(name, e))?;

        let outcome = self
            .advance(&tx, name)
            .and_then(|counter| Deadline::check(deadline).map(|()| counter));

        match outcome {
            Ok(counter) => {
                tx.commit().map_err(|e| classify(name, e))?;
                Ok(counter)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(
                        sequence = %name,
                        error = %rollback_err,
                        "Rollback after failed increment also failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Mode B: no surrounding transaction.
    fn next_direct(&self, name: &str) -> Result<SequenceCounter, SequenceError> {
        if !self.degraded_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "Sequence store has no transaction support; increments are not atomic \
                 and must not be used by concurrent callers"
            );
        }
        self.advance(self.store.as_ref(), name)
    }

    /// Read-or-create, increment, persist.
    fn advance<R>(&self, rows: &R, name: &str) -> Result<SequenceCounter, SequenceError>
    where
        R: CounterRows + ?Sized,
    {
        let mut counter = self.read_or_create(rows, name)?;
        if counter.advance(Utc::now()).is_none() {
            return Err(SequenceError::Overflow(format!(
                "sequence {name} is at its maximum value"
            )));
        }
        rows.update(&counter).map_err(|e| classify(name, e))?;
        Ok(counter)
    }

    fn read_or_create<R>(&self, rows: &R, name: &str) -> Result<SequenceCounter, SequenceError>
    where
        R: CounterRows + ?Sized,
    {
        if let Some(existing) = rows.find(name).map_err(|e| classify(name, e))? {
            return Ok(existing);
        }

        let fresh = SequenceCounter::from_template(name, &self.config.template_for(name), Utc::now());

        for _ in 0..CREATE_ATTEMPTS {
            match rows.insert(&fresh) {
                Ok(()) => {
                    tracing::debug!(
                        sequence = %name,
                        prefix = %fresh.prefix,
                        pad_width = fresh.pad_width,
                        "Created sequence counter"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_created();
                    }
                    return Ok(fresh);
                }
                Err(StorageError::CreateConflict(_)) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_create_conflict();
                    }
                    tracing::debug!(sequence = %name, "Counter created concurrently, re-reading");
                    if let Some(existing) = rows.find(name).map_err(|e| classify(name, e))? {
                        return Ok(existing);
                    }
                }
                Err(e) => return Err(classify(name, e)),
            }
        }

        Err(SequenceError::Storage(StorageError::CreateConflict(
            name.to_string(),
        )))
    }
}

impl<S: SequenceStore> SequenceGenerator for StoreSequenceGenerator<S> {
    fn next(&self, name: &str) -> Result<String, SequenceError> {
        self.issue(name, self.config.operation_timeout.map(Deadline::after))
    }

    fn current(&self, name: &str) -> Result<Option<SequenceCounter>, SequenceError> {
        validate_name(name)?;
        self.store.find(name).map_err(|e| classify(name, e))
    }
}

fn validate_name(name: &str) -> Result<(), SequenceError> {
    if name.trim().is_empty() {
        return Err(SequenceError::InvalidArgument(format!(
            "sequence name must not be empty or whitespace: {name:?}"
        )));
    }
    Ok(())
}

/// Lifts storage-level isolation conflicts into the retryable error.
fn classify(name: &str, err: StorageError) -> SequenceError {
    match err {
        StorageError::IsolationConflict(message) => SequenceError::IsolationConflict {
            name: name.to_string(),
            message,
        },
        other => SequenceError::Storage(other),
    }
}
