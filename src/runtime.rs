//! The aggregate runtime: load an aggregate by replaying its stream, and
//! atomically save the events staged by domain methods.
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::aggregate::{Aggregate, AggregateState};
use crate::delay::RetryDelay;
use crate::error::Error;
use crate::event::{AggregateId, Event};
use crate::store::EventStoreBackend;

/// Tuning for [`AggregateRuntime::execute`]'s retry loop: the `execute`-style
/// single-aggregate command path named in the configuration design (§2.2,
/// §2.4), sharing its `RetryDelay` schedule with
/// [`crate::process::ProcessApplication`]'s run loop but scoped to one
/// aggregate rather than one upstream notification.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
    max_retries: u32,
    retry_delay: RetryDelay,
    deadline: Duration,
}

impl ExecuteConfig {
    pub fn new(max_retries: u32, retry_delay: RetryDelay, deadline: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            deadline,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> RetryDelay {
        self.retry_delay
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay: RetryDelay::default(),
            deadline: Duration::from_secs(5),
        }
    }
}

/// Loads and saves aggregates against a single [`EventStoreBackend`].
///
/// `get`/`save` are the two operations described for the runtime: replay
/// events into state, and submit whatever a domain method staged as one
/// atomic batch.
pub struct AggregateRuntime {
    store: Arc<dyn EventStoreBackend>,
}

impl AggregateRuntime {
    pub fn new(store: Arc<dyn EventStoreBackend>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EventStoreBackend> {
        &self.store
    }

    /// Loads an aggregate's events and folds them into its state. An id with
    /// no events yields a fresh, empty aggregate — the caller decides
    /// whether that counts as "not found" for its own stream kind.
    pub async fn get<S, E>(&self, id: AggregateId) -> Result<Aggregate<S, E>, Error>
    where
        S: AggregateState<E>,
        E: Event,
    {
        let raw = self.store.load(id).await?;
        let events = raw
            .iter()
            .map(|event| event.decode::<E>())
            .collect::<Result<Vec<E>, Error>>()?;
        Ok(Aggregate::replay(id, events))
    }

    /// Commits whatever events `aggregate` has staged since it was loaded or
    /// created, as a single atomic batch. Makes one attempt only — a caller
    /// whose aggregate is new (a freshly generated id) or whose retry already
    /// happens one level up (a `ProcessApplication`'s run loop) wants exactly
    /// this; a caller mutating an existing, possibly-contended aggregate
    /// directly should use [`AggregateRuntime::execute`] instead.
    pub async fn save<S, E>(&self, aggregate: &mut Aggregate<S, E>) -> Result<(), Error>
    where
        S: AggregateState<E>,
        E: Event,
    {
        if !aggregate.has_pending() {
            return Ok(());
        }
        let events = aggregate.drain_pending()?;
        self.store.commit(events, None).await?;
        Ok(())
    }

    /// Loads `id` fresh, applies `mutate`, and commits the result, retrying
    /// with backoff on [`Error::ConcurrencyConflict`] up to `config`'s bound
    /// — the execute-style single-aggregate command path (§2.2), mirroring
    /// `mneme`'s `execute()`: each attempt re-reads the stream and re-applies
    /// the caller's intent against current state, rather than blindly
    /// resubmitting a stale mutation.
    ///
    /// `mutate` should check its own preconditions against the freshly loaded
    /// aggregate and return `Err` to reject the call outright — a rejection
    /// is never retried, only a concurrency conflict is.
    pub async fn execute<S, E, F>(
        &self,
        id: AggregateId,
        config: &ExecuteConfig,
        mut mutate: F,
    ) -> Result<Aggregate<S, E>, Error>
    where
        S: AggregateState<E>,
        E: Event,
        F: FnMut(&mut Aggregate<S, E>) -> Result<(), Error>,
    {
        let mut retries = 0;
        loop {
            let mut aggregate: Aggregate<S, E> = self.get(id).await?;
            mutate(&mut aggregate)?;

            if !aggregate.has_pending() {
                return Ok(aggregate);
            }
            let events = aggregate.drain_pending()?;

            match tokio::time::timeout(config.deadline(), self.store.commit(events, None)).await {
                Ok(Ok(_)) => return Ok(aggregate),
                Ok(Err(Error::ConcurrencyConflict { stream, .. })) => {
                    if retries >= config.max_retries() {
                        return Err(Error::MaxRetriesExceeded {
                            stream: stream.to_string(),
                            max_retries: config.max_retries(),
                        });
                    }
                    let delay = config.retry_delay().calculate_delay(retries);
                    warn!(%stream, retries, "concurrency conflict executing against aggregate; retrying");
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Ok(Err(other)) => return Err(other),
                Err(_elapsed) => {
                    if retries >= config.max_retries() {
                        return Err(Error::DeadlineExceeded {
                            stream: id.to_string(),
                            deadline_ms: config.deadline().as_millis() as u64,
                        });
                    }
                    warn!(%id, retries, "commit attempt exceeded deadline; retrying");
                    retries += 1;
                }
            }
        }
    }
}
