//! The process-application runtime.
//!
//! A [`ProcessApplication`] is a named consumer+producer: it tracks, per
//! upstream application, the last notification position it has processed,
//! and for each new upstream event it runs a [`Policy`] that may stage new
//! events in the process application's own aggregate store. The staged
//! events and the advanced tracking cursor are committed together in one
//! atomic unit (§4.3), giving exactly-once effect even under crashes and
//! retries (§4.3.2, §8).
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::delay::RetryDelay;
use crate::error::Error;
use crate::event::RawEvent;
use crate::runtime::{AggregateRuntime, ExecuteConfig};
use crate::store::{EventStoreBackend, TrackingUpdate};

/// Tuning for a process application's run loop: how many times to retry a
/// concurrency conflict before giving up, the backoff schedule between
/// attempts, how many notifications to read per page, and the deadline
/// given to each individual commit attempt (§5.5).
#[derive(Debug, Clone)]
pub struct RunConfig {
    max_retries: u32,
    retry_delay: RetryDelay,
    page_size: usize,
    deadline: Duration,
}

impl RunConfig {
    pub fn new(max_retries: u32, retry_delay: RetryDelay, page_size: usize, deadline: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            page_size,
            deadline,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> RetryDelay {
        self.retry_delay
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Builds a `RunConfig` from the environment, in the same spirit as
    /// `PostgresSettings::from_env` — every field has a sane default, so this
    /// never fails.
    ///
    /// Expected variables:
    /// - `LEDGERSAGA_MAX_RETRIES` (default: 10)
    /// - `LEDGERSAGA_RETRY_BASE_MS` / `LEDGERSAGA_RETRY_MAX_MS` (default: 100 / 30000)
    /// - `LEDGERSAGA_PAGE_SIZE` (default: 100)
    /// - `LEDGERSAGA_COMMIT_DEADLINE_MS` (default: 5000)
    pub fn from_env() -> Self {
        let env_u64 = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok());
        let max_retries = std::env::var("LEDGERSAGA_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let base_delay_ms = env_u64("LEDGERSAGA_RETRY_BASE_MS").unwrap_or(100);
        let max_delay_ms = env_u64("LEDGERSAGA_RETRY_MAX_MS").unwrap_or(30_000);
        let page_size = std::env::var("LEDGERSAGA_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let deadline_ms = env_u64("LEDGERSAGA_COMMIT_DEADLINE_MS").unwrap_or(5_000);

        Self {
            max_retries,
            retry_delay: RetryDelay::new(base_delay_ms, max_delay_ms),
            page_size,
            deadline: Duration::from_millis(deadline_ms),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay: RetryDelay::default(),
            page_size: 100,
            deadline: Duration::from_secs(5),
        }
    }
}

/// A read-only handle to one upstream application's store, named for the
/// tracking cursor a downstream application keeps against it.
#[derive(Clone)]
pub struct Upstream {
    pub name: String,
    pub store: Arc<dyn EventStoreBackend>,
}

impl Upstream {
    pub fn new(name: impl Into<String>, store: Arc<dyn EventStoreBackend>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

/// A process application's reaction to a single upstream event.
///
/// Implementations load whatever aggregates they need through `runtime`,
/// invoke domain methods on them (staging events), and return every staged
/// event for the run loop to commit atomically alongside the tracking
/// cursor advance. A `Policy` must be deterministic: replaying the same
/// event against the same pre-state must stage identical events (§4.3.1).
///
/// Domain errors (`TransactionError` and friends) are not propagated through
/// this trait's `Err` — implementations catch them internally and stage an
/// `ErrorRecorded` event instead (§4.3.3, §4.5). An `Err` returned here is
/// treated as a non-domain failure and halts the process application.
#[async_trait::async_trait]
pub trait Policy: Send + Sync {
    async fn handle(
        &self,
        runtime: &AggregateRuntime,
        event: &RawEvent,
    ) -> Result<Vec<RawEvent>, Error>;
}

/// A named consumer+producer node with its own event store and tracking
/// cursors.
pub struct ProcessApplication {
    pub name: String,
    store: Arc<dyn EventStoreBackend>,
    config: RunConfig,
}

impl ProcessApplication {
    pub fn new(name: impl Into<String>, store: Arc<dyn EventStoreBackend>, config: RunConfig) -> Self {
        Self {
            name: name.into(),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStoreBackend> {
        &self.store
    }

    pub fn runtime(&self) -> AggregateRuntime {
        AggregateRuntime::new(self.store.clone())
    }

    /// Derives an [`ExecuteConfig`] from this application's own `RunConfig`,
    /// so a direct client operation (`domain::accounts_app::client::*`) gets
    /// the same retry/deadline schedule the run loop uses, without the two
    /// config types being merged into one (§2.2).
    pub fn execute_config(&self) -> ExecuteConfig {
        ExecuteConfig::new(
            self.config.max_retries(),
            self.config.retry_delay(),
            self.config.deadline(),
        )
    }

    /// Drains every notification currently available from `upstream` that
    /// this application has not yet processed, running `policy` on each in
    /// order. Returns the number of events processed.
    pub async fn drain_upstream(
        &self,
        upstream: &Upstream,
        policy: &dyn Policy,
    ) -> Result<usize, Error> {
        let mut processed = 0;
        loop {
            let from = self.store.tracking(&upstream.name).await?;
            let page = upstream
                .store
                .notifications(from, self.config.page_size)
                .await?;
            if page.is_empty() {
                return Ok(processed);
            }
            for event in &page {
                self.process_one(upstream, policy, event).await?;
                processed += 1;
            }
        }
    }

    /// Processes a single upstream event through `policy`, retrying the
    /// whole step (a fresh working set each time) on concurrency conflict,
    /// up to this application's configured maximum.
    async fn process_one(
        &self,
        upstream: &Upstream,
        policy: &dyn Policy,
        event: &RawEvent,
    ) -> Result<(), Error> {
        let position = event
            .position
            .expect("events read from a notification log always carry a position");

        let mut retries = 0;
        loop {
            let runtime = self.runtime(); // fresh working set for this attempt
            let staged = policy.handle(&runtime, event).await.map_err(|err| {
                error!(application = %self.name, %err, "policy halted process application");
                err
            })?;

            let tracking = TrackingUpdate::new(upstream.name.clone(), position);
            let commit = tokio::time::timeout(
                self.config.deadline,
                self.store.commit(staged, Some(tracking)),
            )
            .await;
            match commit {
                Ok(Ok(_)) => {
                    info!(
                        application = %self.name,
                        upstream = %upstream.name,
                        position,
                        "advanced tracking cursor"
                    );
                    return Ok(());
                }
                Ok(Err(Error::ConcurrencyConflict { stream, .. })) => {
                    if retries >= self.config.max_retries {
                        return Err(Error::MaxRetriesExceeded {
                            stream: stream.to_string(),
                            max_retries: self.config.max_retries,
                        });
                    }
                    let delay = self.config.retry_delay.calculate_delay(retries);
                    tokio::time::sleep(delay).await;
                    retries += 1;
                    continue;
                }
                Ok(Err(other)) => return Err(other),
                Err(_elapsed) => {
                    if retries >= self.config.max_retries {
                        return Err(Error::DeadlineExceeded {
                            stream: upstream.name.clone(),
                            deadline_ms: self.config.deadline.as_millis() as u64,
                        });
                    }
                    warn!(
                        application = %self.name,
                        upstream = %upstream.name,
                        position,
                        retries,
                        "commit attempt exceeded deadline; retrying"
                    );
                    retries += 1;
                }
            }
        }
    }
}
