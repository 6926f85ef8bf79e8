//! Test tooling for exercising the storage layer's concurrency behavior.
//!
//! Grounded on `examples/jwilger-mneme/tests/integration_tests.rs`'s
//! `TestEventStore`, which wraps the real backend and runs a hook before the
//! first append so a test can inject a concurrent write and observe the
//! resulting conflict-and-retry. Generalized here to `commit`, the single
//! operation every backend funnels writes through.
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::event::{AggregateId, RawEvent};
use crate::store::{EventStoreBackend, TrackingUpdate};

type HookFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;
type Hook = Box<dyn FnOnce() -> HookFuture + Send>;

/// Wraps an [`EventStoreBackend`] with a hook that runs once, immediately
/// before the first `commit` is delegated to the inner store — used to
/// simulate a concurrent writer racing the caller between its read and its
/// write, and assert that the caller's retry-with-backoff recovers.
pub struct TestEventStoreBackend {
    inner: Arc<dyn EventStoreBackend>,
    on_first_commit: Mutex<Option<Hook>>,
    has_committed: AtomicBool,
}

impl TestEventStoreBackend {
    pub fn new(inner: Arc<dyn EventStoreBackend>) -> Self {
        Self {
            inner,
            on_first_commit: Mutex::new(None),
            has_committed: AtomicBool::new(false),
        }
    }

    /// Registers a hook to run once, before the first `commit` this store
    /// sees is delegated to the inner backend.
    pub fn on_first_commit<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        *self
            .on_first_commit
            .lock()
            .expect("hook mutex poisoned") = Some(Box::new(move || Box::pin(hook())));
    }
}

#[async_trait::async_trait]
impl EventStoreBackend for TestEventStoreBackend {
    async fn load(&self, id: AggregateId) -> Result<Vec<RawEvent>, Error> {
        self.inner.load(id).await
    }

    async fn commit(
        &self,
        events: Vec<RawEvent>,
        tracking: Option<TrackingUpdate>,
    ) -> Result<Vec<RawEvent>, Error> {
        if !self.has_committed.swap(true, Ordering::SeqCst) {
            let hook = self
                .on_first_commit
                .lock()
                .expect("hook mutex poisoned")
                .take();
            if let Some(hook) = hook {
                hook().await?;
            }
        }
        self.inner.commit(events, tracking).await
    }

    async fn notifications(&self, from_position: u64, limit: usize) -> Result<Vec<RawEvent>, Error> {
        self.inner.notifications(from_position, limit).await
    }

    async fn tracking(&self, upstream: &str) -> Result<u64, Error> {
        self.inner.tracking(upstream).await
    }
}
