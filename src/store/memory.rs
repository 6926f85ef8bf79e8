//! In-memory storage backend, used by tests and the cooperative
//! single-thread dispatcher.
//!
//! A single [`std::sync::Mutex`] guards every piece of durable state this
//! store owns (per-stream event logs, the dense notification log, and the
//! tracking cursors). Locking all of it for the duration of a `commit` is
//! what gives the atomicity the concurrency model requires: a single-writer
//! queue over an in-memory map, per §5.1.
use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::Error;
use crate::event::{AggregateId, RawEvent};
use crate::store::TrackingUpdate;

#[derive(Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<RawEvent>>,
    notifications: Vec<RawEvent>,
    tracking: HashMap<String, u64>,
}

/// An in-memory [`super::EventStoreBackend`].
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl super::EventStoreBackend for InMemoryEventStore {
    async fn load(&self, id: AggregateId) -> Result<Vec<RawEvent>, Error> {
        let inner = self.inner.lock().expect("event store mutex poisoned");
        Ok(inner.streams.get(&id).cloned().unwrap_or_default())
    }

    async fn commit(
        &self,
        events: Vec<RawEvent>,
        tracking: Option<TrackingUpdate>,
    ) -> Result<Vec<RawEvent>, Error> {
        if events.is_empty() && tracking.is_none() {
            return Ok(events);
        }

        let mut inner = self.inner.lock().expect("event store mutex poisoned");

        // Validate every touched stream's first event in this batch lines up
        // with what the store currently holds, before mutating anything.
        let mut seen: HashMap<AggregateId, ()> = HashMap::new();
        for event in &events {
            if seen.insert(event.originator_id, ()).is_some() {
                continue; // only the first occurrence per stream is checked
            }
            let expected_next = inner
                .streams
                .get(&event.originator_id)
                .map(|s| s.len() as u64)
                .unwrap_or(0);
            if event.originator_version != expected_next {
                warn!(
                    stream = %event.originator_id,
                    expected = expected_next,
                    attempted = event.originator_version,
                    "concurrency conflict appending to stream"
                );
                return Err(Error::ConcurrencyConflict {
                    stream: event.originator_id,
                    expected: event.originator_version,
                    actual: if expected_next == 0 {
                        None
                    } else {
                        Some(expected_next - 1)
                    },
                });
            }
        }

        let mut committed = Vec::with_capacity(events.len());
        for mut event in events {
            let position = inner.notifications.len() as u64 + 1;
            event.position = Some(position);
            inner
                .streams
                .entry(event.originator_id)
                .or_default()
                .push(event.clone());
            inner.notifications.push(event.clone());
            committed.push(event);
        }

        if let Some(TrackingUpdate { upstream, position }) = tracking {
            let current = inner.tracking.get(&upstream).copied().unwrap_or(0);
            if position <= current {
                warn!(
                    upstream,
                    current, attempted = position, "tracking cursor did not advance"
                );
            }
            inner.tracking.insert(upstream, position);
        }

        debug!(committed = committed.len(), "committed events atomically");
        Ok(committed)
    }

    async fn notifications(&self, from_position: u64, limit: usize) -> Result<Vec<RawEvent>, Error> {
        let inner = self.inner.lock().expect("event store mutex poisoned");
        Ok(inner
            .notifications
            .iter()
            .filter(|e| e.position.is_some_and(|p| p > from_position))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn tracking(&self, upstream: &str) -> Result<u64, Error> {
        let inner = self.inner.lock().expect("event store mutex poisoned");
        Ok(inner.tracking.get(upstream).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventStoreBackend;
    use chrono::Utc;

    fn raw(id: AggregateId, version: u64) -> RawEvent {
        RawEvent {
            originator_id: id,
            originator_version: version,
            topic: "Test".to_string(),
            timestamp: Utc::now(),
            payload: serde_json::json!({}),
            position: None,
        }
    }

    #[tokio::test]
    async fn appends_and_loads_in_order() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.commit(vec![raw(id, 0), raw(id, 1)], None).await.unwrap();
        let loaded = store.load(id).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].originator_version, 0);
        assert_eq!(loaded[1].originator_version, 1);
    }

    #[tokio::test]
    async fn rejects_stale_expected_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.commit(vec![raw(id, 0)], None).await.unwrap();
        let result = store.commit(vec![raw(id, 0)], None).await;
        assert!(matches!(result, Err(Error::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn notification_positions_are_dense_and_monotonic() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store.commit(vec![raw(a, 0)], None).await.unwrap();
        store.commit(vec![raw(b, 0)], None).await.unwrap();
        let page = store.notifications(0, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].position, Some(1));
        assert_eq!(page[1].position, Some(2));
    }

    #[tokio::test]
    async fn tracking_cursor_advances_atomically_with_events() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .commit(vec![raw(id, 0)], Some(TrackingUpdate::new("upstream", 1)))
            .await
            .unwrap();
        assert_eq!(store.tracking("upstream").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn paging_respects_limit_and_from_position() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        for v in 0..5 {
            store.commit(vec![raw(id, v)], None).await.unwrap();
        }
        let page = store.notifications(2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].position, Some(3));
        assert_eq!(page[1].position, Some(4));
    }
}
