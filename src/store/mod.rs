//! Storage backend interface.
//!
//! This module defines the [`EventStoreBackend`] trait every storage
//! adapter implements: append-atomic commit, load-by-stream, paged
//! notifications, and tracking-cursor reads, all under the atomicity
//! contract of the concurrency & resource model (a single commit either
//! makes every touched stream's new events and the tracking-cursor update
//! visible together, or none of it is).
//!
//! Two adapters are provided: [`memory::InMemoryEventStore`] for tests and
//! the cooperative single-thread dispatcher, and [`postgres::PostgresEventStore`]
//! for production use, backed by a relational engine via `sqlx`.
mod memory;
mod postgres;
mod settings;
pub mod test_support;

pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use settings::PostgresSettings;

use crate::error::Error;
use crate::event::{AggregateId, RawEvent};

/// An update to a process application's tracking cursor for one upstream
/// application, committed atomically alongside the events it produced while
/// processing up to and including that position (§4.3.2 step 2d).
#[derive(Debug, Clone)]
pub struct TrackingUpdate {
    pub upstream: String,
    pub position: u64,
}

impl TrackingUpdate {
    pub fn new(upstream: impl Into<String>, position: u64) -> Self {
        Self {
            upstream: upstream.into(),
            position,
        }
    }
}

/// A durable, append-only storage backend for one process application's own
/// event store.
///
/// Each touched stream's first event in a `commit` batch must carry
/// `originator_version` equal to that stream's current length (0 for a new
/// stream); later events for the same stream in the batch must increment by
/// one. Implementations must reject the whole batch with
/// [`Error::ConcurrencyConflict`] if any touched stream has advanced since
/// the caller last read it.
#[async_trait::async_trait]
pub trait EventStoreBackend: Send + Sync {
    /// Returns the ordered events for a stream. An unknown stream yields an
    /// empty vector — not found is a property of the aggregate, not the
    /// stream read.
    async fn load(&self, id: AggregateId) -> Result<Vec<RawEvent>, Error>;

    /// Atomically appends `events` (which may span multiple streams) and,
    /// if given, records `tracking` as the new cursor position for that
    /// upstream application. Returns the committed events, each stamped with
    /// its assigned notification-log position.
    async fn commit(
        &self,
        events: Vec<RawEvent>,
        tracking: Option<TrackingUpdate>,
    ) -> Result<Vec<RawEvent>, Error>;

    /// Returns up to `limit` events from this store's own notification log
    /// with position strictly greater than `from_position`, ordered by
    /// position.
    async fn notifications(&self, from_position: u64, limit: usize) -> Result<Vec<RawEvent>, Error>;

    /// Returns the last position this application has recorded having
    /// processed from `upstream`, or 0 if it has never processed anything
    /// from it.
    async fn tracking(&self, upstream: &str) -> Result<u64, Error>;
}
