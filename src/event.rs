//! Event handling for the event sourcing system.
//!
//! This module defines the core [`Event`] trait every domain event payload
//! implements, the [`AggregateId`] identifying an aggregate's stream, and
//! [`RawEvent`] — the type-erased, topic-tagged form an event takes once it
//! leaves its concrete Rust type and enters a store. Type-erasing at the
//! boundary is what lets a single [`crate::store::EventStoreBackend`] commit
//! a batch spanning several different aggregate kinds (a saga creation event
//! alongside an account transaction event) in one atomic unit, and it is
//! also the "tagged-variant dispatch" the policy layer switches on instead of
//! reflecting over a class hierarchy.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Identifies an aggregate's event stream.
///
/// This is the `originator_id` threaded through the whole system: a
/// command's id becomes its saga's id, and every account event raised on a
/// saga's behalf carries that same id as its `transaction_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateId(pub Uuid);

impl AggregateId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a domain event in the event sourcing system.
///
/// Events are immutable facts about what has happened in your system. They
/// must be serializable and deserializable to support persistence, and they
/// must provide a way to identify their variant for storage and dispatch.
pub trait Event: Debug + for<'de> Deserialize<'de> + Serialize + Send + Sync + Sized {
    /// Returns a stable string identifier for the event variant.
    fn event_type(&self) -> String;
}

/// Unit type implementation of Event, used where a process application's
/// policy has nothing further to emit.
impl Event for () {
    fn event_type(&self) -> String {
        "None".to_string()
    }
}

/// A type-erased event as it is held by a store: `originator_id` and
/// `originator_version` identify it uniquely (§3.1), `topic` is the stable
/// variant name used for dispatch, and `payload` is the JSON-encoded event
/// body. `position` is set once the event is committed and becomes part of
/// its producing application's dense notification log (§4.1); it is `None`
/// for an event that has not yet been assigned one (e.g. while staged on an
/// aggregate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub originator_id: AggregateId,
    pub originator_version: u64,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub position: Option<u64>,
}

impl RawEvent {
    /// Encodes a concrete domain event into its type-erased wire form.
    pub fn encode<E: Event>(
        originator_id: AggregateId,
        originator_version: u64,
        timestamp: DateTime<Utc>,
        event: &E,
    ) -> Result<Self, Error> {
        Ok(RawEvent {
            originator_id,
            originator_version,
            topic: event.event_type(),
            timestamp,
            payload: serde_json::to_value(event)?,
            position: None,
        })
    }

    /// Decodes this event's payload back into a concrete domain event type.
    ///
    /// The caller is responsible for having already dispatched on `topic` to
    /// pick the right `E` — decoding does not re-check the topic against the
    /// target type's variant names.
    pub fn decode<E: Event>(&self) -> Result<E, Error> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
