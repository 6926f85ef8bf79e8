//! Aggregate state and the generic aggregate wrapper.
//!
//! An aggregate is rebuilt by replaying its ordered events through
//! [`AggregateState::apply`]. [`Aggregate`] pairs a concrete state type with
//! its id, committed version, and any events domain methods have staged but
//! not yet saved — the `trigger` mechanics described in the runtime design
//! (validate against current state, mutate, stage for the next atomic
//! commit).
use std::fmt::Debug;

use chrono::Utc;

use crate::event::{AggregateId, Event, RawEvent};

/// Represents the state of an aggregate that can be modified by events.
pub trait AggregateState<E: Event>: Debug + Clone + Default {
    /// Apply an event to the current state and return the next state.
    fn apply(&self, event: &E) -> Self;
}

impl<E: Event> AggregateState<E> for () {
    fn apply(&self, _event: &E) {}
}

/// A domain aggregate: its identity, the version the store has durably
/// recorded (`committed_version`), its current in-memory state (which may
/// already reflect staged-but-unsaved events), and the events staged by
/// domain methods since the last load or save.
#[derive(Debug, Clone)]
pub struct Aggregate<S: AggregateState<E>, E: Event> {
    pub id: AggregateId,
    committed_version: u64,
    pub state: S,
    pending: Vec<E>,
}

impl<S: AggregateState<E>, E: Event> Aggregate<S, E> {
    /// Creates a brand-new aggregate with empty state, not yet persisted.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            committed_version: 0,
            state: S::default(),
            pending: Vec::new(),
        }
    }

    /// Rebuilds an aggregate by folding previously stored events, in version
    /// order, through [`AggregateState::apply`]. This is the replay-
    /// determinism guarantee: the same events always fold to the same state.
    pub fn replay(id: AggregateId, events: Vec<E>) -> Self {
        let mut state = S::default();
        for event in &events {
            state = state.apply(event);
        }
        Self {
            id,
            committed_version: events.len() as u64,
            state,
            pending: Vec::new(),
        }
    }

    /// The aggregate's version: the number of events that have been applied,
    /// including any staged but not yet saved.
    pub fn version(&self) -> u64 {
        self.committed_version + self.pending.len() as u64
    }

    /// The version the backing store last durably recorded — the expected
    /// version to use for an optimistic-concurrency commit.
    pub fn committed_version(&self) -> u64 {
        self.committed_version
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Validates and applies an already-constructed event, then stages it
    /// for the next atomic commit. Domain methods call this only after
    /// checking their own preconditions against `self.state` — `trigger`
    /// itself never rejects an event.
    pub fn trigger(&mut self, event: E) {
        self.state = self.state.apply(&event);
        self.pending.push(event);
    }

    /// Drains staged events into their wire form, each stamped with the
    /// `originator_version` it will occupy once committed.
    pub fn drain_pending(&mut self) -> Result<Vec<RawEvent>, crate::error::Error> {
        let now = Utc::now();
        let base = self.committed_version;
        let raws = self
            .pending
            .drain(..)
            .enumerate()
            .map(|(i, event)| RawEvent::encode(self.id, base + i as u64, now, &event))
            .collect::<Result<Vec<_>, _>>()?;
        self.committed_version = base + raws.len() as u64;
        Ok(raws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Incremented { by: u32 },
    }

    impl Event for CounterEvent {
        fn event_type(&self) -> String {
            "Incremented".to_string()
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Counter {
        total: u32,
    }

    impl AggregateState<CounterEvent> for Counter {
        fn apply(&self, event: &CounterEvent) -> Self {
            match event {
                CounterEvent::Incremented { by } => Counter {
                    total: self.total + by,
                },
            }
        }
    }

    #[test]
    fn replay_is_deterministic() {
        let events = vec![
            CounterEvent::Incremented { by: 2 },
            CounterEvent::Incremented { by: 3 },
        ];
        let agg: Aggregate<Counter, CounterEvent> =
            Aggregate::replay(AggregateId::new(), events);
        assert_eq!(agg.state.total, 5);
        assert_eq!(agg.committed_version(), 2);
    }

    #[test]
    fn trigger_stages_and_applies() {
        let mut agg: Aggregate<Counter, CounterEvent> = Aggregate::new(AggregateId::new());
        agg.trigger(CounterEvent::Incremented { by: 4 });
        assert_eq!(agg.state.total, 4);
        assert_eq!(agg.version(), 1);
        assert_eq!(agg.committed_version(), 0);

        let raw = agg.drain_pending().unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].originator_version, 0);
        assert_eq!(agg.committed_version(), 1);
        assert!(!agg.has_pending());
    }
}
