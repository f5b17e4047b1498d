//! Core aggregate and domain event traits.

use std::fmt::Display;
use std::hash::Hash;

use common::AggregateId;
use serde::{Serialize, de::DeserializeOwned};

use crate::history::HistoryChange;

/// Trait for domain events.
///
/// Domain events are facts produced by an aggregate command and applied to
/// the aggregate afterwards. They are named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// The audit row this event leaves behind, if it is a recorded change.
    fn history(&self) -> Option<HistoryChange> {
        None
    }
}

/// Trait for aggregate roots.
///
/// Commands are methods taking `&self` that validate preconditions and
/// return the events describing the change; `apply` then folds each event
/// into the state. `apply` must not fail.
pub trait Aggregate: Clone + Send + Sync + Sized {
    /// Typed identifier of the aggregate.
    type Id: Copy + Eq + Hash + Display + Into<AggregateId> + Send + Sync;

    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    fn id(&self) -> Self::Id;

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use common::TillId;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Incremented { by: i32 },
        Reset,
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Incremented { .. } => "Incremented",
                CounterEvent::Reset => "Reset",
            }
        }

        fn history(&self) -> Option<HistoryChange> {
            match self {
                CounterEvent::Reset => Some(HistoryChange::new("Value").values(None, Some("0"))),
                CounterEvent::Incremented { .. } => None,
            }
        }
    }

    #[derive(Debug, Clone)]
    struct Counter {
        id: TillId,
        value: i32,
    }

    impl Aggregate for Counter {
        type Id = TillId;
        type Event = CounterEvent;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> TillId {
            self.id
        }

        fn apply(&mut self, event: CounterEvent) {
            match event {
                CounterEvent::Incremented { by } => self.value += by,
                CounterEvent::Reset => self.value = 0,
            }
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let mut counter = Counter {
            id: TillId::new(),
            value: 0,
        };
        counter.apply_events(vec![
            CounterEvent::Incremented { by: 2 },
            CounterEvent::Reset,
            CounterEvent::Incremented { by: 5 },
        ]);
        assert_eq!(counter.value, 5);
    }

    #[test]
    fn only_recorded_changes_have_history() {
        assert!(CounterEvent::Incremented { by: 1 }.history().is_none());
        let change = CounterEvent::Reset.history().unwrap();
        assert_eq!(change.what, "Value");
        assert_eq!(change.new_value.as_deref(), Some("0"));
        assert_eq!(CounterEvent::Reset.event_type(), "Reset");
    }
}
