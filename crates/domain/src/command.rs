//! Command execution against stored aggregates.

use std::collections::HashMap;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::{DomainError, Result};
use crate::events::CoreEvent;
use crate::history::HistorySubject;
use crate::store::{Tables, Transaction};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and applied.
    pub events: Vec<A::Event>,
}

/// An aggregate with a table in the store.
pub trait Stored: Aggregate {
    fn rows(tables: &Tables) -> &HashMap<Self::Id, Self>;

    fn rows_mut(tables: &mut Tables) -> &mut HashMap<Self::Id, Self>;

    /// Default subject of the history rows this aggregate's events leave.
    ///
    /// `None` when every recorded event names its own subject.
    fn history_subject(&self) -> Option<HistorySubject>;

    /// Bus notification for an event, if subscribers care about it.
    fn notification(&self, _event: &Self::Event) -> Option<CoreEvent> {
        None
    }
}

impl Transaction {
    /// Loads a copy of an aggregate.
    pub fn load<A: Stored>(&self, id: A::Id) -> Result<A> {
        A::rows(self.tables())
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(A::aggregate_type(), id))
    }

    /// Stores a new or replaced aggregate.
    pub(crate) fn save<A: Stored>(&mut self, aggregate: A) {
        A::rows_mut(self.tables_mut()).insert(aggregate.id(), aggregate);
    }

    /// Every stored aggregate of one kind matching a predicate.
    pub fn find<A: Stored>(&self, predicate: impl Fn(&A) -> bool) -> Vec<A> {
        A::rows(self.tables())
            .values()
            .filter(|a| predicate(a))
            .cloned()
            .collect()
    }

    /// Executes a command: validates on a copy, records history for each
    /// event, applies the events, saves, then notifies subscribers.
    pub fn execute<A, F>(&mut self, id: A::Id, command: F) -> Result<CommandResult<A>>
    where
        A: Stored,
        F: FnOnce(&A) -> Result<Vec<A::Event>>,
    {
        let mut aggregate = self.load::<A>(id)?;
        let events = command(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
            });
        }

        let subject = aggregate.history_subject();
        let mut notifications = Vec::new();
        for event in &events {
            if let Some(change) = event.history() {
                let Some(target) = change.subject.or(subject) else {
                    return Err(DomainError::DatabaseInconsistency(format!(
                        "{} event {} has no history subject",
                        A::aggregate_type(),
                        event.event_type()
                    )));
                };
                self.write_history(target, change)?;
            }
            if let Some(notification) = aggregate.notification(event) {
                notifications.push(notification);
            }
            tracing::trace!(
                aggregate = A::aggregate_type(),
                id = %id,
                event = event.event_type(),
                "event applied"
            );
        }

        aggregate.apply_events(events.iter().cloned());
        self.save(aggregate.clone());

        for notification in notifications {
            self.publish(notification)?;
        }

        Ok(CommandResult { aggregate, events })
    }
}
