//! The append-only event log.
//!
//! A thin facade over the store collaborator: appends assign the next
//! sequence number, reads return events in sequence order, and
//! `replace_all` installs a rewritten history. The log has no undo;
//! corrections are expressed as new events, never by mutating a prior
//! entry.

use crate::core::error::Result;
use crate::core::events::Event;
use crate::storage::event_store::SharedEventStore;

/// Ordered, append-only sequence of events backed by a store.
#[derive(Clone)]
pub struct EventLog {
    store: SharedEventStore,
}

impl EventLog {
    /// Creates a log over a store.
    #[must_use]
    pub fn new(store: SharedEventStore) -> Self {
        Self { store }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &SharedEventStore {
        &self.store
    }

    /// Appends an event draft; the store assigns the next sequence number
    /// and the durable event is returned.
    ///
    /// # Errors
    /// Fails if the store is unavailable, in which case nothing was
    /// recorded.
    pub fn append(&self, event: Event) -> Result<Event> {
        Ok(self.store.append(event)?)
    }

    /// Reads all events in sequence order.
    ///
    /// # Errors
    /// Fails if the store is unavailable.
    pub fn events(&self) -> Result<Vec<Event>> {
        Ok(self.store.read_all()?)
    }

    /// Installs a rewritten history, reassigning dense sequence numbers
    /// `0..N-1` in the given order. Used only by the replay filter; must be
    /// serialized against any concurrent append.
    ///
    /// # Errors
    /// Fails if the store is unavailable; the previous log is left in
    /// place.
    pub fn replace_all(&self, events: Vec<Event>) -> Result<Vec<Event>> {
        Ok(self.store.replace_all(events)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{CharToken, EventPayload, Provenance};
    use crate::storage::event_store::InMemoryEventStore;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn append_assigns_sequence_in_arrival_order() {
        let log = EventLog::new(Arc::new(InMemoryEventStore::new()));
        let file_id = Uuid::new_v4();
        let provenance = Provenance::new(Uuid::new_v4(), Uuid::new_v4());

        for (index, ch) in "abc".chars().enumerate() {
            let event = log
                .append(Event::new(
                    EventPayload::CharInserted {
                        file_id,
                        token: CharToken::Literal(ch),
                        line: 1,
                        column: index as u64 + 1,
                        predecessor_id: None,
                        pasted_from: None,
                    },
                    provenance,
                ))
                .unwrap();
            assert_eq!(event.sequence(), Some(index as u64));
        }

        let events = log.events().unwrap();
        let sequences: Vec<Option<u64>> = events.iter().map(Event::sequence).collect();
        assert_eq!(sequences, vec![Some(0), Some(1), Some(2)]);
    }
}
