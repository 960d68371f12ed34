//! Typed event registry
//!
//! Handlers are registered per [`EventKind`] and run in registration order
//! when an event of that kind is published. Dispatch is a map lookup on the
//! variant tag.

use std::collections::HashMap;
use std::fmt;

use tracing::info;

use crate::statement::{EventKind, ImportEvent};

/// A subscriber to import events
pub type EventHandler = Box<dyn Fn(&ImportEvent) + Send + Sync>;

/// Registry of event handlers keyed by event kind
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<EventKind, Vec<EventHandler>>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(EventKind, usize)> =
            self.handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        counts.sort_by_key(|(k, _)| format!("{:?}", k));
        f.debug_struct("EventRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in logging handler on every kind
    pub fn with_logging() -> Self {
        let mut registry = Self::new();
        for kind in EventKind::all() {
            registry.register(*kind, log_event);
        }
        registry
    }

    /// Append a handler for one kind of event
    pub fn register<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&ImportEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Run every handler registered for the event's kind, returning how many ran
    pub fn publish(&self, event: &ImportEvent) -> usize {
        match self.handlers.get(&event.kind()) {
            Some(handlers) => {
                for handler in handlers {
                    handler(event);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    pub fn publish_all(&self, events: &[ImportEvent]) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

fn log_event(event: &ImportEvent) {
    match event {
        ImportEvent::Created {
            upload_id,
            user_id,
            file_name,
        } => info!(upload_id = %upload_id, user_id = %user_id, file_name = %file_name, "Import created"),
        ImportEvent::ParsingStarted { upload_id } => {
            info!(upload_id = %upload_id, "Import parsing started")
        }
        ImportEvent::ParsingCompleted {
            upload_id,
            transaction_count,
        } => info!(upload_id = %upload_id, transaction_count, "Import ready for review"),
        ImportEvent::Failed { upload_id, reason } => {
            info!(upload_id = %upload_id, reason = %reason, "Import failed")
        }
        ImportEvent::CategoryUpdated {
            upload_id,
            transaction_id,
            category_id,
        } => info!(
            upload_id = %upload_id,
            transaction_id = %transaction_id,
            category_id = %category_id,
            "Import line recategorized"
        ),
        ImportEvent::Confirmed(confirmed) => info!(
            upload_id = %confirmed.upload_id,
            lines = confirmed.lines.len(),
            "Import confirmed"
        ),
        ImportEvent::Cancelled { upload_id } => {
            info!(upload_id = %upload_id, "Import cancelled")
        }
    }
}
