//! Lifecycle event notification.
//!
//! A typed publish/subscribe registry over the four changeset lifecycle
//! channels. Listeners are keyed by a monotonically increasing id so they can
//! be removed individually.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::change::Change;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BeforeValidation,
    AfterValidation,
    AfterRollback,
    Execute,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangesetEvent {
    BeforeValidation { path: String },
    AfterValidation { path: String, valid: bool },
    AfterRollback,
    Execute { changes: Vec<Change> },
}

impl ChangesetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChangesetEvent::BeforeValidation { .. } => EventKind::BeforeValidation,
            ChangesetEvent::AfterValidation { .. } => EventKind::AfterValidation,
            ChangesetEvent::AfterRollback => EventKind::AfterRollback,
            ChangesetEvent::Execute { .. } => EventKind::Execute,
        }
    }
}

type Callback = Box<dyn FnMut(&ChangesetEvent)>;

struct Listener {
    kind: EventKind,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
    /// Ids removed while an emit was in progress; applied when the emit ends.
    removed_during_emit: Vec<u64>,
    emitting: bool,
}

/// Listener registry for changeset lifecycle events.
///
/// Subscribing and unsubscribing from inside a listener callback is
/// supported: additions take effect from the next emit, removals immediately
/// suppress later delivery within the same emit.
#[derive(Default)]
pub struct Notifier {
    registry: RefCell<Registry>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `callback` to events of `kind`. Returns the listener id.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> u64
    where
        F: FnMut(&ChangesetEvent) + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id = registry.next_id.saturating_add(1);
        registry.listeners.insert(
            id,
            Listener {
                kind,
                callback: Box::new(callback),
            },
        );
        id
    }

    /// Unsubscribe a listener. Returns whether it existed.
    pub fn off(&self, id: u64) -> bool {
        let mut registry = self.registry.borrow_mut();
        if registry.emitting {
            // The listener map is temporarily taken out during an emit; record
            // the removal so it is applied when the emit finishes.
            if !registry.removed_during_emit.contains(&id) {
                registry.removed_during_emit.push(id);
                return true;
            }
            return registry.listeners.remove(&id).is_some();
        }
        registry.listeners.remove(&id).is_some()
    }

    /// Deliver `event` to every listener subscribed to its kind.
    pub fn emit(&self, event: &ChangesetEvent) {
        let kind = event.kind();
        let mut current = {
            let mut registry = self.registry.borrow_mut();
            if registry.emitting {
                // A listener triggered a nested emit; deliver to nothing
                // rather than re-entering the taken map.
                return;
            }
            registry.emitting = true;
            std::mem::take(&mut registry.listeners)
        };
        for (id, listener) in current.iter_mut() {
            if listener.kind != kind {
                continue;
            }
            if self.registry.borrow().removed_during_emit.contains(id) {
                continue;
            }
            (listener.callback)(event);
        }
        let mut registry = self.registry.borrow_mut();
        for id in std::mem::take(&mut registry.removed_during_emit) {
            current.remove(&id);
        }
        // Listeners registered during the emit are already in the fresh map.
        for (id, listener) in current {
            registry.listeners.entry(id).or_insert(listener);
        }
        registry.emitting = false;
    }

    pub fn listener_count(&self) -> usize {
        self.registry.borrow().listeners.len()
    }
}
