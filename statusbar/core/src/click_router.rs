//! Click Router
//!
//! Maps block keys to the click handlers producers registered for them.
//!
//! The router lives inside the aggregator task, next to the visible set, so
//! registration and dispatch are plain method calls with no locking. The table
//! is kept apart from the visible set: a block that is removed loses its
//! handler, and coming back does not bring the old one with it.
//!
//! Dispatch clones the handler's `Arc` out of the table before calling it, so
//! the handler is free to emit commands that mutate the router or the visible
//! set; they are applied on the next turn of the aggregator loop.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::block::BlockKey;
use crate::emitter::{ClickHandler, ProducerId};
use crate::events::ClickEvent;

/// What happened to a dispatched click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran to completion
    Handled,
    /// No handler is registered for the clicked key
    UnknownBlock,
    /// The handler panicked; the panic was contained
    HandlerPanicked,
}

struct Registration {
    owner: ProducerId,
    handler: ClickHandler,
}

/// Handler table keyed by block
#[derive(Default)]
pub struct ClickRouter {
    handlers: HashMap<BlockKey, Registration>,
}

impl ClickRouter {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any existing one for the key
    pub fn register(&mut self, owner: ProducerId, key: BlockKey, handler: ClickHandler) {
        debug!(key = %key, producer = %owner, "Click handler registered");
        self.handlers.insert(key, Registration { owner, handler });
    }

    /// Drop the handler for a key
    pub fn unregister(&mut self, key: &BlockKey) -> bool {
        self.handlers.remove(key).is_some()
    }

    /// Drop every handler registered by a producer
    ///
    /// Returns the number of handlers removed.
    pub fn unregister_owner(&mut self, owner: ProducerId) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|_, registration| registration.owner != owner);
        before - self.handlers.len()
    }

    /// Whether a handler is registered for the key
    #[must_use]
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.handlers.contains_key(key)
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke the handler registered for the event's block
    ///
    /// Clicks on unknown blocks are logged and dropped: the bar may still be
    /// showing a block that a producer has just removed.
    pub fn dispatch(&self, event: ClickEvent) -> DispatchOutcome {
        let key = event.key();
        let Some(handler) = self
            .handlers
            .get(&key)
            .map(|registration| Arc::clone(&registration.handler))
        else {
            warn!(key = %key, "Click on unknown block");
            return DispatchOutcome::UnknownBlock;
        };

        debug!(key = %key, button = event.button, "Dispatching click");
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(()) => DispatchOutcome::Handled,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(key = %key, panic = %message, "Click handler panicked");
                DispatchOutcome::HandlerPanicked
            }
        }
    }
}
