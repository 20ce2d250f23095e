//! Producer-Facing Emitter
//!
//! Producers never touch the aggregator's state. Everything they do goes
//! through an [`Emitter`], which turns calls into [`Command`]s on the
//! aggregator's mailbox:
//!
//! ```text
//!   producer A ──emit()──────┐
//!   producer B ──remove()────┼──► mpsc (unbounded) ──► Aggregator task
//!   click handler ──emit()───┘        FIFO per sender
//! ```
//!
//! The mailbox is unbounded so `emit` never waits. That matters for click
//! handlers: they run inside the aggregator task, and a handler that had to
//! wait for room in the aggregator's own queue would never get it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::block::{Block, BlockKey};
use crate::error::EmitError;
use crate::events::ClickEvent;

/// Callback invoked when a block is clicked
pub type ClickHandler = Arc<dyn Fn(ClickEvent) + Send + Sync>;

/// Identifies the producer behind a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProducerId(u64);

impl ProducerId {
    /// Allocate a new unique producer ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ProducerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer-{}", self.0)
    }
}

/// A request on the aggregator's mailbox
pub enum Command {
    /// Insert or replace a block
    Upsert {
        /// Sender
        producer: ProducerId,
        /// New value
        block: Block,
    },
    /// Remove a block from the bar
    Remove {
        /// Sender
        producer: ProducerId,
        /// Block to remove
        key: BlockKey,
    },
    /// Install (or replace) the click handler for a key
    RegisterHandler {
        /// Sender
        producer: ProducerId,
        /// Block the handler belongs to
        key: BlockKey,
        /// Callback
        handler: ClickHandler,
    },
    /// The producer is gone for good; drop everything it owns
    Deregister {
        /// Retired producer
        producer: ProducerId,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upsert { producer, block } => f
                .debug_struct("Upsert")
                .field("producer", producer)
                .field("key", &block.key())
                .finish_non_exhaustive(),
            Self::Remove { producer, key } => f
                .debug_struct("Remove")
                .field("producer", producer)
                .field("key", key)
                .finish(),
            Self::RegisterHandler { producer, key, .. } => f
                .debug_struct("RegisterHandler")
                .field("producer", producer)
                .field("key", key)
                .finish_non_exhaustive(),
            Self::Deregister { producer } => f
                .debug_struct("Deregister")
                .field("producer", producer)
                .finish(),
        }
    }
}

/// Receiving end of the aggregator mailbox
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Sending side of the aggregator mailbox
///
/// Hands out one [`Emitter`] per producer and is used by the supervisor to
/// retire producers whose task has finished.
#[derive(Clone, Debug)]
pub struct CommandBus {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandBus {
    /// Create a bus and the receiver the aggregator consumes
    #[must_use]
    pub fn channel() -> (Self, CommandReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create an emitter for a new producer
    #[must_use]
    pub fn emitter(&self, producer_name: &str) -> Emitter {
        Emitter {
            producer: ProducerId::new(),
            producer_name: Arc::from(producer_name),
            tx: self.tx.clone(),
        }
    }

    /// Retire a producer; its blocks and handlers are dropped
    pub fn deregister(&self, producer: ProducerId) -> Result<(), EmitError> {
        self.tx
            .send(Command::Deregister { producer })
            .map_err(|_| EmitError::Closed)
    }
}

/// Handle a producer uses to publish blocks
///
/// Cheap to clone; clones share the producer identity, so a click handler
/// capturing a clone writes on behalf of the same producer.
#[derive(Clone)]
pub struct Emitter {
    producer: ProducerId,
    producer_name: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("producer", &self.producer)
            .field("producer_name", &self.producer_name)
            .finish_non_exhaustive()
    }
}

impl Emitter {
    /// Insert or replace a block
    ///
    /// # Errors
    ///
    /// `EmitError::EmptyName` if the block has no name. Producers are expected
    /// to propagate this with `?`, which makes it fatal.
    /// `EmitError::Closed` once the aggregator has stopped.
    pub fn emit(&self, block: Block) -> Result<(), EmitError> {
        if block.name.is_empty() {
            return Err(EmitError::EmptyName);
        }
        self.send(Command::Upsert {
            producer: self.producer,
            block,
        })
    }

    /// Remove a block from the bar
    ///
    /// Removing a block that is not displayed does nothing.
    pub fn remove(&self, key: BlockKey) -> Result<(), EmitError> {
        if key.name.is_empty() {
            return Err(EmitError::EmptyName);
        }
        self.send(Command::Remove {
            producer: self.producer,
            key,
        })
    }

    /// Register the click handler for a block, replacing any previous one
    ///
    /// The handler runs on the aggregator task. It must not block; emitting
    /// from it is fine.
    pub fn on_click<F>(&self, key: BlockKey, handler: F) -> Result<(), EmitError>
    where
        F: Fn(ClickEvent) + Send + Sync + 'static,
    {
        if key.name.is_empty() {
            return Err(EmitError::EmptyName);
        }
        self.send(Command::RegisterHandler {
            producer: self.producer,
            key,
            handler: Arc::new(handler),
        })
    }

    /// The producer this emitter speaks for
    #[must_use]
    pub fn producer_id(&self) -> ProducerId {
        self.producer
    }

    /// The producer name, for logging
    #[must_use]
    pub fn producer_name(&self) -> &str {
        &self.producer_name
    }

    /// Whether the aggregator has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<(), EmitError> {
        self.tx.send(command).map_err(|_| EmitError::Closed)
    }
}
