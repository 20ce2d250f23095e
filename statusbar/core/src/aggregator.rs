//! Aggregator - The Single Owner of Displayed Blocks
//!
//! The aggregator task owns the visible set and the click router. Producers
//! reach it only through the command mailbox; the input reader reaches it only
//! through the click channel. Every accepted mutation publishes a complete,
//! ordered [`Snapshot`] to the output side.
//!
//! # Architecture
//!
//! ```text
//!   Commands (mpsc, unbounded) ──┐
//!                                │   ┌────────────────────────────────┐
//!   ClickEvents (mpsc, bounded) ─┼──►│ Aggregator                     │
//!                                │   │  VisibleSet  BTreeMap<Key,Blk> │──► watch<Snapshot>
//!   CancellationToken ───────────┘   │  ClickRouter HashMap<Key,Fn>   │     (latest only)
//!                                    │  owners      HashMap<Key,Id>   │
//!                                    └────────────────────────────────┘
//! ```
//!
//! # Output Channel
//!
//! Snapshots go out on a `watch` channel: the writer always sees the latest
//! snapshot and intermediate ones it was too slow to pick up are replaced.
//! Snapshots are full copies, so skipping one loses nothing, and the
//! aggregator never waits on the writer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::block::{Block, BlockKey};
use crate::click_router::{ClickRouter, DispatchOutcome};
use crate::emitter::{Command, CommandReceiver, ProducerId};
use crate::error::StatusError;
use crate::events::ClickEvent;

// ============================================================================
// Snapshot
// ============================================================================

/// Complete ordered copy of the visible blocks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Sequence number, incremented on every accepted mutation (0 = initial)
    pub generation: u64,
    /// Blocks ordered by `(name, instance)`
    pub blocks: Arc<Vec<Block>>,
}

impl Snapshot {
    /// Keys in display order
    #[must_use]
    pub fn keys(&self) -> Vec<BlockKey> {
        self.blocks.iter().map(Block::key).collect()
    }

    /// Number of visible blocks
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block is visible
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ============================================================================
// Visible Set
// ============================================================================

/// Latest non-removed block for every key
///
/// Backed by a `BTreeMap` so iteration is already in display order.
#[derive(Debug, Default)]
pub struct VisibleSet {
    blocks: BTreeMap<BlockKey, Block>,
}

impl VisibleSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a block
    ///
    /// Returns false if an identical block is already stored.
    pub fn upsert(&mut self, block: Block) -> bool {
        let key = block.key();
        if self.blocks.get(&key) == Some(&block) {
            return false;
        }
        self.blocks.insert(key, block);
        true
    }

    /// Remove a block, returning it if it was present
    pub fn remove(&mut self, key: &BlockKey) -> Option<Block> {
        self.blocks.remove(key)
    }

    /// Get the block stored for a key
    #[must_use]
    pub fn get(&self, key: &BlockKey) -> Option<&Block> {
        self.blocks.get(key)
    }

    /// Whether the key is visible
    #[must_use]
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    /// Number of visible blocks
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in display order
    #[must_use]
    pub fn ordered(&self) -> Vec<Block> {
        self.blocks.values().cloned().collect()
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Owner of the visible set and click router
pub struct Aggregator {
    visible: VisibleSet,
    router: ClickRouter,
    /// Last writer of each visible key
    owners: HashMap<BlockKey, ProducerId>,
    /// Producers whose task has finished
    retired: HashSet<ProducerId>,
    generation: u64,
    snapshots: watch::Sender<Snapshot>,
}

impl Aggregator {
    /// Create an aggregator publishing to the given channel
    #[must_use]
    pub fn new(snapshots: watch::Sender<Snapshot>) -> Self {
        Self {
            visible: VisibleSet::new(),
            router: ClickRouter::new(),
            owners: HashMap::new(),
            retired: HashSet::new(),
            generation: 0,
            snapshots,
        }
    }

    /// Number of snapshots published so far
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The current ordered snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            blocks: Arc::new(self.visible.ordered()),
        }
    }

    /// Read access to the visible set
    #[must_use]
    pub fn visible(&self) -> &VisibleSet {
        &self.visible
    }

    /// Read access to the click router
    #[must_use]
    pub fn router(&self) -> &ClickRouter {
        &self.router
    }

    /// Apply one command
    ///
    /// Returns true if the command changed the visible set, in which case a
    /// new snapshot was published.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Upsert { producer, block } => {
                if self.is_retired(producer) {
                    return false;
                }
                self.upsert(producer, block)
            }
            Command::Remove { producer, key } => {
                if self.is_retired(producer) {
                    return false;
                }
                self.remove(&key)
            }
            Command::RegisterHandler {
                producer,
                key,
                handler,
            } => {
                if !self.is_retired(producer) {
                    self.router.register(producer, key, handler);
                }
                false
            }
            Command::Deregister { producer } => self.deregister(producer),
        }
    }

    /// Route a click to its handler
    pub fn dispatch(&self, event: ClickEvent) -> DispatchOutcome {
        self.router.dispatch(event)
    }

    fn upsert(&mut self, producer: ProducerId, block: Block) -> bool {
        if block.name.is_empty() {
            error!(producer = %producer, "Refusing block without a name");
            return false;
        }

        let key = block.key();
        self.owners.insert(key.clone(), producer);
        if !self.visible.upsert(block) {
            trace!(key = %key, "Block unchanged");
            return false;
        }
        self.publish();
        true
    }

    fn remove(&mut self, key: &BlockKey) -> bool {
        if self.visible.remove(key).is_none() {
            trace!(key = %key, "Remove of absent block ignored");
            return false;
        }
        self.owners.remove(key);
        self.router.unregister(key);
        self.publish();
        true
    }

    fn deregister(&mut self, producer: ProducerId) -> bool {
        if !self.retired.insert(producer) {
            return false;
        }

        let owned: Vec<BlockKey> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == producer)
            .map(|(key, _)| key.clone())
            .collect();

        let mut changed = false;
        for key in &owned {
            self.owners.remove(key);
            self.router.unregister(key);
            changed |= self.visible.remove(key).is_some();
        }
        let handlers = self.router.unregister_owner(producer);

        debug!(
            producer = %producer,
            blocks = owned.len(),
            handlers = handlers,
            "Producer deregistered"
        );

        if changed {
            self.publish();
        }
        changed
    }

    fn is_retired(&self, producer: ProducerId) -> bool {
        let retired = self.retired.contains(&producer);
        if retired {
            debug!(producer = %producer, "Ignoring command from retired producer");
        }
        retired
    }

    fn publish(&mut self) {
        self.generation += 1;
        let snapshot = self.snapshot();
        trace!(
            generation = snapshot.generation,
            blocks = snapshot.len(),
            "Publishing snapshot"
        );
        self.snapshots.send_replace(snapshot);
    }

    /// Run the aggregator loop until cancelled
    ///
    /// Waits on cancellation, the command mailbox and the click channel.
    /// Cancellation is checked first so nothing is applied once shutdown has
    /// started.
    pub async fn run(
        mut self,
        mut commands: CommandReceiver,
        mut clicks: mpsc::Receiver<ClickEvent>,
        cancel: CancellationToken,
    ) -> Result<(), StatusError> {
        info!("Aggregator started");
        let mut clicks_open = true;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    break;
                }

                Some(command) = commands.recv() => {
                    self.apply(command);
                }

                event = clicks.recv(), if clicks_open => match event {
                    Some(event) => {
                        self.dispatch(event);
                    }
                    None => {
                        debug!("Click channel closed");
                        clicks_open = false;
                    }
                }
            }
        }

        info!(
            generation = self.generation,
            blocks = self.visible.len(),
            "Aggregator stopped"
        );
        Ok(())
    }
}
