//! Lifecycle Supervisor
//!
//! Starts every task of a status bar run, watches them, and tears them down
//! together.
//!
//! # Architecture
//!
//! ```text
//!                        ┌──────────────────────────────────────────┐
//!   stdin ──► input ────►│ click channel (bounded)                  │
//!                        │                         Aggregator ──────┼──► watch ──► writer ──► stdout
//!   producer 1..N ──────►│ command mailbox (unbounded)              │
//!                        └──────────────────────────────────────────┘
//!                 all tasks in one JoinSet, one CancellationToken
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!   Running ──(error | panic | input EOF | shutdown())──► Canceling ──(all joined)──► Drained
//! ```
//!
//! - The first fatal error is kept and returned; later ones are logged
//! - A producer that returns `Ok(())` while running is retired, not fatal
//! - Tasks still running `shutdown_grace` after cancellation are reported
//!   but never aborted
//! - The block stream is closed with `]` once every task has stopped

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregator, Snapshot};
use crate::block::Header;
use crate::config::StatusConfig;
use crate::emitter::{CommandBus, ProducerId};
use crate::error::{EmitError, StatusError};
use crate::producer::{Producer, ProducerContext};
use crate::protocol::{forward_clicks, write_snapshots, SnapshotWriter};

// ============================================================================
// Configuration
// ============================================================================

/// Settings for one supervised run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Header written before the block stream
    pub header: Header,
    /// Capacity of the input reader to aggregator channel
    pub click_queue_capacity: usize,
    /// Time after cancellation before stuck tasks are reported
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            header: Header::default(),
            click_queue_capacity: 16,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl From<&StatusConfig> for SupervisorConfig {
    fn from(config: &StatusConfig) -> Self {
        Self {
            header: Header {
                version: 1,
                click_events: config.bar.click_events,
                cont_signal: config.bar.cont_signal,
                stop_signal: config.bar.stop_signal,
            },
            click_queue_capacity: config.runtime.click_queue_capacity.max(1),
            shutdown_grace: config.runtime.shutdown_grace(),
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Observable phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Tasks are running normally
    Running,
    /// Cancellation requested, waiting for tasks to stop
    Canceling,
    /// Every task stopped and the output is closed
    Drained,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Canceling => write!(f, "canceling"),
            Self::Drained => write!(f, "drained"),
        }
    }
}

/// Requests a graceful shutdown from outside the run
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    cancel: CancellationToken,
}

impl ShutdownHandle {
    /// Start shutting down; idempotent
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Shutdown requested");
        }
        self.cancel.cancel();
    }

    /// Whether shutdown has been requested (by anyone)
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What a supervised task is
#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskKind {
    Aggregator,
    Writer,
    Input,
    Producer { id: ProducerId, name: String },
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregator => write!(f, "aggregator"),
            Self::Writer => write!(f, "output writer"),
            Self::Input => write!(f, "input reader"),
            Self::Producer { name, .. } => write!(f, "producer {name}"),
        }
    }
}

struct TaskOutcome {
    slot: usize,
    kind: TaskKind,
    result: Result<(), StatusError>,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Owns every task of a run
pub struct Supervisor {
    config: SupervisorConfig,
    producers: Vec<Box<dyn Producer>>,
    cancel: CancellationToken,
    state: watch::Sender<LifecycleState>,
    snapshots: watch::Sender<Snapshot>,
}

impl Supervisor {
    /// Create a supervisor with no producers
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        let (snapshots, _) = watch::channel(Snapshot::default());
        Self {
            config,
            producers: Vec::new(),
            cancel: CancellationToken::new(),
            state,
            snapshots,
        }
    }

    /// Add a producer to start with the run
    pub fn add_producer<P: Producer>(&mut self, producer: P) {
        self.producers.push(Box::new(producer));
    }

    /// Add an already boxed producer
    pub fn add_boxed_producer(&mut self, producer: Box<dyn Producer>) {
        self.producers.push(producer);
    }

    /// Number of producers registered so far
    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Handle that triggers a graceful shutdown
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Watch published snapshots
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// Run until every task has stopped
    ///
    /// Writes the header, runs the aggregator, the output writer, the input
    /// reader (only when click events are enabled) and every producer, then
    /// closes the block stream.
    ///
    /// # Errors
    ///
    /// The first fatal error any task reported. End of input and external
    /// shutdown are not errors.
    pub async fn run<R, W>(self, input: R, output: W) -> Result<(), StatusError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            config,
            producers,
            cancel,
            state,
            snapshots,
        } = self;

        let mut sink = SnapshotWriter::new(output);
        if let Err(e) = sink.open(&config.header).await {
            error!(error = %e, "Failed to open block stream");
            cancel.cancel();
            state.send_replace(LifecycleState::Drained);
            return Err(e);
        }
        let writer = Arc::new(Mutex::new(sink));

        let (bus, commands) = CommandBus::channel();
        let (click_tx, click_rx) = mpsc::channel(config.click_queue_capacity.max(1));
        let snapshot_rx = snapshots.subscribe();

        let mut tasks = Tasks::default();
        tasks.spawn(
            TaskKind::Aggregator,
            Aggregator::new(snapshots).run(commands, click_rx, cancel.clone()),
        );
        tasks.spawn(
            TaskKind::Writer,
            write_snapshots(Arc::clone(&writer), snapshot_rx, cancel.clone()),
        );
        if config.header.click_events {
            tasks.spawn(
                TaskKind::Input,
                forward_clicks(input, click_tx, cancel.clone()),
            );
        } else {
            debug!("Click events disabled, not reading input");
            drop(click_tx);
        }

        for producer in producers {
            let name = producer.name().to_string();
            let emitter = bus.emitter(&name);
            let id = emitter.producer_id();
            let ctx = ProducerContext::new(emitter, cancel.clone());
            let failed_name = name.clone();
            let stopping = cancel.clone();
            let run = async move {
                match producer.run(ctx).await {
                    Ok(()) => Ok(()),
                    // Emitting while the aggregator shuts down
                    Err(source)
                        if stopping.is_cancelled()
                            && source.downcast_ref::<EmitError>() == Some(&EmitError::Closed) =>
                    {
                        debug!(producer = %failed_name, "Emit raced with shutdown");
                        Ok(())
                    }
                    Err(source) => Err(StatusError::Producer {
                        name: failed_name,
                        source,
                    }),
                }
            };
            info!(producer = %name, id = %id, "Starting producer");
            tasks.spawn(TaskKind::Producer { id, name }, run);
        }

        let mut first_error: Option<StatusError> = None;
        let mut output_failed = false;
        let mut grace_deadline: Option<Instant> = None;
        let mut grace_reported = false;

        while !tasks.is_empty() {
            let joined = tokio::select! {
                biased;

                () = cancel.cancelled(), if grace_deadline.is_none() => {
                    info!(running = tasks.len(), "Canceling tasks");
                    state.send_replace(LifecycleState::Canceling);
                    grace_deadline = Some(Instant::now() + config.shutdown_grace);
                    continue;
                }

                joined = tasks.join_next() => joined,

                () = tokio::time::sleep_until(grace_deadline.unwrap_or_else(Instant::now)),
                    if grace_deadline.is_some() && !grace_reported =>
                {
                    warn!(
                        grace_ms = config.shutdown_grace.as_millis() as u64,
                        tasks = ?tasks.pending_names(),
                        "Tasks still running after shutdown grace period"
                    );
                    grace_reported = true;
                    continue;
                }
            };

            let Some(TaskOutcome { kind, result, .. }) = joined else {
                break;
            };

            match result {
                Ok(()) => match kind {
                    TaskKind::Input if !cancel.is_cancelled() => {
                        info!("Click event stream ended, shutting down");
                        cancel.cancel();
                    }
                    TaskKind::Producer { id, name } if !cancel.is_cancelled() => {
                        info!(producer = %name, "Producer finished, removing its blocks");
                        if bus.deregister(id).is_err() {
                            debug!(producer = %name, "Aggregator already gone");
                        }
                    }
                    TaskKind::Aggregator | TaskKind::Writer if !cancel.is_cancelled() => {
                        warn!(task = %kind, "Task stopped unexpectedly, shutting down");
                        cancel.cancel();
                    }
                    other => debug!(task = %other, "Task stopped"),
                },
                Err(err) => {
                    if kind == TaskKind::Writer {
                        output_failed = true;
                    }
                    if first_error.is_none() {
                        error!(task = %kind, error = %err, "Task failed, shutting down");
                        first_error = Some(err);
                    } else {
                        debug!(task = %kind, error = %err, "Discarding error after first failure");
                    }
                    cancel.cancel();
                }
            }
        }

        // Every task is gone, including the one that might still hold the lock
        let mut sink = writer.lock().await;
        if output_failed {
            debug!("Output failed, not writing closing frame");
        } else if let Err(e) = sink.close().await {
            if first_error.is_none() {
                error!(error = %e, "Failed to close block stream");
                first_error = Some(e);
            }
        }
        drop(sink);

        state.send_replace(LifecycleState::Drained);
        info!(clean = first_error.is_none(), "Status bar drained");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Task Set
// ============================================================================

/// JoinSet that remembers what is still running
#[derive(Default)]
struct Tasks {
    set: JoinSet<TaskOutcome>,
    pending: BTreeMap<usize, TaskKind>,
    next_slot: usize,
}

impl Tasks {
    fn spawn<F>(&mut self, kind: TaskKind, task: F)
    where
        F: Future<Output = Result<(), StatusError>> + Send + 'static,
    {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.pending.insert(slot, kind.clone());

        self.set.spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(StatusError::from_panic(kind.to_string(), payload.as_ref())),
            };
            TaskOutcome { slot, kind, result }
        });
    }

    async fn join_next(&mut self) -> Option<TaskOutcome> {
        let joined = self.set.join_next().await?;
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // Only reachable if the runtime cancels the task; the slot is
                // unknown so fall back to the lowest pending one
                let slot = self.pending.keys().next().copied().unwrap_or_default();
                let kind = self
                    .pending
                    .get(&slot)
                    .cloned()
                    .unwrap_or(TaskKind::Aggregator);
                TaskOutcome {
                    slot,
                    result: Err(StatusError::TaskPanicked {
                        task: kind.to_string(),
                        message: e.to_string(),
                    }),
                    kind,
                }
            }
        };
        self.pending.remove(&outcome.slot);
        Some(outcome)
    }

    fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn pending_names(&self) -> Vec<String> {
        self.pending.values().map(ToString::to_string).collect()
    }
}
