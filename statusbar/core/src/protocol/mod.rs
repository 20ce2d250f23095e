//! Bar Protocol Boundary
//!
//! Codecs and boundary tasks for the swaybar / i3bar JSON protocol:
//! - [`input`]: incremental decoding of the click event array on stdin
//! - [`output`]: framing of the header and snapshot arrays on stdout
//!
//! The two task functions here are what the supervisor spawns. Both select on
//! the cancellation token first, so once shutdown starts neither of them
//! touches its stream again.

pub mod input;
pub mod output;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use input::{ClickEventDecoder, ClickEventReader, MAX_EVENT_SIZE};
pub use output::SnapshotWriter;

use crate::aggregator::Snapshot;
use crate::error::StatusError;
use crate::events::ClickEvent;

/// Read click events and forward them to the aggregator
///
/// Returns `Ok(())` when the bar closes the stream or on cancellation.
pub async fn forward_clicks<R>(
    input: R,
    clicks: mpsc::Sender<ClickEvent>,
    cancel: CancellationToken,
) -> Result<(), StatusError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = ClickEventReader::new(input);
    let mut forwarded: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            next = reader.next_event() => next?,
        };

        let Some(event) = next else {
            info!(forwarded = forwarded, "Click event stream closed");
            return Ok(());
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            sent = clicks.send(event) => {
                if sent.is_err() {
                    debug!("Aggregator gone, dropping click events");
                    return Ok(());
                }
                forwarded += 1;
            }
        }
    }
}

/// Write every snapshot the aggregator publishes
///
/// Only the latest pending snapshot is written; older ones are superseded.
/// The writer is shared with the supervisor, which closes it after all tasks
/// have drained.
pub async fn write_snapshots<W>(
    writer: Arc<Mutex<SnapshotWriter<W>>>,
    mut snapshots: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
) -> Result<(), StatusError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            changed = snapshots.changed() => {
                if changed.is_err() {
                    debug!("Snapshot channel closed");
                    return Ok(());
                }
                let snapshot = snapshots.borrow_and_update().clone();

                let mut writer = writer.lock().await;
                if cancel.is_cancelled() {
                    return Ok(());
                }
                writer.write_snapshot(&snapshot).await?;
            }
        }
    }
}
