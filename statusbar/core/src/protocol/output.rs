//! Outbound Block Stream
//!
//! Wire format written on stdout:
//!
//! ```text
//! {"version":1,"click_events":true}      <- header, one line
//! [                                      <- opens the endless array
//! [{"full_text":"12:00","name":"00-time"}]
//! ,[{"full_text":"12:01","name":"00-time"}]
//! ...
//! ]                                      <- written on shutdown
//! ```
//!
//! Each snapshot is serialized into one buffer and written with a single
//! `write_all`, then flushed, so the bar never sees half a snapshot followed
//! by a stall.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::aggregator::Snapshot;
use crate::block::Header;
use crate::error::StatusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Nothing written yet
    Fresh,
    /// Header and `[` written
    Open {
        /// Whether at least one snapshot was written
        wrote_snapshot: bool,
    },
    /// Closing `]` written (or never opened)
    Closed,
}

/// Serializes snapshots onto the block stream
pub struct SnapshotWriter<W> {
    inner: W,
    state: WriterState,
    snapshots_written: u64,
    last_generation: Option<u64>,
}

impl<W: AsyncWrite + Unpin> SnapshotWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: WriterState::Fresh,
            snapshots_written: 0,
            last_generation: None,
        }
    }

    /// Write the header and open the body array
    pub async fn open(&mut self, header: &Header) -> Result<(), StatusError> {
        if self.state != WriterState::Fresh {
            return Err(StatusError::Output(io::Error::other(
                "block stream already opened",
            )));
        }

        let mut buf = serde_json::to_vec(header)?;
        buf.extend_from_slice(b"\n[\n");
        self.write_frame(&buf).await?;

        self.state = WriterState::Open {
            wrote_snapshot: false,
        };
        debug!(click_events = header.click_events, "Block stream opened");
        Ok(())
    }

    /// Write one snapshot
    ///
    /// A snapshot whose generation is not newer than the last one written is
    /// skipped.
    pub async fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StatusError> {
        let WriterState::Open { wrote_snapshot } = self.state else {
            return Err(StatusError::Output(io::Error::other(
                "block stream is not open",
            )));
        };
        if self
            .last_generation
            .is_some_and(|last| snapshot.generation <= last)
        {
            trace!(generation = snapshot.generation, "Stale snapshot skipped");
            return Ok(());
        }

        let mut buf = Vec::with_capacity(256);
        if wrote_snapshot {
            buf.push(b',');
        }
        serde_json::to_writer(&mut buf, snapshot.blocks.as_slice())?;
        buf.push(b'\n');
        self.write_frame(&buf).await?;

        self.state = WriterState::Open {
            wrote_snapshot: true,
        };
        self.snapshots_written += 1;
        self.last_generation = Some(snapshot.generation);
        trace!(
            generation = snapshot.generation,
            blocks = snapshot.len(),
            "Snapshot written"
        );
        Ok(())
    }

    /// Terminate the body array and shut the writer down
    ///
    /// Idempotent. Closing a stream that was never opened writes nothing.
    pub async fn close(&mut self) -> Result<(), StatusError> {
        match self.state {
            WriterState::Closed => return Ok(()),
            WriterState::Fresh => {
                self.state = WriterState::Closed;
                return Ok(());
            }
            WriterState::Open { .. } => {}
        }

        // Refuse further writes even if the final frame fails
        self.state = WriterState::Closed;
        self.write_frame(b"]\n").await?;
        self.inner.shutdown().await.map_err(StatusError::Output)?;
        debug!(snapshots = self.snapshots_written, "Block stream closed");
        Ok(())
    }

    /// Whether the closing frame has been written
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == WriterState::Closed
    }

    /// Number of snapshots written so far
    #[must_use]
    pub fn snapshots_written(&self) -> u64 {
        self.snapshots_written
    }

    /// Access the wrapped writer
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    async fn write_frame(&mut self, buf: &[u8]) -> Result<(), StatusError> {
        self.inner
            .write_all(buf)
            .await
            .map_err(StatusError::Output)?;
        self.inner.flush().await.map_err(StatusError::Output)
    }
}
