//! Inbound Click Event Stream
//!
//! The bar writes an endless JSON array on our stdin:
//!
//! ```text
//! [
//! {"name":"00-time","instance":"","button":1,...}
//! ,{"name":"30-net","instance":"eth0","button":3,...}
//! ...
//! ```
//!
//! The array is never materialized. [`ClickEventDecoder`] buffers raw bytes
//! and yields one event at a time as soon as a complete object is available;
//! [`ClickEventReader`] feeds it from an `AsyncRead`.
//!
//! # Security
//!
//! - A single event larger than [`MAX_EVENT_SIZE`] is rejected
//! - The buffer is compacted as events are consumed

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::StatusError;
use crate::events::ClickEvent;

/// Maximum size of one pending event (64 KB)
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Read chunk size
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for the opening `[`
    AwaitingOpen,
    /// Inside the array, between or before events
    InArray,
    /// Saw the closing `]`
    Closed,
}

/// Incremental decoder for the click event array
#[derive(Debug)]
pub struct ClickEventDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    state: DecoderState,
}

impl Default for ClickEventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClickEventDecoder {
    /// Create a decoder expecting the opening bracket
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            state: DecoderState::AwaitingOpen,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Whether the closing `]` has been seen
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == DecoderState::Closed
    }

    /// Whether buffered bytes hold anything besides whitespace
    #[must_use]
    pub fn has_pending_data(&self) -> bool {
        self.buffer[self.read_pos..]
            .iter()
            .any(|b| !b.is_ascii_whitespace())
    }

    /// Try to decode the next event
    ///
    /// Returns:
    /// - `Ok(Some(event))` if a complete event was decoded
    /// - `Ok(None)` if more data is needed, or the array is closed
    /// - `Err(StatusError::Decode)` if the stream is malformed
    pub fn decode(&mut self) -> Result<Option<ClickEvent>, StatusError> {
        loop {
            self.skip_whitespace();
            let Some(&next) = self.buffer.get(self.read_pos) else {
                return Ok(None);
            };

            match self.state {
                DecoderState::Closed => return Ok(None),
                DecoderState::AwaitingOpen => {
                    if next != b'[' {
                        return Err(StatusError::Decode(format!(
                            "expected '[' at start of stream, found {:?}",
                            char::from(next)
                        )));
                    }
                    self.read_pos += 1;
                    self.state = DecoderState::InArray;
                }
                DecoderState::InArray => match next {
                    b',' => self.read_pos += 1,
                    b']' => {
                        self.read_pos += 1;
                        self.state = DecoderState::Closed;
                        return Ok(None);
                    }
                    _ => return self.decode_event(),
                },
            }
        }
    }

    fn decode_event(&mut self) -> Result<Option<ClickEvent>, StatusError> {
        let pending = &self.buffer[self.read_pos..];
        let mut stream = serde_json::Deserializer::from_slice(pending).into_iter::<ClickEvent>();

        match stream.next() {
            Some(Ok(event)) => {
                self.read_pos += stream.byte_offset();
                Ok(Some(event))
            }
            Some(Err(e)) if e.is_eof() => {
                if pending.len() > MAX_EVENT_SIZE {
                    return Err(StatusError::Decode(format!(
                        "click event exceeds {MAX_EVENT_SIZE} bytes"
                    )));
                }
                Ok(None)
            }
            Some(Err(e)) => Err(StatusError::Decode(e.to_string())),
            None => Ok(None),
        }
    }

    fn skip_whitespace(&mut self) {
        while self
            .buffer
            .get(self.read_pos)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.read_pos += 1;
        }
    }
}

/// Reads click events from an async byte stream
pub struct ClickEventReader<R> {
    reader: R,
    decoder: ClickEventDecoder,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> ClickEventReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: ClickEventDecoder::new(),
            chunk: vec![0; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Read the next event
    ///
    /// Returns `Ok(None)` at the end of the stream: either the closing `]` or
    /// end-of-input between events. End-of-input in the middle of an event is
    /// a decode error.
    ///
    /// Cancel safe: dropping the future loses no buffered bytes.
    pub async fn next_event(&mut self) -> Result<Option<ClickEvent>, StatusError> {
        loop {
            if let Some(event) = self.decoder.decode()? {
                return Ok(Some(event));
            }
            if self.decoder.is_closed() {
                return Ok(None);
            }

            let n = self
                .reader
                .read(&mut self.chunk)
                .await
                .map_err(StatusError::Input)?;
            if n == 0 {
                if self.decoder.has_pending_data() {
                    return Err(StatusError::Decode(
                        "input ended inside a click event".to_string(),
                    ));
                }
                return Ok(None);
            }
            self.decoder.push(&self.chunk[..n]);
        }
    }
}
