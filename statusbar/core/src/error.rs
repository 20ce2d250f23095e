//! Error Types
//!
//! [`StatusError`] is the fatal error of a run: the supervisor keeps the first
//! one it sees and returns it once every task has stopped. [`EmitError`] is
//! what a producer gets back from its [`Emitter`](crate::emitter::Emitter).

use thiserror::Error;

/// Fatal errors that end a status bar run
#[derive(Debug, Error)]
pub enum StatusError {
    /// A producer task returned an error
    #[error("producer `{name}` failed")]
    Producer {
        /// Producer name
        name: String,
        /// What the producer reported
        #[source]
        source: anyhow::Error,
    },

    /// A task panicked
    #[error("task `{task}` panicked: {message}")]
    TaskPanicked {
        /// Task description
        task: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// The inbound click event stream is malformed
    #[error("malformed click event stream: {0}")]
    Decode(String),

    /// Reading the inbound click event stream failed
    #[error("failed to read click events: {0}")]
    Input(#[source] std::io::Error),

    /// Writing the block stream failed
    #[error("failed to write block stream: {0}")]
    Output(#[source] std::io::Error),

    /// A snapshot could not be serialized
    #[error("failed to encode blocks: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StatusError {
    /// Build a `TaskPanicked` error from a panic payload
    pub fn from_panic(task: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::TaskPanicked {
            task: task.into(),
            message,
        }
    }
}

/// Errors returned to producers when they emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The block (or key) has no name
    #[error("block has no name")]
    EmptyName,

    /// The aggregator is gone; the bar is shutting down
    #[error("status bar is shut down")]
    Closed,
}
