//! Error types for the dialer engine.

use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, DialerError>;

/// Errors surfaced by the dialer engine.
///
/// Event handlers never return these to their caller; the dispatch wrapper
/// logs and swallows them. They exist so the internals can propagate with `?`
/// and so embedders driving the engine directly get a typed failure.
#[derive(Error, Debug)]
pub enum DialerError {
    /// A worker queue was closed or rejected a message.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Call record persistence failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl DialerError {
    /// Create a queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        DialerError::Queue(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        DialerError::Database(msg.into())
    }
}
