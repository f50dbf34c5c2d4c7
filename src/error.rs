//! Crate-wide error type.
//!
//! Every fallible operation in this crate surfaces through [`AmiError`]
//! rather than ad hoc `String`s: one `thiserror` enum wraps transport and
//! protocol failures alike.

use std::io;

/// All error kinds the AMI engine can produce.
///
/// Per-action errors (`ActionFailed`, `ProtocolError`, `Timeout`,
/// `Cancelled`) are delivered only to the waiter of the action that caused
/// them. `Network` and `Disconnected` are broadcast to every pending action
/// when the reader observes a socket failure.
#[derive(Debug, thiserror::Error)]
pub enum AmiError {
    /// Connect, read, or write failure at the socket layer.
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// The session dropped while this action was still pending.
    #[error("disconnected")]
    Disconnected,

    /// Malformed packet, or a shape invariant was violated
    /// (e.g. a `QueueMember` event arrived before any `QueueParams`).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with `Response: Error` (or, for an `ack` shape,
    /// a literal other than the one the shape expects).
    #[error("action failed{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    ActionFailed { message: Option<String> },

    /// The action's deadline expired before it completed.
    #[error("timeout")]
    Timeout,

    /// The caller cancelled the action before it completed.
    #[error("cancelled")]
    Cancelled,

    /// A header value contained `\r`/`\n`, or a required argument was
    /// missing at the action surface.
    #[error("validation error: {0}")]
    Validation(String),
}

impl AmiError {
    pub fn action_failed(message: impl Into<Option<String>>) -> Self {
        AmiError::ActionFailed {
            message: message.into(),
        }
    }
}
