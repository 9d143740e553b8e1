//! Error types for the PPP negotiation stack.

use thiserror::Error;

/// Result type alias using [`PppError`].
pub type Result<T> = std::result::Result<T, PppError>;

/// Errors reported by the PPP stack.
///
/// Errors raised while processing an inbound packet never tear the link
/// down by themselves: the offending packet is dropped and the automata
/// keep their state. Errors returned from the public API (`connect`,
/// `close`, ...) describe why the operation could not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PppError {
    /// The declared length of a packet or option is inconsistent with the
    /// received data. The packet is dropped without any state change.
    #[error("malformed packet")]
    MalformedPacket,

    /// A reply carries an identifier that does not match the outstanding
    /// request. The packet is dropped without any state change.
    #[error("identifier does not match the outstanding request")]
    WrongIdentifier,

    /// The message is well formed but not acceptable in the current
    /// negotiation state (e.g. a CHAP Response while no Challenge is
    /// pending on our side).
    #[error("message not expected in the current state")]
    UnexpectedMessage,

    /// The peer rejected our credentials or a non-negotiable option; the
    /// link is being closed.
    #[error("request rejected by the peer")]
    RequestRejected,

    /// A retry budget or a caller-supplied deadline was exhausted.
    #[error("operation timed out")]
    Timeout,

    /// The link negotiation failed and the session fell back to the Dead
    /// phase.
    #[error("connection failed")]
    ConnectionFailed,

    /// The operation requires the Dead phase but the link is in use.
    #[error("link is already connected")]
    AlreadyConnected,

    /// The operation requires an established link.
    #[error("link is not connected")]
    NotConnected,

    /// The transport does not implement the requested operation.
    #[error("operation not supported by the transport")]
    NotSupported,

    /// The transport failed to accept an outbound frame.
    #[error("transport error: {0}")]
    Transport(String),
}

impl PppError {
    /// Create a transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
}
