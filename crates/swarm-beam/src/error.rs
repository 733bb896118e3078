//! Beam error types.

use thiserror::Error;

/// Result type alias for send, receive, and close operations.
pub type BeamResult<T> = Result<T, BeamError>;

/// Errors surfaced by endpoints and composition layers.
///
/// Errors are `Clone` because a single close is reported to every party
/// blocked on the pipe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeamError {
    /// The receiving end went away: nobody will ever read this message.
    #[error("pipe closed by reader")]
    ReaderClosed,

    /// The sending end finished normally. Expected termination.
    #[error("end of stream")]
    EndOfStream,

    /// Operation attempted on an endpoint whose own side is closed.
    #[error("read/write on closed pipe")]
    ClosedPipe,

    /// Fast-path relay does not recognize the destination.
    #[error("incompatible sender")]
    IncompatibleSender,

    /// Fast-path relay does not recognize the source.
    #[error("incompatible receiver")]
    IncompatibleReceiver,

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("malformed register request: {0}")]
    MalformedRegister(String),

    /// Caller-supplied close reason.
    #[error("{0}")]
    Custom(String),
}

impl BeamError {
    pub fn custom(reason: impl Into<String>) -> Self {
        BeamError::Custom(reason.into())
    }

    /// True for the clean end-of-stream termination.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, BeamError::EndOfStream)
    }
}

/// Result of a relay: the number of messages moved.
pub type RelayResult = Result<usize, RelayError>;

/// A relay that stopped early, with the count it managed before failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("relay aborted after {copied} message(s): {source}")]
pub struct RelayError {
    pub copied: usize,
    #[source]
    pub source: BeamError,
}

impl RelayError {
    pub fn new(copied: usize, source: BeamError) -> Self {
        Self { copied, source }
    }

    /// True when a fast path declined the relay and the generic loop
    /// should run instead.
    pub(crate) fn is_incompatible(&self) -> bool {
        self.copied == 0
            && matches!(
                self.source,
                BeamError::IncompatibleSender | BeamError::IncompatibleReceiver
            )
    }
}
