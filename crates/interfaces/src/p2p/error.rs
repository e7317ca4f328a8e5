use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Result alias for the result of a single request.
pub type RequestResult<T> = Result<T, RequestError>;

/// Error variants that can happen when sending a request to a peer session.
///
/// These are attempt-level signals: the retry state machine absorbs them and
/// converts them into retry or rotate decisions. They are never surfaced to
/// the caller of a task directly, see [`TaskError`].
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum RequestError {
    /// Closed channel to the peer.
    #[error("closed channel to the peer")]
    ChannelClosed,
    /// Connection to the peer dropped while the request was in flight.
    #[error("connection to a peer dropped while handling the request")]
    ConnectionDropped,
    /// The request timed out while awaiting a response.
    #[error("request timed out while awaiting response")]
    Timeout,
    /// The peer answered with a response that could not be used.
    #[error("received bad response")]
    BadResponse,
}

// === impl RequestError ===

impl RequestError {
    /// Indicates whether this error is retryable or fatal.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionDropped)
    }

    /// Whether the error happened because the channel was closed.
    pub const fn is_channel_closed(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }
}

impl<T> From<mpsc::error::SendError<T>> for RequestError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<oneshot::error::RecvError> for RequestError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}

/// Terminal errors a retrying task can resolve with.
///
/// This is the complete caller-visible failure surface: attempt-level
/// failures never cross the task boundary, only budget exhaustion,
/// cancellation and misuse do.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TaskError {
    /// Consecutive non-progressing attempts reached the configured maximum.
    #[error("reached the maximum number of retries without progress")]
    MaxRetriesReached,
    /// The task was explicitly cancelled before it could complete.
    #[error("task was cancelled")]
    Cancelled,
    /// The task was started more than once.
    #[error("task was already started")]
    AlreadyStarted,
}
