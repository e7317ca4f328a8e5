use crate::p2p::error::RequestError;

/// The outcome of a single request/response round trip with one peer.
///
/// `Empty`, `TimedOut` and `PeerUnavailable` are consumed by the retry state
/// machine; only `Partial` and `Complete` carry data into the merge policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<T> {
    /// The peer responded but returned no usable data.
    Empty,
    /// The peer returned some, but not all, of the requested data.
    Partial(T),
    /// The peer returned data that fully satisfies the request.
    Complete(T),
    /// No response arrived within the attempt's time bound.
    TimedOut,
    /// The peer disconnected or otherwise became unreachable mid-request.
    PeerUnavailable,
}

impl<T> AttemptOutcome<T> {
    /// Returns the data payload, if the outcome carries one.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Partial(data) | Self::Complete(data) => Some(data),
            Self::Empty | Self::TimedOut | Self::PeerUnavailable => None,
        }
    }
}

impl<T> From<RequestError> for AttemptOutcome<T> {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Timeout => Self::TimedOut,
            RequestError::ChannelClosed | RequestError::ConnectionDropped => Self::PeerUnavailable,
            RequestError::BadResponse => Self::Empty,
        }
    }
}

/// The result of folding one response payload into the accumulated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult<T> {
    /// The incoming payload strictly extended the accumulated result.
    Progress(T),
    /// The incoming payload added nothing new. Carries the accumulated
    /// result back unchanged.
    NoProgress(Option<T>),
    /// The accumulated result now fully satisfies the request.
    Complete(T),
}

impl<T> MergeResult<T> {
    /// Returns the accumulated value the result carries, if any.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Progress(data) | Self::Complete(data) => Some(data),
            Self::NoProgress(data) => data,
        }
    }
}

/// Decides whether a response is complete enough and how partial responses
/// combine, per request-data type.
///
/// This is the only data-type-specific piece of the engine; the orchestrator
/// is generic over it. Implementations must converge to the same complete
/// result regardless of the order partial payloads arrive in, and re-delivery
/// of an already-incorporated payload must be a no-op reported as
/// [`MergeResult::NoProgress`], not an error.
pub trait MergePolicy: Send + Unpin + 'static {
    /// The accumulated response data type.
    type Data: Send + 'static;

    /// Folds `incoming` into `accumulated`.
    ///
    /// Takes the accumulated value by move and hands it back through the
    /// returned [`MergeResult`], keeping each merge a pure replacement.
    fn merge(&mut self, accumulated: Option<Self::Data>, incoming: Self::Data)
        -> MergeResult<Self::Data>;
}
