use crate::{
    p2p::{error::RequestResult, response::AttemptOutcome},
    peers::PeerId,
};
use bytes::Bytes;
use std::future::Future;

/// An immutable description of the data being requested.
///
/// The payload is opaque to the engine; only the networking layer and the
/// merge policy interpret it. Created once by the caller and cloned per
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Identifies the logical request across all of its attempts.
    pub request_id: u64,
    /// Opaque request payload forwarded to the peer.
    pub payload: Bytes,
}

impl RequestDescriptor {
    /// Creates a new descriptor.
    pub const fn new(request_id: u64, payload: Bytes) -> Self {
        Self { request_id, payload }
    }
}

/// Generic capabilities every download client exposes in addition to sending
/// requests.
pub trait DownloadClient: Send + Sync {
    /// Returns a snapshot of the currently connected peers.
    ///
    /// The underlying registry is mutated by the connection-management layer;
    /// each call observes an externally-synchronized snapshot.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Signals that `peer` failed to answer a request within the time bound.
    ///
    /// This is the only peer-quality feedback the engine emits.
    fn report_timed_out(&self, peer: PeerId);
}

/// The request capability the networking layer must supply.
///
/// Implementations are expected to encode the descriptor onto the wire and
/// resolve the returned future with the peer's terminal answer. Timeouts are
/// raced by the caller's own timer, so the future may stay pending forever
/// for an unresponsive peer.
pub trait DataClient: DownloadClient {
    /// The response data type.
    type Data: Send + Unpin + 'static;

    /// The future resolving with the peer's answer to one request.
    type Output: Future<Output = RequestResult<AttemptOutcome<Self::Data>>> + Send + Unpin;

    /// Sends `request` to `peer` and returns the in-flight response.
    fn send_request(&self, peer: PeerId, request: RequestDescriptor) -> Self::Output;
}
