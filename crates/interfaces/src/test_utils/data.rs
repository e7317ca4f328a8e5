//! Testing support for the data-client interfaces.

use crate::{
    p2p::{
        client::{DataClient, DownloadClient, RequestDescriptor},
        error::{RequestError, RequestResult},
        response::AttemptOutcome,
    },
    peers::PeerId,
};
use futures::future;
use parking_lot::Mutex;
use std::{collections::VecDeque, future::Future, pin::Pin, sync::Arc};

/// One scripted answer the [`TestDataClient`] plays back for a request.
#[derive(Debug, Clone)]
pub enum ScriptedResponse<T> {
    /// Resolve the request immediately with the given result.
    Respond(RequestResult<AttemptOutcome<T>>),
    /// Never resolve the request, emulating a silent peer.
    Stall,
}

/// A test client that plays back a scripted sequence of responses.
///
/// Responses are consumed in FIFO order, one per request, regardless of which
/// peer the request targets. An exhausted script behaves like
/// [`ScriptedResponse::Stall`].
#[derive(Debug, Clone)]
pub struct TestDataClient<T> {
    peers: Arc<Mutex<Vec<PeerId>>>,
    responses: Arc<Mutex<VecDeque<ScriptedResponse<T>>>>,
    requested: Arc<Mutex<Vec<PeerId>>>,
    timed_out: Arc<Mutex<Vec<PeerId>>>,
}

impl<T> Default for TestDataClient<T> {
    fn default() -> Self {
        Self {
            peers: Default::default(),
            responses: Default::default(),
            requested: Default::default(),
            timed_out: Default::default(),
        }
    }
}

impl<T> TestDataClient<T> {
    /// Adds `count` random peers to the connected set.
    pub fn with_random_peers(self, count: usize) -> Self {
        self.peers.lock().extend(std::iter::repeat_with(PeerId::random).take(count));
        self
    }

    /// Replaces the connected peer set.
    pub fn set_peers(&self, peers: Vec<PeerId>) {
        *self.peers.lock() = peers;
    }

    /// Queues an outcome to answer the next request with.
    pub fn queue_outcome(&self, outcome: AttemptOutcome<T>) {
        self.responses.lock().push_back(ScriptedResponse::Respond(Ok(outcome)));
    }

    /// Queues a transport error to answer the next request with.
    pub fn queue_error(&self, err: RequestError) {
        self.responses.lock().push_back(ScriptedResponse::Respond(Err(err)));
    }

    /// Queues a request that never resolves.
    pub fn queue_stall(&self) {
        self.responses.lock().push_back(ScriptedResponse::Stall);
    }

    /// The number of requests the client has served so far.
    pub fn times_requested(&self) -> usize {
        self.requested.lock().len()
    }

    /// The peers each request targeted, in request order.
    pub fn requested_peers(&self) -> Vec<PeerId> {
        self.requested.lock().clone()
    }

    /// The peers reported as timed out, in report order.
    pub fn timed_out_peers(&self) -> Vec<PeerId> {
        self.timed_out.lock().clone()
    }
}

impl<T: Send + Sync + 'static> DownloadClient for TestDataClient<T> {
    fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.lock().clone()
    }

    fn report_timed_out(&self, peer: PeerId) {
        self.timed_out.lock().push(peer);
    }
}

impl<T: Send + Sync + Unpin + 'static> DataClient for TestDataClient<T> {
    type Data = T;
    type Output = Pin<Box<dyn Future<Output = RequestResult<AttemptOutcome<T>>> + Send>>;

    fn send_request(&self, peer: PeerId, _request: RequestDescriptor) -> Self::Output {
        self.requested.lock().push(peer);
        match self.responses.lock().pop_front() {
            Some(ScriptedResponse::Respond(res)) => Box::pin(future::ready(res)),
            Some(ScriptedResponse::Stall) | None => Box::pin(future::pending()),
        }
    }
}
