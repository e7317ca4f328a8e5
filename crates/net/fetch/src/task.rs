use crate::{
    budget::RetryBudget,
    config::RetryConfig,
    metrics::RetryingTaskMetrics,
    selector::{PeerSelector, RoundRobin},
    spawn::{TaskSpawner, TokioTaskExecutor},
};
use futures_util::FutureExt;
use parking_lot::Mutex;
use quarry_interfaces::{
    p2p::{
        client::{DataClient, RequestDescriptor},
        error::TaskError,
        response::{AttemptOutcome, MergePolicy, MergeResult},
    },
    peers::PeerId,
};
use std::{
    collections::HashSet,
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{ready, Context, Poll},
    time::Duration,
};
use tokio::{sync::oneshot, time::Sleep};
use tracing::{debug, trace};

/// An asynchronous, retrying request to the peer network.
///
/// The task selects a peer, sends the request, waits a bounded time for the
/// answer and folds partial responses into an accumulated result via its
/// [`MergePolicy`]. Failed attempts consume the [`RetryBudget`] and rotate to
/// another peer; forward progress restores the budget in full. The caller
/// observes a single resolution through the [`TaskHandle`] returned by
/// [`run`](Self::run): the merged data, [`TaskError::MaxRetriesReached`] once
/// the budget is exhausted, or [`TaskError::Cancelled`].
///
/// Attempts are strictly sequential: at most one request is in flight per
/// task at any time. A task with no connected peers does not fail, it keeps
/// re-checking peer availability until one appears or it is cancelled.
pub struct RetryingTask<C: DataClient, M, S = RoundRobin> {
    parts: Option<TaskParts<C, M, S>>,
    cancel_tx: Mutex<Option<oneshot::Sender<()>>>,
    cancel_rx: Option<oneshot::Receiver<()>>,
    done: Arc<AtomicBool>,
}

struct TaskParts<C, M, S> {
    client: C,
    request: RequestDescriptor,
    policy: M,
    selector: S,
    config: RetryConfig,
}

impl<C, M> RetryingTask<C, M, RoundRobin>
where
    C: DataClient,
    M: MergePolicy<Data = C::Data>,
{
    /// Creates a task for `request` with the default configuration and a
    /// round-robin peer selector.
    pub fn new(client: C, request: RequestDescriptor, policy: M) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        Self {
            parts: Some(TaskParts {
                client,
                request,
                policy,
                selector: RoundRobin::default(),
                config: RetryConfig::default(),
            }),
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancel_rx: Some(cancel_rx),
            done: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<C, M, S> RetryingTask<C, M, S>
where
    C: DataClient + Unpin + 'static,
    M: MergePolicy<Data = C::Data>,
    S: PeerSelector,
{
    /// Replaces the task configuration. Has no effect once started.
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        if let Some(parts) = &mut self.parts {
            parts.config = config;
        }
        self
    }

    /// Replaces the peer-selection policy. Has no effect once started.
    pub fn with_selector<S2: PeerSelector>(mut self, selector: S2) -> RetryingTask<C, M, S2> {
        RetryingTask {
            parts: self.parts.take().map(|parts| TaskParts {
                client: parts.client,
                request: parts.request,
                policy: parts.policy,
                selector,
                config: parts.config,
            }),
            cancel_tx: Mutex::new(self.cancel_tx.lock().take()),
            cancel_rx: self.cancel_rx.take(),
            done: self.done.clone(),
        }
    }

    /// Starts the task on the ambient tokio runtime.
    ///
    /// Returns the handle resolving with the task's terminal outcome. Calling
    /// `run` on an already-started task fails with
    /// [`TaskError::AlreadyStarted`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn run(&mut self) -> Result<TaskHandle<C::Data>, TaskError> {
        self.run_with(&TokioTaskExecutor)
    }

    /// Starts the task on the given spawner.
    ///
    /// See [`run`](Self::run).
    pub fn run_with(&mut self, spawner: &impl TaskSpawner) -> Result<TaskHandle<C::Data>, TaskError> {
        let parts = self.parts.take().ok_or(TaskError::AlreadyStarted)?;
        let (resolve_tx, resolve_rx) = oneshot::channel();

        let budget = RetryBudget::new(parts.config.max_retries);
        let driver = TaskDriver {
            client: parts.client,
            request: parts.request,
            policy: parts.policy,
            selector: parts.selector,
            config: parts.config,
            budget,
            accumulated: None,
            failed_peers: HashSet::default(),
            state: AttemptState::Idle { recheck: Box::pin(tokio::time::sleep(Duration::ZERO)) },
            resolve_tx: Some(resolve_tx),
            done: self.done.clone(),
            cancel_rx: self.cancel_rx.take(),
            metrics: RetryingTaskMetrics::default(),
        };
        spawner.spawn(Box::pin(driver));

        Ok(TaskHandle { rx: resolve_rx, done: self.done.clone() })
    }

    /// Cancels the task.
    ///
    /// Cooperative and idempotent: the driver observes the signal before
    /// committing any further peer communication, an attempt already in
    /// flight is abandoned and its result discarded. The handle resolves with
    /// [`TaskError::Cancelled`] if the task has not already reached a
    /// terminal state.
    pub fn cancel(&self) {
        if let Some(tx) = self.cancel_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl<C: DataClient, M, S> fmt::Debug for RetryingTask<C, M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingTask")
            .field("started", &self.parts.is_none())
            .field("done", &self.done.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// The caller-visible handle of a [`RetryingTask`].
///
/// Resolves exactly once, with the merged response data or a [`TaskError`].
#[must_use = "futures do nothing unless polled"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
    done: Arc<AtomicBool>,
}

impl<T> TaskHandle<T> {
    /// Returns `true` once the task has reached a terminal state.
    ///
    /// Non-blocking; never observes intermediate retry activity.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // an abandoned driver counts as cancellation
        Pin::new(&mut self.rx).poll(cx).map(|res| res.unwrap_or(Err(TaskError::Cancelled)))
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("done", &self.is_done()).finish_non_exhaustive()
    }
}

/// The per-attempt state the driver cycles through.
enum AttemptState<F> {
    /// No attempt in flight; waiting for a peer to become available.
    Idle { recheck: Pin<Box<Sleep>> },
    /// A request to `peer` is in flight, raced against the attempt timeout.
    InFlight { peer: PeerId, response: F, timeout: Pin<Box<Sleep>> },
}

/// The single-writer state machine behind a [`RetryingTask`].
///
/// Runs as its own scheduler task and owns all mutable task state; the only
/// cross-task signals are the cancel oneshot and the terminal resolution.
struct TaskDriver<C: DataClient, M, S> {
    client: C,
    request: RequestDescriptor,
    policy: M,
    selector: S,
    config: RetryConfig,
    budget: RetryBudget,
    accumulated: Option<C::Data>,
    /// Peers that timed out or dropped during the current attempt sequence.
    /// Cleared on forward progress.
    failed_peers: HashSet<PeerId>,
    state: AttemptState<C::Output>,
    resolve_tx: Option<oneshot::Sender<Result<C::Data, TaskError>>>,
    done: Arc<AtomicBool>,
    cancel_rx: Option<oneshot::Receiver<()>>,
    metrics: RetryingTaskMetrics,
}

impl<C, M, S> TaskDriver<C, M, S>
where
    C: DataClient + Unpin + 'static,
    M: MergePolicy<Data = C::Data>,
    S: PeerSelector,
{
    /// Returns `true` if cancellation has been requested.
    fn poll_cancelled(&mut self, cx: &mut Context<'_>) -> bool {
        let Some(rx) = self.cancel_rx.as_mut() else { return false };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(())) => true,
            Poll::Ready(Err(_)) => {
                // cancel source dropped without firing, the task can no
                // longer be cancelled
                self.cancel_rx = None;
                false
            }
            Poll::Pending => false,
        }
    }

    /// Returns `true` if the result can no longer be observed.
    fn poll_abandoned(&mut self, cx: &mut Context<'_>) -> bool {
        match self.resolve_tx.as_mut() {
            Some(tx) => tx.poll_closed(cx).is_ready(),
            None => true,
        }
    }

    /// Dispatches the next attempt, or parks the task until a peer connects.
    fn start_next_attempt(&mut self) {
        let connected = self.client.connected_peers();
        match self.next_peer(&connected) {
            Some(peer) => {
                trace!(
                    target: "fetch::task",
                    request_id = self.request.request_id,
                    ?peer,
                    "Dispatching request"
                );
                let response = self.client.send_request(peer, self.request.clone());
                self.state = AttemptState::InFlight {
                    peer,
                    response,
                    timeout: Box::pin(tokio::time::sleep(self.config.request_timeout)),
                };
            }
            None => {
                self.state = AttemptState::Idle {
                    recheck: Box::pin(tokio::time::sleep(self.config.peer_recheck_interval)),
                };
            }
        }
    }

    /// Picks the peer for the next attempt.
    ///
    /// Peers that failed the current attempt sequence are skipped. If that
    /// leaves no candidate and re-selection is enabled, the exclusions are
    /// lifted rather than starving the task on its only peer.
    fn next_peer(&mut self, connected: &[PeerId]) -> Option<PeerId> {
        if let Some(peer) = self.selector.select_peer(connected, &self.failed_peers) {
            return Some(peer)
        }
        if self.config.reselect_failed_peer && !connected.is_empty() {
            self.failed_peers.clear();
            return self.selector.select_peer(connected, &self.failed_peers)
        }
        None
    }

    /// Applies the outcome of one attempt.
    ///
    /// Returns `true` if the task reached a terminal state.
    fn on_attempt_outcome(&mut self, peer: PeerId, outcome: AttemptOutcome<C::Data>) -> bool {
        match outcome {
            AttemptOutcome::Partial(data) | AttemptOutcome::Complete(data) => {
                match self.policy.merge(self.accumulated.take(), data) {
                    MergeResult::Complete(data) => {
                        debug!(
                            target: "fetch::task",
                            request_id = self.request.request_id,
                            ?peer,
                            "Request complete"
                        );
                        self.metrics.completed_tasks.increment(1);
                        self.resolve(Ok(data));
                        true
                    }
                    MergeResult::Progress(data) => {
                        trace!(
                            target: "fetch::task",
                            request_id = self.request.request_id,
                            ?peer,
                            "Response advanced the accumulated result"
                        );
                        self.accumulated = Some(data);
                        self.budget.record_progress();
                        self.failed_peers.clear();
                        self.metrics.progressing_merges.increment(1);
                        self.start_next_attempt();
                        false
                    }
                    MergeResult::NoProgress(accumulated) => {
                        self.accumulated = accumulated;
                        self.fail_attempt(peer, "response added nothing new")
                    }
                }
            }
            AttemptOutcome::Empty => {
                self.metrics.empty_responses.increment(1);
                self.fail_attempt(peer, "empty response")
            }
            AttemptOutcome::TimedOut => {
                self.metrics.timed_out_attempts.increment(1);
                self.client.report_timed_out(peer);
                self.failed_peers.insert(peer);
                self.fail_attempt(peer, "request timed out")
            }
            AttemptOutcome::PeerUnavailable => {
                self.metrics.unavailable_peers.increment(1);
                self.failed_peers.insert(peer);
                self.fail_attempt(peer, "peer unavailable")
            }
        }
    }

    /// Consumes one unit of the retry budget and either fails the task or
    /// dispatches the next attempt.
    ///
    /// Returns `true` if the budget is exhausted.
    fn fail_attempt(&mut self, peer: PeerId, reason: &'static str) -> bool {
        if self.budget.record_failure() {
            debug!(
                target: "fetch::task",
                request_id = self.request.request_id,
                ?peer,
                reason,
                "Retry budget exhausted"
            );
            self.metrics.exhausted_tasks.increment(1);
            self.resolve(Err(TaskError::MaxRetriesReached));
            return true
        }
        trace!(
            target: "fetch::task",
            request_id = self.request.request_id,
            ?peer,
            reason,
            attempts_remaining = self.budget.attempts_remaining(),
            "Attempt failed, retrying"
        );
        self.start_next_attempt();
        false
    }

    /// Resolves the handle.
    ///
    /// The sender is taken before use, so a second terminal signal can never
    /// resolve the handle again.
    fn resolve(&mut self, result: Result<C::Data, TaskError>) {
        if let Some(tx) = self.resolve_tx.take() {
            self.done.store(true, Ordering::Release);
            let _ = tx.send(result);
        }
    }
}

impl<C, M, S> Future for TaskDriver<C, M, S>
where
    C: DataClient + Unpin + 'static,
    M: MergePolicy<Data = C::Data>,
    S: PeerSelector,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // cancellation wins any race with an in-flight attempt
        if this.poll_cancelled(cx) {
            debug!(target: "fetch::task", request_id = this.request.request_id, "Task cancelled");
            this.metrics.cancelled_tasks.increment(1);
            this.resolve(Err(TaskError::Cancelled));
            return Poll::Ready(())
        }
        if this.poll_abandoned(cx) {
            trace!(target: "fetch::task", request_id = this.request.request_id, "Handle dropped, stopping");
            this.resolve(Err(TaskError::Cancelled));
            return Poll::Ready(())
        }

        loop {
            match &mut this.state {
                AttemptState::Idle { recheck } => {
                    ready!(recheck.as_mut().poll(cx));
                    this.start_next_attempt();
                }
                AttemptState::InFlight { peer, response, timeout } => {
                    let peer = *peer;
                    let outcome = match response.poll_unpin(cx) {
                        Poll::Ready(Ok(outcome)) => outcome,
                        Poll::Ready(Err(err)) => err.into(),
                        Poll::Pending => match timeout.as_mut().poll(cx) {
                            // the response loses the race and is dropped
                            Poll::Ready(()) => AttemptOutcome::TimedOut,
                            Poll::Pending => return Poll::Pending,
                        },
                    };
                    if this.on_attempt_outcome(peer, outcome) {
                        return Poll::Ready(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::RangeMerge;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use quarry_interfaces::{p2p::error::RequestError, test_utils::TestDataClient};
    use std::collections::BTreeMap;

    type TestData = BTreeMap<u64, u64>;
    type TestTask = RetryingTask<TestDataClient<TestData>, RangeMerge<u64>>;

    fn items(range: std::ops::RangeInclusive<u64>) -> TestData {
        range.map(|n| (n, n * 10)).collect()
    }

    fn full() -> TestData {
        items(0..=3)
    }

    fn task(client: &TestDataClient<TestData>, max_retries: u32) -> TestTask {
        let request = RequestDescriptor::new(1, Bytes::from_static(b"headers 0..=3"));
        RetryingTask::new(client.clone(), request, RangeMerge::new(0..=3))
            .with_config(RetryConfig { max_retries, ..Default::default() })
    }

    #[tokio::test(start_paused = true)]
    async fn completes_via_accumulated_partial_responses() {
        let client = TestDataClient::default().with_random_peers(1);
        for n in 0..=3 {
            client.queue_outcome(AttemptOutcome::Partial(items(n..=n)));
        }

        let handle = task(&client, 3).run().unwrap();
        assert_eq!(handle.await, Ok(full()));
        assert_eq!(client.times_requested(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_after_max_consecutive_empty_responses() {
        let client = TestDataClient::default().with_random_peers(1);
        for _ in 0..3 {
            client.queue_outcome(AttemptOutcome::Empty);
        }

        let handle = task(&client, 3).run().unwrap();
        assert_eq!(handle.await, Err(TaskError::MaxRetriesReached));
        assert_eq!(client.times_requested(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stays_running_below_the_retry_limit() {
        let client = TestDataClient::default().with_random_peers(1);
        client.queue_outcome(AttemptOutcome::Empty);
        client.queue_outcome(AttemptOutcome::Empty);
        client.queue_stall();

        let handle = task(&client, 3).run().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_done());
        assert_eq!(client.times_requested(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn forward_progress_restores_the_budget() {
        let client = TestDataClient::default().with_random_peers(1);
        client.queue_outcome(AttemptOutcome::Empty);
        client.queue_outcome(AttemptOutcome::Empty);
        client.queue_outcome(AttemptOutcome::Partial(items(0..=0)));
        for _ in 0..3 {
            client.queue_outcome(AttemptOutcome::Empty);
        }

        let handle = task(&client, 3).run().unwrap();
        assert_eq!(handle.await, Err(TaskError::MaxRetriesReached));
        // without the reset the budget would have run out after four attempts
        assert_eq!(client.times_requested(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn no_peers_means_waiting_not_failure() {
        let client = TestDataClient::<TestData>::default();

        let mut task = task(&client, 3);
        let handle = task.run().unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!handle.is_done());
        assert_eq!(client.times_requested(), 0);

        task.cancel();
        assert_eq!(handle.await, Err(TaskError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn completes_once_a_peer_connects() {
        let client = TestDataClient::default();
        client.queue_outcome(AttemptOutcome::Complete(full()));

        let handle = task(&client, 3).run().unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!handle.is_done());

        client.set_peers(vec![PeerId::random()]);
        assert_eq!(handle.await, Ok(full()));
        assert_eq!(client.times_requested(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_to_another_peer_after_a_timeout() {
        let (first, second) = (PeerId::random(), PeerId::random());
        let client = TestDataClient::default();
        client.set_peers(vec![first, second]);
        client.queue_stall();
        client.queue_outcome(AttemptOutcome::Complete(full()));

        let handle = task(&client, 3).run().unwrap();
        assert_eq!(handle.await, Ok(full()));
        assert_eq!(client.requested_peers(), vec![first, second]);
        assert_eq!(client.timed_out_peers(), vec![first]);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_peer_rotates_without_timeout_report() {
        let (first, second) = (PeerId::random(), PeerId::random());
        let client = TestDataClient::default();
        client.set_peers(vec![first, second]);
        client.queue_error(RequestError::ConnectionDropped);
        client.queue_outcome(AttemptOutcome::Complete(full()));

        let handle = task(&client, 3).run().unwrap();
        assert_eq!(handle.await, Ok(full()));
        assert_eq!(client.requested_peers(), vec![first, second]);
        assert!(client.timed_out_peers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lone_failed_peer_is_reselected() {
        let peer = PeerId::random();
        let client = TestDataClient::default();
        client.set_peers(vec![peer]);
        client.queue_stall();
        client.queue_outcome(AttemptOutcome::Complete(full()));

        let handle = task(&client, 3).run().unwrap();
        assert_eq!(handle.await, Ok(full()));
        assert_eq!(client.requested_peers(), vec![peer, peer]);
        assert_eq!(client.timed_out_peers(), vec![peer]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_a_new_peer_when_reselection_is_disabled() {
        let peer = PeerId::random();
        let client = TestDataClient::<TestData>::default();
        client.set_peers(vec![peer]);
        client.queue_stall();

        let request = RequestDescriptor::new(1, Bytes::from_static(b"headers 0..=3"));
        let mut task = RetryingTask::new(client.clone(), request, RangeMerge::new(0..=3))
            .with_config(RetryConfig {
                max_retries: 3,
                reselect_failed_peer: false,
                ..Default::default()
            });
        let handle = task.run().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.is_done());
        assert_eq!(client.times_requested(), 1);

        task.cancel();
        assert_eq!(handle.await, Err(TaskError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_partial_consumes_the_budget() {
        let client = TestDataClient::default().with_random_peers(1);
        for _ in 0..3 {
            client.queue_outcome(AttemptOutcome::Partial(items(0..=0)));
        }

        let handle = task(&client, 2).run().unwrap();
        assert_eq!(handle.await, Err(TaskError::MaxRetriesReached));
        assert_eq!(client.times_requested(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_attempts_after_completion() {
        let client = TestDataClient::default().with_random_peers(1);
        client.queue_outcome(AttemptOutcome::Complete(full()));
        client.queue_outcome(AttemptOutcome::Complete(items(0..=1)));

        let handle = task(&client, 3).run().unwrap();
        assert_eq!(handle.await, Ok(full()));
        assert_eq!(client.times_requested(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn running_twice_is_an_error() {
        let client = TestDataClient::<TestData>::default().with_random_peers(1);
        let mut task = task(&client, 3);
        let _handle = task.run().unwrap();
        assert_matches!(task.run(), Err(TaskError::AlreadyStarted));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_run_resolves_cancelled() {
        let client = TestDataClient::<TestData>::default().with_random_peers(1);
        client.queue_outcome(AttemptOutcome::Complete(full()));

        let mut task = task(&client, 3);
        task.cancel();
        let handle = task.run().unwrap();
        assert_eq!(handle.await, Err(TaskError::Cancelled));
        assert_eq!(client.times_requested(), 0);
    }
}
