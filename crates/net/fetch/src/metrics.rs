use metrics::{counter, Counter};

/// Counters for retrying-task attempt outcomes.
#[derive(Clone)]
pub(crate) struct RetryingTaskMetrics {
    /// Number of attempts that yielded no usable data.
    pub(crate) empty_responses: Counter,
    /// Number of attempts that timed out.
    pub(crate) timed_out_attempts: Counter,
    /// Number of attempts that ended with the peer unavailable.
    pub(crate) unavailable_peers: Counter,
    /// Number of merges that advanced the accumulated result.
    pub(crate) progressing_merges: Counter,
    /// Number of tasks that completed successfully.
    pub(crate) completed_tasks: Counter,
    /// Number of tasks that failed with an exhausted retry budget.
    pub(crate) exhausted_tasks: Counter,
    /// Number of tasks that were cancelled.
    pub(crate) cancelled_tasks: Counter,
}

impl Default for RetryingTaskMetrics {
    fn default() -> Self {
        Self {
            empty_responses: counter!("fetch_empty_responses"),
            timed_out_attempts: counter!("fetch_timed_out_attempts"),
            unavailable_peers: counter!("fetch_unavailable_peers"),
            progressing_merges: counter!("fetch_progressing_merges"),
            completed_tasks: counter!("fetch_completed_tasks"),
            exhausted_tasks: counter!("fetch_exhausted_tasks"),
            cancelled_tasks: counter!("fetch_cancelled_tasks"),
        }
    }
}
