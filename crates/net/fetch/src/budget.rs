/// Tracks how many consecutive non-progressing attempts a task has left.
///
/// The budget is decremented once per failed attempt and restored in full
/// whenever an attempt yields forward progress, so only an unbroken run of
/// failures can exhaust it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    attempts_remaining: u32,
    max_attempts: u32,
}

impl RetryBudget {
    /// Creates a fresh budget allowing `max_attempts` consecutive failures.
    pub const fn new(max_attempts: u32) -> Self {
        Self { attempts_remaining: max_attempts, max_attempts }
    }

    /// Records a failed attempt.
    ///
    /// Returns `true` if the budget is now exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
        self.attempts_remaining == 0
    }

    /// Records forward progress, restoring the full budget.
    pub fn record_progress(&mut self) {
        self.attempts_remaining = self.max_attempts;
    }

    /// The number of failed attempts still allowed.
    pub const fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    /// The configured maximum of consecutive failed attempts.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
