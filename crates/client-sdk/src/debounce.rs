use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// A value whose committed copy trails the latest input by a quiet period.
///
/// Every `set` cancels the previously scheduled commit and schedules a new one
/// `quiet` after now; only the last value written before a full quiet window
/// becomes visible through [`Debounced::committed`].
#[derive(Debug, Clone)]
pub struct Debounced<T> {
    quiet: Duration,
    latest: T,
    committed: T,
    deadline: Option<Instant>,
}

impl<T: Clone + PartialEq> Debounced<T> {
    pub fn new(initial: T, quiet: Duration) -> Self {
        Self {
            quiet,
            latest: initial.clone(),
            committed: initial,
            deadline: None,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn set(&mut self, value: T) {
        self.set_at(value, Instant::now());
    }

    pub fn set_at(&mut self, value: T, now: Instant) {
        self.latest = value;
        if self.quiet.is_zero() {
            self.committed = self.latest.clone();
            self.deadline = None;
        } else {
            self.deadline = Some(now + self.quiet);
        }
    }

    /// Commits the pending value if its deadline has passed. Returns whether the
    /// committed value changed.
    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                let changed = self.committed != self.latest;
                self.committed = self.latest.clone();
                changed
            }
            _ => false,
        }
    }

    /// Waits out the pending quiet window, then commits.
    pub async fn settle(&mut self) -> bool {
        if let Some(deadline) = self.deadline {
            sleep_until(deadline).await;
        }
        self.poll()
    }

    pub fn latest(&self) -> &T {
        &self.latest
    }

    pub fn committed(&self) -> &T {
        &self.committed
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
