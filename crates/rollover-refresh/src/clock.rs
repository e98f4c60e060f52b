//! Time source for the poll loop and the invocation deadline.

use std::time::{Duration, Instant};

use crate::BoxFuture;

/// Time source. The poll loop only suspends through [`Clock::sleep`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Point in time after which no further status query is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// `now + budget - margin`, never earlier than `now`.
    ///
    /// `None` when the budget reaches past what `Instant` can represent.
    pub fn from_budget(now: Instant, budget: Duration, margin: Duration) -> Option<Self> {
        now.checked_add(budget.saturating_sub(margin))
            .map(|at| Self { at })
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn is_exceeded(&self, now: Instant) -> bool {
        now >= self.at
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.at.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_minus_margin() {
        let now = Instant::now();
        let deadline =
            Deadline::from_budget(now, Duration::from_secs(900), Duration::from_millis(100))
                .unwrap();
        assert_eq!(deadline.remaining(now), Duration::from_millis(899_900));
        assert!(!deadline.is_exceeded(now));
    }

    #[test]
    fn margin_larger_than_budget_is_already_exceeded() {
        let now = Instant::now();
        let deadline =
            Deadline::from_budget(now, Duration::from_millis(50), Duration::from_millis(100))
                .unwrap();
        assert!(deadline.is_exceeded(now));
        assert_eq!(deadline.remaining(now), Duration::ZERO);
    }

    #[test]
    fn unrepresentable_budget_is_rejected() {
        let now = Instant::now();
        let budget = Duration::from_secs(u64::MAX);
        assert!(Deadline::from_budget(now, budget, Duration::from_millis(100)).is_none());
    }

    #[test]
    fn remaining_saturates_after_deadline() {
        let now = Instant::now();
        let deadline = Deadline::at(now);
        assert_eq!(deadline.remaining(now + Duration::from_secs(5)), Duration::ZERO);
    }

    #[tokio::test]
    async fn system_clock_sleeps() {
        let clock = SystemClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() >= start + Duration::from_millis(5));
    }
}
