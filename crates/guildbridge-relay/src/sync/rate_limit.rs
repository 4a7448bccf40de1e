//! Sliding-window budget for outbound directory calls.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Extra wait beyond the oldest entry's age-out, so a clock-edge retry does
/// not land still inside the window.
const AGE_OUT_MARGIN: Duration = Duration::from_secs(1);

/// Cooperative self-throttle over a trailing window.
///
/// `acquire` records one call, first blocking while the window already holds
/// `max_calls - safety_buffer` timestamps. This is self-imposed throttling,
/// not a reaction to server-side rejections: the budget must hold even under
/// bursty discovery traffic.
pub struct CallBudget {
    max_calls: usize,
    window: Duration,
    safety_buffer: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl CallBudget {
    pub fn new(max_calls: usize, window: Duration, safety_buffer: usize) -> Self {
        Self {
            max_calls,
            window,
            safety_buffer,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    fn limit(&self) -> usize {
        self.max_calls.saturating_sub(self.safety_buffer)
    }

    /// Record one call, waiting first if the window is at the limit.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                Self::prune(&mut calls, now, self.window);

                if calls.len() < self.limit() {
                    calls.push_back(now);
                    return;
                }
                match calls.front() {
                    Some(oldest) => {
                        self.window.saturating_sub(now.duration_since(*oldest)) + AGE_OUT_MARGIN
                    }
                    None => continue,
                }
            };

            info!(wait_secs = wait.as_secs(), "Directory call budget exhausted, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls still available in the current window.
    pub async fn remaining(&self) -> usize {
        let mut calls = self.calls.lock().await;
        Self::prune(&mut calls, Instant::now(), self.window);
        self.limit().saturating_sub(calls.len())
    }

    fn prune(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while calls
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            calls.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn calls_under_the_limit_do_not_wait() {
        let budget = CallBudget::new(5, Duration::from_secs(60), 1);

        let before = Instant::now();
        for _ in 0..4 {
            budget.acquire().await;
        }
        assert_eq!(Instant::now(), before);
        assert_eq!(budget.remaining().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn call_at_the_limit_blocks_until_age_out() {
        let budget = CallBudget::new(3, Duration::from_secs(60), 1);

        budget.acquire().await;
        budget.acquire().await;

        let before = Instant::now();
        budget.acquire().await;
        let waited = Instant::now().duration_since(before);

        // Window age-out plus the one second margin.
        assert!(waited >= Duration::from_secs(61), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn hard_cap_minus_buffer_is_enforced() {
        let budget = CallBudget::new(300, Duration::from_secs(300), 10);

        for _ in 0..290 {
            budget.acquire().await;
        }
        assert_eq!(budget.remaining().await, 0);

        // The 291st call must block until the oldest entry leaves the window.
        let blocked =
            tokio::time::timeout(Duration::from_secs(299), budget.acquire()).await;
        assert!(blocked.is_err());

        // Shortly after the window turns over it proceeds.
        let unblocked =
            tokio::time::timeout(Duration::from_secs(10), budget.acquire()).await;
        assert!(unblocked.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_up_as_entries_age_out() {
        let budget = CallBudget::new(3, Duration::from_secs(10), 1);

        budget.acquire().await;
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(budget.remaining().await, 2);
    }
}
