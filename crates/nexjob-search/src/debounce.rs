//! Quiet-period timer: only the last value of a burst comes out.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    deadline: Option<Instant>,
    pending: Option<T>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replaces any pending value and restarts the quiet period.
    pub fn schedule(&mut self, value: T) {
        self.pending = Some(value);
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the quiet period elapses. Cancel-safe: nothing is taken until the deadline passes.
    /// Never resolves while nothing is pending.
    pub async fn expired(&mut self) -> T {
        loop {
            match self.deadline {
                Some(deadline) => {
                    sleep_until(deadline).await;
                    if self.deadline == Some(deadline) {
                        self.deadline = None;
                        if let Some(value) = self.pending.take() {
                            return value;
                        }
                    }
                }
                None => std::future::pending::<()>().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_yields_last_value_after_quiet_period() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();
        debouncer.schedule("r");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.schedule("re");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.schedule("react");

        assert_eq!(debouncer.expired().await, "react");
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_value_never_fires() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.schedule(1);
        assert_eq!(debouncer.cancel(), Some(1));
        let fired = tokio::time::timeout(Duration::from_secs(2), debouncer.expired()).await;
        assert!(fired.is_err());
    }
}
