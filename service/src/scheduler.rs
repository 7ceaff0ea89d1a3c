use std::time::Duration;

use async_trait::async_trait;

/// Source of delays for backoff and grace periods.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AsyncStdScheduler;

#[async_trait]
impl Scheduler for AsyncStdScheduler {
    async fn sleep(&self, delay: Duration) {
        async_std::task::sleep(delay).await;
    }
}

/// Exponential backoff before retry number `retry_count`: 2^retry_count seconds.
pub fn backoff_delay(retry_count: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(retry_count))
}

#[cfg(test)]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_std::channel::{Receiver, Sender};
    use async_trait::async_trait;

    use super::Scheduler;

    #[derive(Default)]
    struct TestSchedulerState {
        delays: Vec<Duration>,
        hold_threshold: Option<Duration>,
        gate: Option<(Sender<()>, Receiver<()>)>,
    }

    /// Scheduler that records every requested delay and returns at once.
    ///
    /// Built with [`TestScheduler::holding_at_least`], sleeps at or above the
    /// threshold park until [`TestScheduler::release_held`] is called.
    #[derive(Clone, Default)]
    pub struct TestScheduler {
        state: Arc<Mutex<TestSchedulerState>>,
    }

    impl TestScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn holding_at_least(threshold: Duration) -> Self {
            let scheduler = Self::default();
            {
                let mut state = scheduler.state.lock().unwrap();
                state.hold_threshold = Some(threshold);
                state.gate = Some(async_std::channel::bounded(1));
            }
            scheduler
        }

        pub fn delays(&self) -> Vec<Duration> {
            self.state.lock().unwrap().delays.clone()
        }

        pub fn release_held(&self) {
            let mut state = self.state.lock().unwrap();
            state.hold_threshold = None;
            if let Some((sender, _)) = state.gate.take() {
                sender.close();
            }
        }
    }

    #[async_trait]
    impl Scheduler for TestScheduler {
        async fn sleep(&self, delay: Duration) {
            let gate = {
                let mut state = self.state.lock().unwrap();
                state.delays.push(delay);
                match (&state.hold_threshold, &state.gate) {
                    (Some(threshold), Some((_, receiver))) if delay >= *threshold => {
                        Some(receiver.clone())
                    }
                    _ => None,
                }
            };
            if let Some(receiver) = gate {
                let _ = receiver.recv().await;
            }
            async_std::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_retry() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(backoff_delay(200), Duration::from_secs(u64::MAX));
    }

    #[async_std::test]
    async fn test_held_sleep_waits_for_release() {
        let scheduler = mock::TestScheduler::holding_at_least(Duration::from_secs(60));
        scheduler.sleep(Duration::from_secs(2)).await;

        let held = scheduler.clone();
        let handle =
            async_std::task::spawn(async move { held.sleep(Duration::from_secs(60)).await });
        async_std::task::yield_now().await;
        scheduler.release_held();
        handle.await;

        assert_eq!(
            scheduler.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(60)]
        );
    }
}
