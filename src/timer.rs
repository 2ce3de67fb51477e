use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

/// About 30 years
const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// One-shot countdown between a breach and the alert.
///
/// Each arm gets a new generation number. The expiry callback receives it and
/// hands it back through [`ConfirmationTimer::take_fire`], so a fire from a
/// cancelled or superseded countdown is recognised and dropped.
pub struct ConfirmationTimer {
    task: Option<JoinHandle<()>>,
    generation: u64,
    deadline: Option<Instant>,
}

impl ConfirmationTimer {
    pub fn new() -> Self {
        Self {
            task: None,
            generation: 0,
            deadline: None,
        }
    }

    /// Start the countdown. Any outstanding one is cancelled first.
    pub fn arm<F, Fut>(&mut self, window: Duration, on_expiry: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let now = Instant::now();
        // Clamp windows too large for the clock to a far but representable deadline
        let deadline = now
            .checked_add(window)
            .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS));
        self.deadline = Some(deadline);

        self.task = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            on_expiry(generation).await;
        }));

        log::debug!("Confirmation timer {} armed for {:?}", generation, window);
        generation
    }

    /// Consume a fire. True only for the current, still-armed countdown.
    pub fn take_fire(&mut self, generation: u64) -> bool {
        if self.deadline.is_none() || generation != self.generation {
            log::debug!("Ignoring stale confirmation timer {}", generation);
            return false;
        }
        self.task = None;
        self.deadline = None;
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline = None;
        match self.task.take() {
            Some(task) => {
                task.abort();
                log::debug!("Confirmation timer {} cancelled", self.generation);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for ConfirmationTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConfirmationTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
