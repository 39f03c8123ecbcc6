//! Bounded retry for notification delivery.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same pause after every failure.
    Fixed,
    /// Pause doubles after each failure, starting at `initial_delay`.
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total tries including the first. Zero is treated as one.
    pub attempts: u32,
    pub initial_delay: Duration,
    /// No pause is ever longer than this.
    pub delay_cap: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(50),
            delay_cap: Duration::from_millis(500),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            initial_delay: delay,
            delay_cap: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(attempts: u32, initial_delay: Duration, delay_cap: Duration) -> Self {
        Self {
            attempts,
            initial_delay,
            delay_cap,
            backoff: Backoff::Exponential,
        }
    }

    /// Pause before the next try once `failed` tries have failed.
    pub fn pause_after(&self, failed: u32) -> Duration {
        let pause = match (self.backoff, failed) {
            (_, 0) => Duration::ZERO,
            (Backoff::Fixed, _) => self.initial_delay,
            (Backoff::Exponential, n) => self
                .initial_delay
                .saturating_mul(2u32.saturating_pow(n - 1)),
        };
        pause.min(self.delay_cap)
    }

    pub fn allows_another(&self, failed: u32) -> bool {
        failed < self.attempts.max(1)
    }

    /// Runs `op` (given the 1-based try number) until it succeeds or the
    /// tries run out. `on_retry` sees each failure that will be retried and
    /// the pause about to be taken. Both arms carry the number of tries used.
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        mut on_retry: impl FnMut(u32, Duration, &E),
    ) -> Result<(T, u32), (E, u32)> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok((value, attempt)),
                Err(err) if self.allows_another(attempt) => {
                    let pause = self.pause_after(attempt);
                    on_retry(attempt, pause, &err);
                    thread::sleep(pause);
                    attempt += 1;
                }
                Err(err) => return Err((err, attempt)),
            }
        }
    }
}
