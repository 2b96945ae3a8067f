//! Exponential backoff between broker reconnect attempts

use {std::time::Duration, tokio::time::sleep};

#[derive(Debug)]
pub struct RetriesExhausted;

impl std::fmt::Display for RetriesExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum reconnect attempts exceeded")
    }
}

impl std::error::Error for RetriesExhausted {}

/// Doubling delay with a cap, reset on a successful connection.
#[derive(Debug)]
pub struct ReconnectBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay for the next attempt, or `None` once attempts are exhausted
    fn next_delay(&self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self
            .initial_delay
            .saturating_mul(2_u32.saturating_pow(self.attempt));
        Some(delay.min(self.max_delay))
    }

    /// Sleep before the next reconnect attempt
    pub async fn wait(&mut self) -> Result<(), RetriesExhausted> {
        let delay = self.next_delay().ok_or(RetriesExhausted)?;

        log::warn!(
            "⏳ Reconnect attempt {} of {} in {:?}",
            self.attempt + 1,
            self.max_attempts,
            delay
        );

        sleep(delay).await;
        self.attempt += 1;
        Ok(())
    }

    /// Call after a successful connection so the next outage starts over
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
