//! Bounded retry with a fixed pause between attempts.
//!
//! The longest a caller can block is `attempts × pause` plus the time spent
//! inside the attempts themselves. No pause follows the final attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::provider::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(with = "millis")]
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            pause: Duration::from_secs(1),
        }
    }
}

/// Every attempt failed; carries the count and the last error seen.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: DataError,
}

impl RetryPolicy {
    pub fn new(attempts: u32, pause: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            pause,
        }
    }

    /// Upper bound on time spent sleeping between attempts.
    pub fn max_wait(&self) -> Duration {
        self.pause * self.attempts.saturating_sub(1)
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Each failure is logged with
    /// `label` for context.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Result<T, DataError>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(%label, attempt, attempts, error = %e, "fetch attempt failed");
                    if attempt >= attempts {
                        return Err(RetryExhausted {
                            attempts,
                            last_error: e,
                        });
                    }
                    if !self.pause.is_zero() {
                        std::thread::sleep(self.pause);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
