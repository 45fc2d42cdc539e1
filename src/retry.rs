//! Backoff between dispatcher attempts

use std::time::Duration;
use log::debug;
use serde::{Deserialize, Serialize};

/// Exponential backoff: `initial * multiplier^attempt`, capped at `max`.
/// Only the delay lives here; the attempt budget is
/// [`crate::config::ClientConfig::max_retries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy
{   pub backoff_multiplier: f32
  , pub initial_backoff_ms: u64
  , pub max_backoff_ms: u64
}

impl BackoffPolicy
{   pub fn new(
      backoff_multiplier: f32
    , initial_backoff_ms: u64
    , max_backoff_ms: u64
    ) -> Self
    {   BackoffPolicy
        {   backoff_multiplier
          , initial_backoff_ms
          , max_backoff_ms
        }
    }

    /// No waiting at all between attempts
    pub fn none() -> Self
    {   BackoffPolicy::new(1.0, 0, 0)
    }

    /// Delay after the given failed attempt (0-based)
    pub fn backoff_for_attempt(&self, attempt: usize) -> Duration
    {   if self.initial_backoff_ms == 0
        {   return Duration::ZERO;
        }
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let multiplier = self.backoff_multiplier.max(1.0).powi(exponent);
        let millis = (self.initial_backoff_ms as f64 * multiplier as f64)
          .min(self.max_backoff_ms as f64);
        debug!("Backoff for attempt {}: {}ms", attempt, millis as u64);
        Duration::from_millis(millis as u64)
    }
}

impl Default for BackoffPolicy
{   fn default() -> Self
    {   BackoffPolicy::new(2.0, 100, 10_000)
    }
}
