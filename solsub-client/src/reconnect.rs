//! Reconnection strategies
//!
//! When the socket drops, the session asks its strategy how long to wait
//! before dialing the endpoint again, or whether to stop trying.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: doubling delays between a floor and a ceiling
//!   (the default: 100ms to 30s, jittered, never gives up)
//! - **FixedDelay**: the same delay every time; `Duration::ZERO` retries
//!   immediately
//! - **NoReconnect**: stay disconnected after the first failure
//!
//! # Examples
//!
//! ```rust
//! use solsub_client::{ExponentialBackoff, FixedDelay};
//! use std::time::Duration;
//!
//! let default = ExponentialBackoff::default();
//!
//! // give up after five attempts
//! let bounded = ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(5))
//!     .with_max_attempts(5);
//!
//! let immediate = FixedDelay::new(Duration::ZERO);
//! # let _ = (default, bounded, immediate);
//! ```

use std::time::Duration;

/// Decides the delay before each reconnection attempt
///
/// The session calls `next_delay` with the 0-based attempt number for every
/// attempt after the connection was lost, and `reset` once a connection is
/// established again.
pub trait ReconnectionStrategy: Send + Sync {
    /// `Some(delay)` to try again after `delay`, `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Forget accumulated state after a successful connection
    fn reset(&mut self);
}

/// Exponential backoff with optional jitter and attempt limit
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
            current_attempt: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random delay so many clients don't redial in lockstep
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Attempt number of the last delay handed out
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30)).with_jitter()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        self.current_attempt = attempt;

        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        // min_delay * 2^attempt, saturating so unlimited attempts can't overflow
        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let base = 2u64
            .checked_pow(attempt)
            .and_then(|factor| min_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        let delay = base.min(max_ms);

        if self.jitter && delay >= 4 {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            return Some(Duration::from_millis(delay + jitter_ms));
        }

        Some(Duration::from_millis(delay))
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Constant delay between attempts
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        Some(self.delay)
    }

    fn reset(&mut self) {}
}

/// Never reconnect
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}
