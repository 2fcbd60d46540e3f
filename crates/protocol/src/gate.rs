//! Admission gates for high-frequency traffic
//!
//! Two flavours share one trait: a leading-edge interval gate used to thin out
//! scroll reports, and a token bucket that bounds inbound frames per
//! connection. Both take the current instant explicitly so callers can drive
//! them from a paused tokio clock.

use std::time::Duration;
use tokio::time::Instant;

pub trait RateGate {
    /// Returns `true` if an event arriving at `now` may pass
    fn admit(&mut self, now: Instant) -> bool;
}

/// Passes at most one event per `interval`, dropping the rest
#[derive(Debug, Clone)]
pub struct IntervalGate {
    interval: Duration,
    last: Option<Instant>,
}

impl IntervalGate {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl RateGate for IntervalGate {
    fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Token bucket rate limiter
///
/// Allows bursts up to `max_tokens`, then `refill_rate` per second.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Option<Instant>,
}

impl TokenBucket {
    pub const fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: None,
        }
    }

    /// Per-connection default (1000 burst, 100/sec)
    pub const fn default_ws() -> Self {
        Self::new(1000.0, 100.0)
    }

    fn refill(&mut self, now: Instant) {
        if let Some(last) = self.last_refill {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        }
        self.last_refill = Some(now);
    }

    /// How long until a token is available at `now`
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate <= 0.0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

impl RateGate for TokenBucket {
    fn admit(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
