//! Per-identity admission control
//!
//! Every identity gets two fixed-window counters, one per minute and one per
//! day. Windows expire lazily: a counter is reset the first time it is
//! touched after its window has run out, never by a background sweep.

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::Identity;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// The quota a denied request ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Minute,
    Day,
}

impl Quota {
    pub fn window(&self) -> Duration {
        match self {
            Quota::Minute => MINUTE,
            Quota::Day => DAY,
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quota::Minute => write!(f, "minute"),
            Quota::Day => write!(f, "day"),
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied {
        reason: Quota,
        /// Time until the `reason` window resets
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// A single fixed window counter
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    started: Instant,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self { count: 0, started: now }
    }

    /// Reset the counter if its window has run out
    fn refresh(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.started) >= window {
            self.count = 0;
            self.started = now;
        }
    }

    fn remaining(&self, now: Instant, window: Duration) -> Duration {
        (self.started + window).saturating_duration_since(now)
    }
}

/// Per-identity budget state
#[derive(Debug, Clone, Copy)]
struct RateBudget {
    minute: WindowCounter,
    day: WindowCounter,
}

impl RateBudget {
    fn new(now: Instant) -> Self {
        Self {
            minute: WindowCounter::new(now),
            day: WindowCounter::new(now),
        }
    }
}

/// Remaining budget of one identity, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub minute_count: u32,
    pub day_count: u32,
}

/// Fixed-window rate limiter keyed by identity
pub struct RateLimiter {
    budgets: DashMap<String, RateBudget>,
    minute_limit: u32,
    day_limit: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter reading time from `clock`
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            budgets: DashMap::new(),
            minute_limit: config.requests_per_minute,
            day_limit: config.requests_per_day,
            clock,
        }
    }

    pub fn minute_limit(&self) -> u32 {
        self.minute_limit
    }

    pub fn day_limit(&self) -> u32 {
        self.day_limit
    }

    /// Try to take one request from `identity`'s budget.
    ///
    /// Both quotas are evaluated on every call. When either is exhausted
    /// nothing is consumed, and the exhausted quota that resets first is
    /// reported as the reason.
    pub fn try_acquire(&self, identity: &Identity) -> Admission {
        let now = self.clock.now();
        let mut budget = self
            .budgets
            .entry(identity.key().to_string())
            .or_insert_with(|| RateBudget::new(now));

        budget.minute.refresh(now, MINUTE);
        budget.day.refresh(now, DAY);

        let minute_exceeded = budget.minute.count >= self.minute_limit;
        let day_exceeded = budget.day.count >= self.day_limit;

        let minute_wait = budget.minute.remaining(now, MINUTE);
        let day_wait = budget.day.remaining(now, DAY);

        let denial = match (minute_exceeded, day_exceeded) {
            (false, false) => None,
            (true, false) => Some((Quota::Minute, minute_wait)),
            (false, true) => Some((Quota::Day, day_wait)),
            (true, true) if day_wait < minute_wait => Some((Quota::Day, day_wait)),
            (true, true) => Some((Quota::Minute, minute_wait)),
        };

        match denial {
            None => {
                budget.minute.count += 1;
                budget.day.count += 1;
                Admission::Allowed
            }
            Some((reason, retry_after)) => {
                debug!(
                    "Denied {} by {} quota (minute {}/{}, day {}/{}), retry in {:?}",
                    identity,
                    reason,
                    budget.minute.count,
                    self.minute_limit,
                    budget.day.count,
                    self.day_limit,
                    retry_after
                );
                Admission::Denied { reason, retry_after }
            }
        }
    }

    /// Current counters for `identity`, without touching its windows
    pub fn snapshot(&self, identity: &Identity) -> Option<BudgetSnapshot> {
        self.budgets.get(identity.key()).map(|budget| BudgetSnapshot {
            minute_count: budget.minute.count,
            day_count: budget.day.count,
        })
    }

    /// Number of identities seen so far
    pub fn tracked_identities(&self) -> usize {
        self.budgets.len()
    }
}
