use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Budget of `points` requests per `window`. Spending past the budget blocks
/// the key for `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub points: u32,
    pub window: Duration,
    pub block: Duration,
}

impl RateLimitPolicy {
    /// 200 requests per 15 minutes, 5 minute block.
    pub const GENERAL: RateLimitPolicy = RateLimitPolicy {
        points: 200,
        window: Duration::from_secs(900),
        block: Duration::from_secs(300),
    };

    /// 20 attempts per 15 minutes, 10 minute block.
    pub const AUTH: RateLimitPolicy = RateLimitPolicy {
        points: 20,
        window: Duration::from_secs(900),
        block: Duration::from_secs(600),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowed {
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limited {
    pub retry_after: Duration,
}

impl Limited {
    /// Whole seconds until the next request may pass, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let secs = if self.retry_after.subsec_nanos() > 0 { secs + 1 } else { secs };
        secs.max(1)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    consumed: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

/// Fixed-window request counter keyed by client identifier.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    entries: DashMap<String, Entry>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn consume(&self, key: &str) -> Result<Allowed, Limited> {
        self.consume_at(key, Instant::now())
    }

    pub fn consume_at(&self, key: &str, now: Instant) -> Result<Allowed, Limited> {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            consumed: 0,
            window_start: now,
            blocked_until: None,
        });

        if let Some(until) = entry.blocked_until {
            if now < until {
                return Err(Limited {
                    retry_after: until - now,
                });
            }
            entry.blocked_until = None;
            entry.consumed = 0;
            entry.window_start = now;
        }

        if now.duration_since(entry.window_start) >= self.policy.window {
            entry.consumed = 0;
            entry.window_start = now;
        }

        entry.consumed = entry.consumed.saturating_add(1);
        if entry.consumed > self.policy.points {
            if self.policy.block.is_zero() {
                let window_end = entry.window_start + self.policy.window;
                return Err(Limited {
                    retry_after: window_end.saturating_duration_since(now),
                });
            }
            entry.blocked_until = Some(now + self.policy.block);
            return Err(Limited {
                retry_after: self.policy.block,
            });
        }

        Ok(Allowed {
            remaining: self.policy.points - entry.consumed,
        })
    }

    /// Drops keys whose window and block have both lapsed.
    pub fn prune_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.policy.window;
        self.entries.retain(|_, entry| {
            let blocked = entry.blocked_until.map(|until| now < until).unwrap_or(false);
            blocked || now.duration_since(entry.window_start) < window
        });
        before - self.entries.len()
    }

    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> RateLimitPolicy {
        RateLimitPolicy {
            points: 3,
            window: Duration::from_secs(60),
            block: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_allows_up_to_points() {
        let limiter = RateLimiter::new(small());
        let t0 = Instant::now();

        assert_eq!(limiter.consume_at("a", t0), Ok(Allowed { remaining: 2 }));
        assert_eq!(limiter.consume_at("a", t0), Ok(Allowed { remaining: 1 }));
        assert_eq!(limiter.consume_at("a", t0), Ok(Allowed { remaining: 0 }));
        let limited = limiter.consume_at("a", t0).unwrap_err();
        assert_eq!(limited.retry_after, Duration::from_secs(30));
        assert_eq!(limited.retry_after_secs(), 30);
    }

    #[test]
    fn test_block_outlasts_window_reset() {
        let limiter = RateLimiter::new(small());
        let t0 = Instant::now();
        for _ in 0..4 {
            let _ = limiter.consume_at("a", t0);
        }

        let later = t0 + Duration::from_secs(10);
        let limited = limiter.consume_at("a", later).unwrap_err();
        assert_eq!(limited.retry_after, Duration::from_secs(20));

        let after_block = t0 + Duration::from_secs(31);
        assert_eq!(limiter.consume_at("a", after_block), Ok(Allowed { remaining: 2 }));
    }

    #[test]
    fn test_window_resets_budget() {
        let limiter = RateLimiter::new(small());
        let t0 = Instant::now();
        for _ in 0..3 {
            limiter.consume_at("a", t0).unwrap();
        }
        let next_window = t0 + Duration::from_secs(60);
        assert!(limiter.consume_at("a", next_window).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(small());
        let t0 = Instant::now();
        for _ in 0..4 {
            let _ = limiter.consume_at("a", t0);
        }
        assert!(limiter.consume_at("a", t0).is_err());
        assert!(limiter.consume_at("b", t0).is_ok());
    }

    #[test]
    fn test_without_block_waits_for_window_end() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            block: Duration::ZERO,
            ..small()
        });
        let t0 = Instant::now();
        for _ in 0..3 {
            limiter.consume_at("a", t0).unwrap();
        }
        let limited = limiter.consume_at("a", t0 + Duration::from_secs(45)).unwrap_err();
        assert_eq!(limited.retry_after, Duration::from_secs(15));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limited = Limited {
            retry_after: Duration::from_millis(1_200),
        };
        assert_eq!(limited.retry_after_secs(), 2);
        let limited = Limited {
            retry_after: Duration::ZERO,
        };
        assert_eq!(limited.retry_after_secs(), 1);
    }

    #[test]
    fn test_prune_keeps_blocked_keys() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            points: 1,
            window: Duration::from_secs(10),
            block: Duration::from_secs(100),
        });
        let t0 = Instant::now();
        limiter.consume_at("quiet", t0).unwrap();
        limiter.consume_at("noisy", t0).unwrap();
        let _ = limiter.consume_at("noisy", t0);

        let removed = limiter.prune_at(t0 + Duration::from_secs(20));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.consume_at("noisy", t0 + Duration::from_secs(20)).is_err());
    }
}
