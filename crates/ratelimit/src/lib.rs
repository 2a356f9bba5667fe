//! C2: per-identity request quotas over sliding windows (§4.2).
//!
//! Storage is in-memory for a single-node deployment (§1's non-goals
//! exclude clustering). The sliding window is approximated with two
//! overlapping fixed buckets (current + previous, weighted by overlap
//! fraction) — the standard sliding-window-counter approximation, within
//! the allowed 10% error margin of an exact sliding window.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use sa_domain::config::{RateLimitConfig, RateLimitPolicy};

/// Coarse endpoint grouping the limiter enforces quotas over (§4.2,
/// glossary). Identity scope is fixed per class: `Auth` is scoped by
/// remote address (it runs before authentication resolves a user_id);
/// the rest are scoped by `user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Auth,
    Chat,
    File,
    General,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Auth => "auth",
            EndpointClass::Chat => "chat",
            EndpointClass::File => "file",
            EndpointClass::General => "general",
        }
    }

    fn policy(&self, config: &RateLimitConfig) -> RateLimitPolicy {
        match self {
            EndpointClass::Auth => config.auth,
            EndpointClass::Chat => config.chat,
            EndpointClass::File => config.file,
            EndpointClass::General => config.general,
        }
    }

    pub const ALL: [EndpointClass; 4] = [
        EndpointClass::Auth,
        EndpointClass::Chat,
        EndpointClass::File,
        EndpointClass::General,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted,
    Rejected { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    /// Epoch-aligned start of the bucket currently accumulating.
    bucket_start: u64,
    current_count: u32,
    previous_count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaEntry {
    pub class: &'static str,
    pub used: u32,
    pub limit: u32,
    pub window_reset_secs: u64,
}

/// Clock abstraction so window math is testable without real sleeps.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Mutex<HashMap<(String, EndpointClass), Counter>>,
    clock: Box<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            counters: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Atomically checks and increments the window counter for
    /// `(identity, class)`. A storage glitch in a future shared-store
    /// backend should be treated fail-open (admit, with a warning) per
    /// §7 — the in-memory backend here cannot fail, so that path never
    /// triggers, but the trait boundary (swap `counters` for an external
    /// client) preserves the contract.
    pub fn admit(&self, identity: &str, class: EndpointClass) -> Decision {
        let policy = class.policy(&self.config);
        let now = self.clock.now_secs();
        let bucket_start = now - (now % policy.window_secs.max(1));

        let mut counters = self.counters.lock();
        let key = (identity.to_string(), class);
        let counter = counters.entry(key).or_insert(Counter {
            bucket_start,
            current_count: 0,
            previous_count: 0,
        });

        if counter.bucket_start != bucket_start {
            let elapsed_windows = (bucket_start - counter.bucket_start) / policy.window_secs.max(1);
            counter.previous_count = if elapsed_windows == 1 { counter.current_count } else { 0 };
            counter.current_count = 0;
            counter.bucket_start = bucket_start;
        }

        let elapsed_in_window = now - bucket_start;
        let weight = 1.0
            - (elapsed_in_window as f64 / policy.window_secs.max(1) as f64).min(1.0);
        let estimated = counter.previous_count as f64 * weight + counter.current_count as f64;

        if estimated + 1.0 > policy.limit as f64 {
            let retry_after = (policy.window_secs.max(1)).saturating_sub(elapsed_in_window);
            tracing::warn!(
                identity = %identity,
                class = class.as_str(),
                retry_after_secs = retry_after,
                "rate limit rejected"
            );
            return Decision::Rejected {
                retry_after_secs: retry_after.min(policy.window_secs.max(1)),
            };
        }

        counter.current_count += 1;
        Decision::Admitted
    }

    pub fn quota(&self, identity: &str) -> Vec<QuotaEntry> {
        let now = self.clock.now_secs();
        let counters = self.counters.lock();

        EndpointClass::ALL
            .iter()
            .map(|class| {
                let policy = class.policy(&self.config);
                let key = (identity.to_string(), *class);
                let (used, reset) = match counters.get(&key) {
                    Some(c) => {
                        let elapsed = now.saturating_sub(c.bucket_start);
                        let weight = 1.0 - (elapsed as f64 / policy.window_secs.max(1) as f64).min(1.0);
                        let estimated = (c.previous_count as f64 * weight + c.current_count as f64).round() as u32;
                        (estimated.min(policy.limit), policy.window_secs.saturating_sub(elapsed))
                    }
                    None => (0, policy.window_secs),
                };
                QuotaEntry {
                    class: class.as_str(),
                    used,
                    limit: policy.limit,
                    window_reset_secs: reset,
                }
            })
            .collect()
    }

    /// Drops counters whose bucket is more than one window stale (§4.2's
    /// "counters older than one window may be garbage-collected").
    pub fn gc(&self) {
        let now = self.clock.now_secs();
        let mut counters = self.counters.lock();
        counters.retain(|(_, class), counter| {
            let policy = class.policy(&self.config);
            now.saturating_sub(counter.bucket_start) <= policy.window_secs.max(1) * 2
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct FakeClock(Arc<AtomicU64>);
    impl Clock for FakeClock {
        fn now_secs(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn limiter(limit: u32, window_secs: u64) -> (RateLimiter, Arc<AtomicU64>) {
        let time = Arc::new(AtomicU64::new(1_000_000));
        let mut config = RateLimitConfig::default();
        config.chat = RateLimitPolicy { window_secs, limit };
        let rl = RateLimiter::with_clock(config, Box::new(FakeClock(time.clone())));
        (rl, time)
    }

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let (rl, _time) = limiter(20, 60);
        for _ in 0..20 {
            assert_eq!(rl.admit("u1", EndpointClass::Chat), Decision::Admitted);
        }
        match rl.admit("u1", EndpointClass::Chat) {
            Decision::Rejected { retry_after_secs } => {
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn different_identities_independent() {
        let (rl, _time) = limiter(1, 60);
        assert_eq!(rl.admit("u1", EndpointClass::Chat), Decision::Admitted);
        assert_eq!(rl.admit("u2", EndpointClass::Chat), Decision::Admitted);
    }

    #[test]
    fn different_classes_independent() {
        let (rl, _time) = limiter(1, 60);
        assert_eq!(rl.admit("u1", EndpointClass::Chat), Decision::Admitted);
        assert_eq!(rl.admit("u1", EndpointClass::General), Decision::Admitted);
    }

    #[test]
    fn window_rolls_over_and_admits_again() {
        let (rl, time) = limiter(1, 60);
        assert_eq!(rl.admit("u1", EndpointClass::Chat), Decision::Admitted);
        assert!(matches!(rl.admit("u1", EndpointClass::Chat), Decision::Rejected { .. }));

        time.fetch_add(121, Ordering::SeqCst); // two full windows later
        assert_eq!(rl.admit("u1", EndpointClass::Chat), Decision::Admitted);
    }

    #[test]
    fn retry_after_is_within_window_bound() {
        let (rl, _time) = limiter(1, 30);
        rl.admit("u1", EndpointClass::Chat);
        match rl.admit("u1", EndpointClass::Chat) {
            Decision::Rejected { retry_after_secs } => assert!(retry_after_secs <= 30),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn quota_reports_used_and_limit() {
        let (rl, _time) = limiter(20, 60);
        rl.admit("u1", EndpointClass::Chat);
        rl.admit("u1", EndpointClass::Chat);
        let quota = rl.quota("u1");
        let chat = quota.iter().find(|q| q.class == "chat").unwrap();
        assert_eq!(chat.used, 2);
        assert_eq!(chat.limit, 20);
    }

    #[test]
    fn quota_for_untouched_identity_is_zero() {
        let (rl, _time) = limiter(20, 60);
        let quota = rl.quota("fresh-user");
        assert!(quota.iter().all(|q| q.used == 0));
    }

    #[test]
    fn gc_drops_stale_counters() {
        let (rl, time) = limiter(5, 10);
        rl.admit("u1", EndpointClass::Chat);
        time.fetch_add(100, Ordering::SeqCst);
        rl.gc();
        let quota = rl.quota("u1");
        let chat = quota.iter().find(|q| q.class == "chat").unwrap();
        assert_eq!(chat.used, 0);
    }
}
