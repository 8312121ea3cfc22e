//! Filter 7: brute-force lockout for authentication routes.
//! Tracks failures under three independent keys — by source IP, by target
//! username, and by the (IP, username) pair — each with its own counters.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BruteForceConfig {
    pub temp_lock_failures: u32,
    pub temp_lock_window: Duration,
    pub temp_lock_duration: Duration,
    pub permanent_lock_failures: u32,
    pub progressive_delay_base: Duration,
    pub progressive_delay_max: Duration,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            temp_lock_failures: 5,
            temp_lock_window: Duration::from_secs(15 * 60),
            temp_lock_duration: Duration::from_secs(15 * 60),
            permanent_lock_failures: 20,
            progressive_delay_base: Duration::from_millis(500),
            progressive_delay_max: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Counter {
    recent_failures: Vec<Instant>,
    lifetime_failures: u32,
    locked_until: Option<Instant>,
    permanently_locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Open,
    TemporarilyLocked,
    PermanentlyLocked,
}

/// Tracks failed-login counters keyed by IP, by username, and by the
/// `(ip, username)` pair.
pub struct BruteForceGuard {
    by_ip: Arc<DashMap<String, Counter>>,
    by_username: Arc<DashMap<String, Counter>>,
    by_pair: Arc<DashMap<(String, String), Counter>>,
    whitelist_ips: HashSet<String>,
    whitelist_usernames: HashSet<String>,
    config: BruteForceConfig,
}

impl BruteForceGuard {
    pub fn new(config: BruteForceConfig, whitelist_ips: HashSet<String>, whitelist_usernames: HashSet<String>) -> Self {
        Self {
            by_ip: Arc::new(DashMap::new()),
            by_username: Arc::new(DashMap::new()),
            by_pair: Arc::new(DashMap::new()),
            whitelist_ips,
            whitelist_usernames,
            config,
        }
    }

    fn is_whitelisted(&self, ip: &str, username: &str) -> bool {
        self.whitelist_ips.contains(ip) || self.whitelist_usernames.contains(username)
    }

    /// Lock state across all three keys; the most restrictive applies.
    pub fn check(&self, ip: &str, username: &str) -> LockState {
        if self.is_whitelisted(ip, username) {
            return LockState::Open;
        }
        let pair = (ip.to_string(), username.to_string());
        let states = [
            lock_state_of(&self.by_ip, ip),
            lock_state_of(&self.by_username, username),
            lock_state_of(&self.by_pair, &pair),
        ];
        if states.contains(&LockState::PermanentlyLocked) {
            LockState::PermanentlyLocked
        } else if states.contains(&LockState::TemporarilyLocked) {
            LockState::TemporarilyLocked
        } else {
            LockState::Open
        }
    }

    /// Progressive delay to apply before responding to this attempt,
    /// `min(base * 2^recent_failures, max)`.
    pub fn progressive_delay(&self, ip: &str, username: &str) -> Duration {
        let pair = (ip.to_string(), username.to_string());
        let n = self.by_pair.get(&pair).map(|c| c.recent_failures.len()).unwrap_or(0) as u32;
        let scaled = self.config.progressive_delay_base.saturating_mul(1u32 << n.min(10));
        scaled.min(self.config.progressive_delay_max)
    }

    pub fn record_failure(&self, ip: &str, username: &str) {
        if self.is_whitelisted(ip, username) {
            return;
        }
        record_on(&self.by_ip, ip.to_string(), &self.config);
        record_on(&self.by_username, username.to_string(), &self.config);
        record_on(&self.by_pair, (ip.to_string(), username.to_string()), &self.config);
    }

    /// On a successful auth, reset the target username's counters.
    pub fn record_success(&self, username: &str) {
        self.by_username.remove(username);
        self.by_pair.retain(|(_, u), _| u != username);
    }
}

fn lock_state_of<K: std::hash::Hash + Eq + Clone>(map: &DashMap<K, Counter>, key: &K) -> LockState {
    match map.get(key) {
        Some(counter) if counter.permanently_locked => LockState::PermanentlyLocked,
        Some(counter) => match counter.locked_until {
            Some(until) if Instant::now() < until => LockState::TemporarilyLocked,
            _ => LockState::Open,
        },
        None => LockState::Open,
    }
}

fn record_on<K: std::hash::Hash + Eq + Clone>(map: &DashMap<K, Counter>, key: K, config: &BruteForceConfig) {
    let now = Instant::now();
    map.entry(key).and_modify(|c| update_counter(c, now, config)).or_insert_with(|| {
        let mut c = Counter::default();
        update_counter(&mut c, now, config);
        c
    });
}

fn update_counter(c: &mut Counter, now: Instant, config: &BruteForceConfig) {
    c.recent_failures.retain(|&t| now.duration_since(t) <= config.temp_lock_window);
    c.recent_failures.push(now);
    c.lifetime_failures += 1;

    if c.lifetime_failures >= config.permanent_lock_failures {
        c.permanently_locked = true;
    } else if c.recent_failures.len() as u32 >= config.temp_lock_failures {
        c.locked_until = Some(now + config.temp_lock_duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_stays_open() {
        let guard = BruteForceGuard::new(BruteForceConfig::default(), HashSet::new(), HashSet::new());
        for _ in 0..4 {
            guard.record_failure("1.2.3.4", "alice");
        }
        assert_eq!(guard.check("1.2.3.4", "alice"), LockState::Open);
    }

    #[test]
    fn five_failures_in_window_temporarily_locks() {
        let guard = BruteForceGuard::new(
            BruteForceConfig { temp_lock_failures: 5, ..Default::default() },
            HashSet::new(),
            HashSet::new(),
        );
        for _ in 0..5 {
            guard.record_failure("1.2.3.4", "alice");
        }
        assert_eq!(guard.check("1.2.3.4", "alice"), LockState::TemporarilyLocked);
    }

    #[test]
    fn lifetime_failures_trigger_permanent_lock() {
        let guard = BruteForceGuard::new(
            BruteForceConfig { permanent_lock_failures: 3, temp_lock_failures: 100, ..Default::default() },
            HashSet::new(),
            HashSet::new(),
        );
        for _ in 0..3 {
            guard.record_failure("1.2.3.4", "alice");
        }
        assert_eq!(guard.check("1.2.3.4", "alice"), LockState::PermanentlyLocked);
    }

    #[test]
    fn success_resets_username_counters() {
        let guard = BruteForceGuard::new(
            BruteForceConfig { temp_lock_failures: 2, ..Default::default() },
            HashSet::new(),
            HashSet::new(),
        );
        guard.record_failure("1.2.3.4", "alice");
        guard.record_failure("1.2.3.4", "alice");
        assert_eq!(guard.check("1.2.3.4", "alice"), LockState::TemporarilyLocked);

        guard.record_success("alice");
        assert_eq!(guard.check("1.2.3.4", "alice"), LockState::Open);
    }

    #[test]
    fn whitelisted_identities_are_never_locked() {
        let mut whitelist = HashSet::new();
        whitelist.insert("alice".to_string());
        let guard = BruteForceGuard::new(
            BruteForceConfig { temp_lock_failures: 1, ..Default::default() },
            HashSet::new(),
            whitelist,
        );
        guard.record_failure("1.2.3.4", "alice");
        assert_eq!(guard.check("1.2.3.4", "alice"), LockState::Open);
    }

    #[test]
    fn progressive_delay_grows_with_recent_failures() {
        let guard = BruteForceGuard::new(BruteForceConfig::default(), HashSet::new(), HashSet::new());
        let d0 = guard.progressive_delay("1.2.3.4", "alice");
        guard.record_failure("1.2.3.4", "alice");
        let d1 = guard.progressive_delay("1.2.3.4", "alice");
        assert!(d1 >= d0);
    }
}
