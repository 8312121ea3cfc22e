//! Filter 4: automatic temporary/permanent IP blocking.
//! A denial counter per IP escalates to a scheduled temporary block, and
//! repeated temporary blocks escalate to a permanent one.

use dashmap::DashMap;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BlockingConfig {
    pub suspicious_threshold: u32,
    pub suspicious_window: Duration,
    pub temporary_block_duration: Duration,
    pub ban_threshold: u32,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            suspicious_threshold: 10,
            suspicious_window: Duration::from_secs(300),
            temporary_block_duration: Duration::from_secs(15 * 60),
            ban_threshold: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Denials {
    count: u32,
    window_start: Instant,
}

#[derive(Debug, Clone, Copy)]
enum BlockState {
    Temporary(Instant),
    Permanent,
}

pub struct IpBlockList {
    denials: Arc<DashMap<IpAddr, Denials>>,
    blocks: Arc<DashMap<IpAddr, BlockState>>,
    temp_block_counts: Arc<DashMap<IpAddr, AtomicU32>>,
    whitelist: HashSet<IpAddr>,
    config: BlockingConfig,
}

impl IpBlockList {
    pub fn new(config: BlockingConfig, whitelist: HashSet<IpAddr>) -> Self {
        Self {
            denials: Arc::new(DashMap::new()),
            blocks: Arc::new(DashMap::new()),
            temp_block_counts: Arc::new(DashMap::new()),
            whitelist,
            config,
        }
    }

    pub fn is_whitelisted(&self, ip: IpAddr) -> bool {
        self.whitelist.contains(&ip)
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        if self.is_whitelisted(ip) {
            return false;
        }
        match self.blocks.get(&ip).map(|b| *b) {
            Some(BlockState::Permanent) => true,
            Some(BlockState::Temporary(expiry)) => {
                if Instant::now() < expiry {
                    true
                } else {
                    self.blocks.remove(&ip);
                    false
                }
            }
            None => false,
        }
    }

    /// Call on every denial (ingress filter or authorization check) that
    /// should count toward the suspicious-denial threshold.
    pub fn record_denial(&self, ip: IpAddr) {
        if self.is_whitelisted(ip) {
            return;
        }
        let now = Instant::now();
        let mut should_block = false;

        self.denials
            .entry(ip)
            .and_modify(|d| {
                if now.duration_since(d.window_start) > self.config.suspicious_window {
                    d.count = 1;
                    d.window_start = now;
                } else {
                    d.count += 1;
                    if d.count >= self.config.suspicious_threshold {
                        should_block = true;
                    }
                }
            })
            .or_insert(Denials { count: 1, window_start: now });

        if should_block {
            self.block_temporarily(ip);
        }
    }

    fn block_temporarily(&self, ip: IpAddr) {
        let prior_blocks = self
            .temp_block_counts
            .entry(ip)
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1;

        if prior_blocks > self.config.ban_threshold {
            warn!("permanently blocking IP {} after {} temporary blocks", ip, prior_blocks);
            self.blocks.insert(ip, BlockState::Permanent);
            return;
        }

        let expiry = Instant::now() + self.config.temporary_block_duration;
        warn!("temporarily blocking IP {} until {:?}", ip, expiry);
        self.blocks.insert(ip, BlockState::Temporary(expiry));
    }

    pub fn cleanup_expired(&self) {
        self.blocks.retain(|_, state| match state {
            BlockState::Permanent => true,
            BlockState::Temporary(expiry) => Instant::now() < *expiry,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn below_threshold_does_not_block() {
        let list = IpBlockList::new(
            BlockingConfig { suspicious_threshold: 5, ..Default::default() },
            HashSet::new(),
        );
        let addr = ip("10.0.0.1");
        for _ in 0..4 {
            list.record_denial(addr);
        }
        assert!(!list.is_blocked(addr));
    }

    #[test]
    fn reaching_threshold_blocks_temporarily() {
        let list = IpBlockList::new(
            BlockingConfig { suspicious_threshold: 3, ..Default::default() },
            HashSet::new(),
        );
        let addr = ip("10.0.0.2");
        for _ in 0..3 {
            list.record_denial(addr);
        }
        assert!(list.is_blocked(addr));
    }

    #[test]
    fn repeated_temporary_blocks_escalate_to_permanent() {
        let list = IpBlockList::new(
            BlockingConfig {
                suspicious_threshold: 1,
                ban_threshold: 2,
                ..Default::default()
            },
            HashSet::new(),
        );
        let addr = ip("10.0.0.3");
        for _ in 0..3 {
            list.record_denial(addr);
        }
        assert!(matches!(list.blocks.get(&addr).map(|b| *b), Some(BlockState::Permanent)));
    }

    #[test]
    fn whitelisted_ips_are_never_blocked() {
        let addr = ip("10.0.0.4");
        let mut whitelist = HashSet::new();
        whitelist.insert(addr);
        let list = IpBlockList::new(
            BlockingConfig { suspicious_threshold: 1, ..Default::default() },
            whitelist,
        );
        list.record_denial(addr);
        assert!(!list.is_blocked(addr));
    }
}
