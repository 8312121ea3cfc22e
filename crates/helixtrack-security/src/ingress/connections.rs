//! Filter 2: per-IP connection cap and slowloris timeout.
//! Tracks live connection counts and last-activity timestamps per IP;
//! rate limiting itself lives in `rate_limit.rs`.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ConnectionCapsConfig {
    pub max_connections_per_ip: u32,
    pub slowloris_timeout: Duration,
}

impl Default for ConnectionCapsConfig {
    fn default() -> Self {
        Self {
            max_connections_per_ip: 50,
            slowloris_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct ConnectionInfo {
    live: u32,
    opened_at: Instant,
    last_activity: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionViolation {
    TooManyConnections,
    Slowloris,
}

/// Tracks live connection counts per source IP.
pub struct ConnectionTracker {
    connections: Arc<DashMap<IpAddr, ConnectionInfo>>,
    config: ConnectionCapsConfig,
}

impl ConnectionTracker {
    pub fn new(config: ConnectionCapsConfig) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Call when a connection is accepted; returns an error if the cap is
    /// already held for this IP.
    pub fn open(&self, ip: IpAddr) -> Result<(), ConnectionViolation> {
        let now = Instant::now();
        let mut violation = None;

        self.connections
            .entry(ip)
            .and_modify(|info| {
                if info.live >= self.config.max_connections_per_ip {
                    violation = Some(ConnectionViolation::TooManyConnections);
                } else {
                    info.live += 1;
                    info.last_activity = now;
                }
            })
            .or_insert(ConnectionInfo {
                live: 1,
                opened_at: now,
                last_activity: now,
            });

        match violation {
            Some(v) => Err(v),
            None => Ok(()),
        }
    }

    pub fn close(&self, ip: IpAddr) {
        if let Some(mut info) = self.connections.get_mut(&ip) {
            info.live = info.live.saturating_sub(1);
        }
    }

    pub fn touch(&self, ip: IpAddr) {
        if let Some(mut info) = self.connections.get_mut(&ip) {
            info.last_activity = Instant::now();
        }
    }

    /// Checks whether the connection for `ip` has been idle past the
    /// slowloris window since it was opened or last touched.
    pub fn check_slowloris(&self, ip: IpAddr) -> Result<(), ConnectionViolation> {
        if let Some(info) = self.connections.get(&ip) {
            if info.last_activity.elapsed() > self.config.slowloris_timeout {
                return Err(ConnectionViolation::Slowloris);
            }
        }
        Ok(())
    }

    pub fn cleanup_idle(&self, max_age: Duration) {
        self.connections.retain(|_, info| info.live > 0 || info.opened_at.elapsed() < max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_under_cap_are_accepted() {
        let tracker = ConnectionTracker::new(ConnectionCapsConfig {
            max_connections_per_ip: 2,
            ..Default::default()
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(tracker.open(ip).is_ok());
        assert!(tracker.open(ip).is_ok());
    }

    #[test]
    fn connections_over_cap_are_rejected() {
        let tracker = ConnectionTracker::new(ConnectionCapsConfig {
            max_connections_per_ip: 1,
            ..Default::default()
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(tracker.open(ip).is_ok());
        assert_eq!(tracker.open(ip).unwrap_err(), ConnectionViolation::TooManyConnections);
    }

    #[test]
    fn closing_frees_up_a_slot() {
        let tracker = ConnectionTracker::new(ConnectionCapsConfig {
            max_connections_per_ip: 1,
            ..Default::default()
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(tracker.open(ip).is_ok());
        tracker.close(ip);
        assert!(tracker.open(ip).is_ok());
    }
}
