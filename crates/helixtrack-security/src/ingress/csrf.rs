//! Double-submit CSRF protection, framework-agnostic so `helixtrack-api`
//! can wire it into actix-web middleware. The actix `Transform`/`Service`
//! plumbing lives in the binary crate; this module only holds token
//! issuance, storage, and the constant-time double-submit comparison.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CsrfConfig {
    pub token_ttl: ChronoDuration,
    pub excluded_paths: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl: ChronoDuration::hours(1),
            excluded_paths: vec![
                "/health".to_string(),
                "/metrics".to_string(),
                "/csp-report".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
struct IssuedToken {
    token: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
}

/// Binds a token to the IP+User-Agent fingerprint it was issued to, so a
/// stolen cookie alone is insufficient.
fn fingerprint(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"\0");
    hasher.update(user_agent.as_bytes());
    BASE64.encode(hasher.finalize())
}

pub struct CsrfStore {
    tokens: Arc<DashMap<String, IssuedToken>>,
    config: CsrfConfig,
}

impl CsrfStore {
    pub fn new(config: CsrfConfig) -> Self {
        Self {
            tokens: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.config.excluded_paths.iter().any(|p| path == p || path.starts_with(p))
    }

    /// Issues a new 32-byte cryptographically random token bound to this
    /// caller's fingerprint, returning the value to set as both cookie and
    /// response header.
    pub fn issue(&self, ip: &str, user_agent: &str) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = BASE64.encode(bytes);

        self.tokens.insert(
            token.clone(),
            IssuedToken {
                token: token.clone(),
                fingerprint: fingerprint(ip, user_agent),
                created_at: Utc::now(),
            },
        );
        token
    }

    /// Double-submit validation: the cookie and header/form values must
    /// match (constant-time), the token must be known, unexpired, and bound
    /// to the same fingerprint it was issued under.
    pub fn validate(&self, cookie_value: &str, header_value: &str, ip: &str, user_agent: &str) -> bool {
        if !constant_time_eq(cookie_value.as_bytes(), header_value.as_bytes()) {
            return false;
        }

        match self.tokens.get(cookie_value) {
            Some(issued) => {
                if Utc::now() - issued.created_at > self.config.token_ttl {
                    return false;
                }
                issued.fingerprint == fingerprint(ip, user_agent)
            }
            None => false,
        }
    }

    pub fn cleanup_expired(&self) {
        let ttl = self.config.token_ttl;
        self.tokens.retain(|_, issued| Utc::now() - issued.created_at <= ttl);
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_with_matching_fingerprint() {
        let store = CsrfStore::new(CsrfConfig::default());
        let token = store.issue("1.2.3.4", "test-agent");
        assert!(store.validate(&token, &token, "1.2.3.4", "test-agent"));
    }

    #[test]
    fn mismatched_fingerprint_fails_validation() {
        let store = CsrfStore::new(CsrfConfig::default());
        let token = store.issue("1.2.3.4", "test-agent");
        assert!(!store.validate(&token, &token, "5.6.7.8", "test-agent"));
    }

    #[test]
    fn mismatched_cookie_and_header_fails_validation() {
        let store = CsrfStore::new(CsrfConfig::default());
        let token = store.issue("1.2.3.4", "test-agent");
        assert!(!store.validate(&token, "not-the-token", "1.2.3.4", "test-agent"));
    }

    #[test]
    fn unknown_token_fails_validation() {
        let store = CsrfStore::new(CsrfConfig::default());
        assert!(!store.validate("bogus", "bogus", "1.2.3.4", "test-agent"));
    }

    #[test]
    fn excluded_paths_bypass_csrf() {
        let store = CsrfStore::new(CsrfConfig::default());
        assert!(store.is_excluded("/health"));
        assert!(!store.is_excluded("/do"));
    }
}
