//! Ingress Protection Pipeline: the seven ordered filters.
//! Each filter is its own module so the order in `IngressPipeline::check`
//! is the single place that encodes "filters run in this fixed order...any
//! filter that denies short-circuits".

pub mod blocking;
pub mod bruteforce;
pub mod connections;
pub mod csrf;
pub mod rate_limit;
pub mod sanitize;

use serde_json::Value as Json;
use std::net::IpAddr;
use std::time::Duration;

pub use blocking::{BlockingConfig, IpBlockList};
pub use bruteforce::{BruteForceConfig, BruteForceGuard, LockState};
pub use connections::{ConnectionCapsConfig, ConnectionTracker};
pub use csrf::{CsrfConfig, CsrfStore};
pub use rate_limit::{RateLimitConfig, RateLimitTracker};
pub use sanitize::{SanitizeConfig, SanitizeViolation};
pub use size_caps::{SizeCapsConfig, SizeViolation};

mod size_caps;

/// A denial from the ingress pipeline, carrying the HTTP status and the
/// `reason` string the audit severity table classifies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressDenial {
    pub status_code: u16,
    pub reason: String,
    /// Short `sql|xss|path|cmd|ldap` sub-reason, set only for injection denials.
    pub detail: Option<&'static str>,
}

impl IngressDenial {
    fn new(status_code: u16, reason: impl Into<String>) -> Self {
        Self { status_code, reason: reason.into(), detail: None }
    }

    fn with_detail(mut self, detail: &'static str) -> Self {
        self.detail = Some(detail);
        self
    }
}

pub struct PipelineConfig {
    pub size_caps: SizeCapsConfig,
    pub connections: ConnectionCapsConfig,
    pub rate_limit: RateLimitConfig,
    pub blocking: BlockingConfig,
    pub sanitize: SanitizeConfig,
    pub csrf: CsrfConfig,
    pub brute_force: BruteForceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            size_caps: SizeCapsConfig::default(),
            connections: ConnectionCapsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            blocking: BlockingConfig::default(),
            sanitize: SanitizeConfig::default(),
            csrf: CsrfConfig::default(),
            brute_force: BruteForceConfig::default(),
        }
    }
}

/// Everything that goes into evaluating one HTTP request against the
/// ingress pipeline.
pub struct RequestContext<'a> {
    pub ip: IpAddr,
    pub method: &'a str,
    pub path: &'a str,
    pub uri_len: usize,
    pub header_len: usize,
    pub body_len: usize,
    pub body: Option<&'a Json>,
    pub user_agent: &'a str,
    /// Present only on state-changing requests; the cookie-carried value.
    pub csrf_cookie: Option<&'a str>,
    /// Present only on state-changing requests; the header/form value.
    pub csrf_header: Option<&'a str>,
    /// Set only for authentication routes.
    pub auth_username: Option<&'a str>,
}

fn is_safe_method(method: &str) -> bool {
    matches!(method, "GET" | "HEAD" | "OPTIONS")
}

pub struct IngressPipeline {
    connections: ConnectionTracker,
    rate_limit: RateLimitTracker,
    blocklist: IpBlockList,
    csrf: CsrfStore,
    brute_force: BruteForceGuard,
    size_caps: SizeCapsConfig,
    sanitize: SanitizeConfig,
}

impl IngressPipeline {
    pub fn new(config: PipelineConfig, whitelist_ips: std::collections::HashSet<IpAddr>) -> Self {
        let string_whitelist = whitelist_ips.iter().map(|ip| ip.to_string()).collect();
        Self {
            connections: ConnectionTracker::new(config.connections),
            rate_limit: RateLimitTracker::new(config.rate_limit),
            blocklist: IpBlockList::new(config.blocking, whitelist_ips),
            csrf: CsrfStore::new(config.csrf),
            brute_force: BruteForceGuard::new(config.brute_force, string_whitelist, Default::default()),
            size_caps: config.size_caps,
            sanitize: config.sanitize,
        }
    }

    /// Runs the seven filters in fixed order, stopping at the first denial.
    pub async fn check(&self, ctx: &RequestContext<'_>) -> Result<Option<Duration>, IngressDenial> {
        // 1. size / header / URI caps.
        if let Err(violation) = size_caps::check(&self.size_caps, ctx.body_len, ctx.header_len, ctx.uri_len) {
            self.blocklist.record_denial(ctx.ip);
            return Err(IngressDenial::new(violation.status_code(), "oversized"));
        }

        let whitelisted = self.blocklist.is_whitelisted(ctx.ip);

        if !whitelisted {
            // 2. per-IP connection cap and slowloris.
            if let Err(violation) = self.connections.open(ctx.ip) {
                self.blocklist.record_denial(ctx.ip);
                let reason = match violation {
                    connections::ConnectionViolation::TooManyConnections => "rate-limit",
                    connections::ConnectionViolation::Slowloris => "slowloris",
                };
                return Err(IngressDenial::new(429, reason));
            }

            // 3. rate limit.
            if self.rate_limit.check(ctx.ip).is_err() {
                self.blocklist.record_denial(ctx.ip);
                return Err(IngressDenial::new(429, "rate-limit"));
            }

            // 4. automatic temporary/permanent blocking.
            if self.blocklist.is_blocked(ctx.ip) {
                return Err(IngressDenial::new(429, "rate-limit"));
            }
        }

        // 5. input sanitization.
        if let Some(body) = ctx.body {
            if let Err(violation) = sanitize::scan(&self.sanitize, body) {
                self.blocklist.record_denial(ctx.ip);
                let denial = match violation {
                    SanitizeViolation::Injection(category) => {
                        IngressDenial::new(400, category.reason()).with_detail(category.short_name())
                    }
                    SanitizeViolation::TooDeep | SanitizeViolation::ArrayTooLong | SanitizeViolation::StringTooLong => {
                        IngressDenial::new(400, "oversized")
                    }
                };
                return Err(denial);
            }
        }

        // 6. CSRF (state-changing methods only).
        if !is_safe_method(ctx.method) && !self.csrf.is_excluded(ctx.path) {
            let valid = match (ctx.csrf_cookie, ctx.csrf_header) {
                (Some(cookie), Some(header)) => {
                    self.csrf.validate(cookie, header, &ctx.ip.to_string(), ctx.user_agent)
                }
                _ => false,
            };
            if !valid {
                self.blocklist.record_denial(ctx.ip);
                return Err(IngressDenial::new(403, "csrf-mismatch"));
            }
        }

        // 7. brute-force lockout (authentication routes only).
        if let Some(username) = ctx.auth_username {
            let ip_string = ctx.ip.to_string();
            match self.brute_force.check(&ip_string, username) {
                LockState::PermanentlyLocked | LockState::TemporarilyLocked => {
                    return Err(IngressDenial::new(403, "brute-force-lockout"));
                }
                LockState::Open => {}
            }
            return Ok(Some(self.brute_force.progressive_delay(&ip_string, username)));
        }

        Ok(None)
    }

    pub fn close_connection(&self, ip: IpAddr) {
        self.connections.close(ip);
    }

    pub fn issue_csrf_token(&self, ip: &str, user_agent: &str) -> String {
        self.csrf.issue(ip, user_agent)
    }

    pub fn record_auth_failure(&self, ip: IpAddr, username: &str) {
        self.brute_force.record_failure(&ip.to_string(), username);
    }

    pub fn record_auth_success(&self, username: &str) {
        self.brute_force.record_success(username);
    }

    pub fn cleanup(&self) {
        self.blocklist.cleanup_expired();
        self.csrf.cleanup_expired();
        self.connections.cleanup_idle(Duration::from_secs(3600));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ctx<'a>(ip: IpAddr) -> RequestContext<'a> {
        RequestContext {
            ip,
            method: "GET",
            path: "/do",
            uri_len: 10,
            header_len: 100,
            body_len: 0,
            body: None,
            user_agent: "test-agent",
            csrf_cookie: None,
            csrf_header: None,
            auth_username: None,
        }
    }

    #[tokio::test]
    async fn clean_get_request_passes() {
        let pipeline = IngressPipeline::new(PipelineConfig::default(), HashSet::new());
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(pipeline.check(&ctx(ip)).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_body_is_denied_before_other_checks() {
        let pipeline = IngressPipeline::new(PipelineConfig::default(), HashSet::new());
        let ip: IpAddr = "127.0.0.2".parse().unwrap();
        let mut request = ctx(ip);
        request.body_len = 100 * 1024 * 1024;
        let denial = pipeline.check(&request).await.unwrap_err();
        assert_eq!(denial.reason, "oversized");
    }

    #[tokio::test]
    async fn unsafe_method_without_csrf_token_is_denied() {
        let pipeline = IngressPipeline::new(PipelineConfig::default(), HashSet::new());
        let ip: IpAddr = "127.0.0.3".parse().unwrap();
        let mut request = ctx(ip);
        request.method = "POST";
        let denial = pipeline.check(&request).await.unwrap_err();
        assert_eq!(denial.reason, "csrf-mismatch");
    }

    #[tokio::test]
    async fn valid_csrf_token_allows_unsafe_method() {
        let pipeline = IngressPipeline::new(PipelineConfig::default(), HashSet::new());
        let ip: IpAddr = "127.0.0.4".parse().unwrap();
        let token = pipeline.issue_csrf_token("127.0.0.4", "test-agent");

        let mut request = ctx(ip);
        request.method = "POST";
        request.csrf_cookie = Some(&token);
        request.csrf_header = Some(&token);

        assert!(pipeline.check(&request).await.is_ok());
    }
}
