//! Filter 5: input sanitization — depth-limited recursive scan
//! of the request body for injection patterns, using a precompiled regex
//! set per category.

use regex::Regex;
use serde_json::Value as Json;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionCategory {
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
    LdapInjection,
}

impl InjectionCategory {
    /// Matches the `reason` vocabulary the audit severity table expects.
    pub fn reason(self) -> &'static str {
        match self {
            InjectionCategory::SqlInjection => "sql-injection",
            InjectionCategory::Xss => "xss",
            InjectionCategory::PathTraversal => "path-traversal",
            InjectionCategory::CommandInjection => "command-injection",
            InjectionCategory::LdapInjection => "ldap-injection",
        }
    }

    /// Short token for the client-facing error message: `sql|xss|path|cmd|ldap`.
    pub fn short_name(self) -> &'static str {
        match self {
            InjectionCategory::SqlInjection => "sql",
            InjectionCategory::Xss => "xss",
            InjectionCategory::PathTraversal => "path",
            InjectionCategory::CommandInjection => "cmd",
            InjectionCategory::LdapInjection => "ldap",
        }
    }
}

struct Patterns {
    sql: Regex,
    xss: Regex,
    path_traversal: Regex,
    command: Regex,
    ldap: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        sql: Regex::new(r"(?i)(union.*select|select.*from|insert.*into|delete.*from|drop.*table|';|--|\bor\b.*=|exec\(|execute\()").unwrap(),
        xss: Regex::new(r"(?i)(<script|javascript:|onerror=|onload=|alert\(|prompt\(|confirm\(|<iframe|<object|<embed|<svg)").unwrap(),
        path_traversal: Regex::new(r"(\.\./|\.\.%2[fF]|\.\.\\|\.\.%5[cC]|\.\.;)").unwrap(),
        command: Regex::new(r"(;|\||&&|\$\(|`|\bwget\b|\bcurl\b|\bbash\b|\bpowershell\b)").unwrap(),
        ldap: Regex::new(r"[\*\(\)\\\x00]").unwrap(),
    })
}

fn scan_str(value: &str) -> Option<InjectionCategory> {
    let p = patterns();
    if p.sql.is_match(value) {
        Some(InjectionCategory::SqlInjection)
    } else if p.xss.is_match(value) {
        Some(InjectionCategory::Xss)
    } else if p.path_traversal.is_match(value) {
        Some(InjectionCategory::PathTraversal)
    } else if p.command.is_match(value) {
        Some(InjectionCategory::CommandInjection)
    } else if p.ldap.is_match(value) {
        Some(InjectionCategory::LdapInjection)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SanitizeConfig {
    pub max_depth: usize,
    pub max_array_len: usize,
    pub max_string_len: usize,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_array_len: 1_000,
            max_string_len: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeViolation {
    Injection(InjectionCategory),
    TooDeep,
    ArrayTooLong,
    StringTooLong,
}

/// Recursively scans a parsed JSON body for injection-pattern categories.
pub fn scan(config: &SanitizeConfig, value: &Json) -> Result<(), SanitizeViolation> {
    scan_at_depth(config, value, 0)
}

fn scan_at_depth(config: &SanitizeConfig, value: &Json, depth: usize) -> Result<(), SanitizeViolation> {
    if depth > config.max_depth {
        return Err(SanitizeViolation::TooDeep);
    }
    match value {
        Json::String(s) => {
            if s.len() > config.max_string_len {
                return Err(SanitizeViolation::StringTooLong);
            }
            if let Some(category) = scan_str(s) {
                return Err(SanitizeViolation::Injection(category));
            }
            Ok(())
        }
        Json::Array(items) => {
            if items.len() > config.max_array_len {
                return Err(SanitizeViolation::ArrayTooLong);
            }
            for item in items {
                scan_at_depth(config, item, depth + 1)?;
            }
            Ok(())
        }
        Json::Object(map) => {
            for (key, val) in map {
                if let Some(category) = scan_str(key) {
                    return Err(SanitizeViolation::Injection(category));
                }
                scan_at_depth(config, val, depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_payload_passes() {
        let body = json!({"title": "Fix login bug", "priority": "high"});
        assert!(scan(&SanitizeConfig::default(), &body).is_ok());
    }

    #[test]
    fn sql_injection_is_detected_in_nested_field() {
        let body = json!({"filter": {"query": "1=1; DROP TABLE users;--"}});
        let err = scan(&SanitizeConfig::default(), &body).unwrap_err();
        assert_eq!(err, SanitizeViolation::Injection(InjectionCategory::SqlInjection));
    }

    #[test]
    fn xss_payload_in_array_is_detected() {
        let body = json!({"comments": ["hello", "<script>alert(1)</script>"]});
        let err = scan(&SanitizeConfig::default(), &body).unwrap_err();
        assert_eq!(err, SanitizeViolation::Injection(InjectionCategory::Xss));
    }

    #[test]
    fn path_traversal_is_detected() {
        let body = json!({"path": "../../etc/passwd"});
        let err = scan(&SanitizeConfig::default(), &body).unwrap_err();
        assert_eq!(err, SanitizeViolation::Injection(InjectionCategory::PathTraversal));
    }

    #[test]
    fn excessive_depth_is_rejected() {
        let mut value = json!("leaf");
        for _ in 0..12 {
            value = json!([value]);
        }
        let err = scan(&SanitizeConfig::default(), &value).unwrap_err();
        assert_eq!(err, SanitizeViolation::TooDeep);
    }
}
