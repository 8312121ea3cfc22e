//! Audit Sink: append-only, severity-tagged record of access
//! and ingress-security events, written through an async channel to a
//! background task so callers never block on persistence. Two logical
//! tables (`access`, `security`) back the two event kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Access,
    Security,
}

/// A single audit record, access or ingress-security.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub actor: Option<String>,
    pub resource: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub allowed: bool,
    pub reason: String,
    pub severity: Severity,
    pub source_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_path: Option<String>,
    pub context: Json,
}

impl AuditEntry {
    pub fn new(
        kind: AuditKind,
        actor: Option<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        allowed: bool,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        let severity = classify(kind, allowed, &reason);
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            actor,
            resource: resource.into(),
            resource_id: None,
            action: action.into(),
            allowed,
            reason,
            severity,
            source_address: None,
            user_agent: None,
            request_path: None,
            context: Json::Object(Default::default()),
        }
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_source(mut self, ip: impl Into<String>, user_agent: Option<String>) -> Self {
        self.source_address = Some(ip.into());
        self.user_agent = user_agent;
        self
    }

    pub fn with_request_path(mut self, path: impl Into<String>) -> Self {
        self.request_path = Some(path.into());
        self
    }

    pub fn with_context(mut self, context: Json) -> Self {
        self.context = context;
        self
    }
}

/// Maps an access or ingress decision to its audit severity.
fn classify(kind: AuditKind, allowed: bool, reason: &str) -> Severity {
    if allowed {
        return Severity::Info;
    }
    match reason {
        "repeated-denial-cluster" | "brute-force-lockout" | "permission-escalation-attempt"
        | "authorization error" => Severity::Critical,
        "injection" | "sql-injection" | "xss" | "path-traversal" | "command-injection"
        | "ldap-injection" | "csrf-mismatch" | "oversized" | "slowloris" | "rate-limit" => {
            Severity::Error
        }
        "missing-permission" | "security-level" | "role" | "insufficient permission" => {
            Severity::Warning
        }
        _ if kind == AuditKind::Security => Severity::Error,
        _ => Severity::Warning,
    }
}

/// Query filter for `AuditSink::query`.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub resource: Option<String>,
    pub severity: Option<Severity>,
    pub kind: Option<AuditKind>,
    pub allowed: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
}

pub type CriticalCallback = Arc<dyn Fn(&AuditEntry) + Send + Sync>;

/// `Log` never fails observably — write errors go to `tracing::error!`
/// only — logging never fails observable request handling.
pub struct AuditSink {
    pool: PgPool,
    tx: UnboundedSender<AuditEntry>,
    retention: chrono::Duration,
    critical_callback: Option<CriticalCallback>,
}

impl AuditSink {
    pub fn new(pool: PgPool, retention_days: i64) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();
        let writer_pool = pool.clone();

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(err) = write_entry(&writer_pool, &entry).await {
                    error!("failed to write audit entry {}: {}", entry.id, err);
                }
            }
        });

        Self {
            pool,
            tx,
            retention: chrono::Duration::days(retention_days),
            critical_callback: None,
        }
    }

    /// Registers a best-effort, non-blocking callback fired whenever an
    /// entry at `severity >= Critical` is logged.
    pub fn set_critical_callback(&mut self, callback: CriticalCallback) {
        self.critical_callback = Some(callback);
    }

    pub fn log(&self, entry: AuditEntry) {
        if entry.severity == Severity::Critical {
            if let Some(cb) = &self.critical_callback {
                cb(&entry);
            }
        }
        if self.tx.send(entry).is_err() {
            error!("audit sink writer task is gone, dropping entry");
        }
    }

    pub async fn query(&self, filter: AuditQuery) -> anyhow::Result<Vec<AuditEntry>> {
        let limit = if filter.limit <= 0 { 100 } else { filter.limit };
        let kind = filter.kind.map(|k| match k {
            AuditKind::Access => "access",
            AuditKind::Security => "security",
        });

        let mut access = Vec::new();
        let mut security = Vec::new();

        if kind != Some("security") {
            access = query_table(&self.pool, "audit_access", AuditKind::Access, &filter, limit).await?;
        }
        if kind != Some("access") {
            security = query_table(&self.pool, "audit_security", AuditKind::Security, &filter, limit).await?;
        }

        let mut merged = access;
        merged.extend(security);
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged.truncate(limit as usize);
        Ok(merged)
    }

    /// `CleanupExpired()`: deletes entries past the retention window from
    /// both logical tables.
    pub async fn cleanup_expired(&self) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - self.retention;
        let a = sqlx::query("DELETE FROM audit_access WHERE \"timestamp\" < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        let s = sqlx::query("DELETE FROM audit_security WHERE \"timestamp\" < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(a.rows_affected() + s.rows_affected())
    }
}

async fn write_entry(pool: &PgPool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    let table = match entry.kind {
        AuditKind::Access => "audit_access",
        AuditKind::Security => "audit_security",
    };
    let query = format!(
        r#"INSERT INTO {table}
           (id, "timestamp", actor, resource, resource_id, action, allowed, reason, severity,
            source_address, user_agent, request_path, context)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#
    );
    sqlx::query(&query)
        .bind(entry.id)
        .bind(entry.timestamp)
        .bind(&entry.actor)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(&entry.action)
        .bind(entry.allowed)
        .bind(&entry.reason)
        .bind(entry.severity.as_str())
        .bind(&entry.source_address)
        .bind(&entry.user_agent)
        .bind(&entry.request_path)
        .bind(&entry.context)
        .execute(pool)
        .await?;
    Ok(())
}

async fn query_table(
    pool: &PgPool,
    table: &str,
    kind: AuditKind,
    filter: &AuditQuery,
    limit: i64,
) -> anyhow::Result<Vec<AuditEntry>> {
    let mut sql = format!(
        r#"SELECT id, "timestamp", actor, resource, resource_id, action, allowed, reason,
                  severity, source_address, user_agent, request_path, context
           FROM {table} WHERE 1=1"#
    );
    let mut binds: Vec<String> = Vec::new();

    if let Some(actor) = &filter.actor {
        binds.push(actor.clone());
        sql.push_str(&format!(" AND actor = ${}", binds.len()));
    }
    if let Some(resource) = &filter.resource {
        binds.push(resource.clone());
        sql.push_str(&format!(" AND resource = ${}", binds.len()));
    }
    if let Some(severity) = &filter.severity {
        binds.push(severity.as_str().to_string());
        sql.push_str(&format!(" AND severity = ${}", binds.len()));
    }
    if let Some(allowed) = filter.allowed {
        sql.push_str(&format!(" AND allowed = {}", allowed));
    }
    if filter.since.is_some() {
        sql.push_str(&format!(r#" AND "timestamp" >= ${}"#, binds.len() + 1));
    }
    sql.push_str(r#" ORDER BY "timestamp" DESC LIMIT "#);
    sql.push_str(&limit.to_string());

    let mut query = sqlx::query_as::<_, AuditRow>(&sql);
    for bind in binds {
        query = query.bind(bind);
    }
    if let Some(since) = filter.since {
        query = query.bind(since);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(|r| r.into_entry(kind)).collect())
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    timestamp: DateTime<Utc>,
    actor: Option<String>,
    resource: String,
    resource_id: Option<String>,
    action: String,
    allowed: bool,
    reason: String,
    severity: String,
    source_address: Option<String>,
    user_agent: Option<String>,
    request_path: Option<String>,
    context: Json,
}

impl AuditRow {
    fn into_entry(self, kind: AuditKind) -> AuditEntry {
        let severity = match self.severity.as_str() {
            "critical" => Severity::Critical,
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        };
        AuditEntry {
            id: self.id,
            timestamp: self.timestamp,
            kind,
            actor: self.actor,
            resource: self.resource,
            resource_id: self.resource_id,
            action: self.action,
            allowed: self.allowed,
            reason: self.reason,
            severity,
            source_address: self.source_address,
            user_agent: self.user_agent,
            request_path: self.request_path,
            context: self.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_entries_are_always_info() {
        let entry = AuditEntry::new(AuditKind::Access, Some("alice".into()), "ticket", "ticketUpdate", true, "ok");
        assert_eq!(entry.severity, Severity::Info);
    }

    #[test]
    fn denial_reasons_map_to_warning() {
        let entry = AuditEntry::new(
            AuditKind::Access,
            Some("alice".into()),
            "ticket",
            "ticketUpdate",
            false,
            "missing-permission",
        );
        assert_eq!(entry.severity, Severity::Warning);
    }

    #[test]
    fn ingress_reasons_map_to_error() {
        let entry = AuditEntry::new(AuditKind::Security, None, "ingress", "request", false, "rate-limit");
        assert_eq!(entry.severity, Severity::Error);
    }

    #[test]
    fn brute_force_lockout_is_critical() {
        let entry = AuditEntry::new(
            AuditKind::Security,
            None,
            "ingress",
            "login",
            false,
            "brute-force-lockout",
        );
        assert_eq!(entry.severity, Severity::Critical);
    }
}
