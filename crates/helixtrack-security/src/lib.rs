//! Append-only security audit records plus the ordered ingress filter
//! chain.

pub mod audit;
pub mod ingress;

pub use audit::{AuditEntry, AuditKind, AuditQuery, AuditSink, Severity};
pub use ingress::{IngressDenial, IngressPipeline, PipelineConfig, RequestContext};
