//! The request/response shapes shared by the permission cache and the
//! authorization engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The four-tuple the cache keys on, plus the context map the engine needs
/// to evaluate security levels and project roles.
///
/// `context` is a `BTreeMap` rather than a `HashMap` so iteration order is
/// deterministic — equivalent requests must hash equally regardless of the
/// order a caller populated the context map in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub username: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub project_id: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl AccessRequest {
    pub fn new(
        username: impl Into<String>,
        resource: impl Into<String>,
        resource_id: Option<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            resource: resource.into(),
            resource_id,
            action: action.into(),
            project_id: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// The uniform access decision: `{allowed, reason}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AccessDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}
