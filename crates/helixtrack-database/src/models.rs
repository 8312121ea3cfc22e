//! Row types returned by the repositories, distinct from the wire-level
//! domain types in `helixtrack-core` so a schema change doesn't ripple
//! straight into the authorization engine's types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct GrantRow {
    pub id: Uuid,
    pub grantee_kind: String,
    pub grantee_id: String,
    pub resource: String,
    pub level: i16,
    pub project_id: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RoleAssignmentRow {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EntitySecurityRow {
    pub entity_kind: String,
    pub entity_id: String,
    /// `None` when the row (or its `security_level` join) doesn't exist —
    /// the engine treats that as "no security level to check".
    pub security_level_id: Option<Uuid>,
    pub security_level_rank: Option<i16>,
    pub project_id: Option<String>,
    pub required_roles: Vec<String>,
    pub team_members: Vec<String>,
}
