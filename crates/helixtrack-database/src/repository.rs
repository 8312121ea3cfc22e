//! Repository trait boundary for access-control state. Kept as narrow
//! async traits (rather than one big `Repository<T, ID>`) because the
//! authorization engine's three-level lookup needs independent,
//! differently-shaped queries, not generic CRUD.

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{EntitySecurityRow, GrantRow, RoleAssignmentRow};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Direct, team, and role grants for a resource.
#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait GrantRepository: Send + Sync {
    async fn grants_for_user(&self, username: &str, resource: &str) -> RepoResult<Vec<GrantRow>>;
    async fn grants_for_teams(&self, team_ids: &[String], resource: &str) -> RepoResult<Vec<GrantRow>>;
    async fn grants_for_roles(&self, role_names: &[String], resource: &str) -> RepoResult<Vec<GrantRow>>;

    /// Same three lookups, unfiltered by resource — used by
    /// `GetSecurityContext` to build the "effective permissions by resource"
    /// map instead of requiring the caller to already know which resources
    /// to ask about.
    async fn all_grants_for_user(&self, username: &str) -> RepoResult<Vec<GrantRow>>;
    async fn all_grants_for_teams(&self, team_ids: &[String]) -> RepoResult<Vec<GrantRow>>;
    async fn all_grants_for_roles(&self, role_names: &[String]) -> RepoResult<Vec<GrantRow>>;

    async fn insert_grant(&self, grant: &GrantRow) -> RepoResult<()>;
    async fn soft_delete_grant(&self, id: Uuid) -> RepoResult<()>;
}

#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn teams_for_user(&self, username: &str) -> RepoResult<HashSet<String>>;
    async fn add_member(&self, team_id: &str, username: &str) -> RepoResult<()>;
    async fn remove_member(&self, team_id: &str, username: &str) -> RepoResult<()>;
}

#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    async fn roles_for_user(&self, username: &str) -> RepoResult<Vec<RoleAssignmentRow>>;
    async fn assign_role(&self, username: &str, role: &str, project_id: Option<&str>) -> RepoResult<()>;
    async fn revoke_role(&self, username: &str, role: &str, project_id: Option<&str>) -> RepoResult<()>;
}

/// Security-level lookup plus the explicit-grant table that overrides
/// inheritance at every level.
#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait SecurityLevelRepository: Send + Sync {
    async fn entity_security(&self, entity_kind: &str, entity_id: &str) -> RepoResult<Option<EntitySecurityRow>>;
    async fn has_explicit_grant(
        &self,
        security_level_id: Uuid,
        grantee_kind: &str,
        grantee_id: &str,
    ) -> RepoResult<bool>;
}

pub mod postgres {
    //! Postgres-backed implementations, one struct per trait, each a thin
    //! wrapper holding a `PgPool`.
    use super::*;
    use sqlx::PgPool;

    pub struct PgGrantRepository {
        pool: PgPool,
    }

    impl PgGrantRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl GrantRepository for PgGrantRepository {
        async fn grants_for_user(&self, username: &str, resource: &str) -> RepoResult<Vec<GrantRow>> {
            let rows = sqlx::query_as::<_, GrantRow>(
                r#"SELECT id, grantee_kind, grantee_id, resource, level, project_id, deleted, created_at, modified_at
                   FROM permission_grant
                   WHERE grantee_kind = 'user' AND grantee_id = $1 AND resource = $2 AND NOT deleted"#,
            )
            .bind(username)
            .bind(resource)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn grants_for_teams(&self, team_ids: &[String], resource: &str) -> RepoResult<Vec<GrantRow>> {
            if team_ids.is_empty() {
                return Ok(Vec::new());
            }
            let rows = sqlx::query_as::<_, GrantRow>(
                r#"SELECT id, grantee_kind, grantee_id, resource, level, project_id, deleted, created_at, modified_at
                   FROM permission_grant
                   WHERE grantee_kind = 'team' AND grantee_id = ANY($1) AND resource = $2 AND NOT deleted"#,
            )
            .bind(team_ids)
            .bind(resource)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn grants_for_roles(&self, role_names: &[String], resource: &str) -> RepoResult<Vec<GrantRow>> {
            if role_names.is_empty() {
                return Ok(Vec::new());
            }
            let rows = sqlx::query_as::<_, GrantRow>(
                r#"SELECT id, grantee_kind, grantee_id, resource, level, project_id, deleted, created_at, modified_at
                   FROM permission_grant
                   WHERE grantee_kind = 'role' AND grantee_id = ANY($1) AND resource = $2 AND NOT deleted"#,
            )
            .bind(role_names)
            .bind(resource)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn all_grants_for_user(&self, username: &str) -> RepoResult<Vec<GrantRow>> {
            let rows = sqlx::query_as::<_, GrantRow>(
                r#"SELECT id, grantee_kind, grantee_id, resource, level, project_id, deleted, created_at, modified_at
                   FROM permission_grant
                   WHERE grantee_kind = 'user' AND grantee_id = $1 AND NOT deleted"#,
            )
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn all_grants_for_teams(&self, team_ids: &[String]) -> RepoResult<Vec<GrantRow>> {
            if team_ids.is_empty() {
                return Ok(Vec::new());
            }
            let rows = sqlx::query_as::<_, GrantRow>(
                r#"SELECT id, grantee_kind, grantee_id, resource, level, project_id, deleted, created_at, modified_at
                   FROM permission_grant
                   WHERE grantee_kind = 'team' AND grantee_id = ANY($1) AND NOT deleted"#,
            )
            .bind(team_ids)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn all_grants_for_roles(&self, role_names: &[String]) -> RepoResult<Vec<GrantRow>> {
            if role_names.is_empty() {
                return Ok(Vec::new());
            }
            let rows = sqlx::query_as::<_, GrantRow>(
                r#"SELECT id, grantee_kind, grantee_id, resource, level, project_id, deleted, created_at, modified_at
                   FROM permission_grant
                   WHERE grantee_kind = 'role' AND grantee_id = ANY($1) AND NOT deleted"#,
            )
            .bind(role_names)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn insert_grant(&self, grant: &GrantRow) -> RepoResult<()> {
            sqlx::query(
                r#"INSERT INTO permission_grant
                   (id, grantee_kind, grantee_id, resource, level, project_id, deleted, created_at, modified_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
            )
            .bind(grant.id)
            .bind(&grant.grantee_kind)
            .bind(&grant.grantee_id)
            .bind(&grant.resource)
            .bind(grant.level)
            .bind(&grant.project_id)
            .bind(grant.deleted)
            .bind(grant.created_at)
            .bind(grant.modified_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn soft_delete_grant(&self, id: Uuid) -> RepoResult<()> {
            sqlx::query("UPDATE permission_grant SET deleted = TRUE, modified_at = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    pub struct PgTeamRepository {
        pool: PgPool,
    }

    impl PgTeamRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl TeamRepository for PgTeamRepository {
        async fn teams_for_user(&self, username: &str) -> RepoResult<HashSet<String>> {
            let rows: Vec<(String,)> = sqlx::query_as("SELECT team_id FROM team_member WHERE username = $1")
                .bind(username)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(|(t,)| t).collect())
        }

        async fn add_member(&self, team_id: &str, username: &str) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO team_member (team_id, username) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(team_id)
            .bind(username)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn remove_member(&self, team_id: &str, username: &str) -> RepoResult<()> {
            sqlx::query("DELETE FROM team_member WHERE team_id = $1 AND username = $2")
                .bind(team_id)
                .bind(username)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    pub struct PgRoleAssignmentRepository {
        pool: PgPool,
    }

    impl PgRoleAssignmentRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl RoleAssignmentRepository for PgRoleAssignmentRepository {
        async fn roles_for_user(&self, username: &str) -> RepoResult<Vec<RoleAssignmentRow>> {
            let rows = sqlx::query_as::<_, RoleAssignmentRow>(
                "SELECT id, username, role, project_id FROM role_assignment WHERE username = $1",
            )
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn assign_role(&self, username: &str, role: &str, project_id: Option<&str>) -> RepoResult<()> {
            sqlx::query("INSERT INTO role_assignment (id, username, role, project_id) VALUES ($1, $2, $3, $4)")
                .bind(Uuid::new_v4())
                .bind(username)
                .bind(role)
                .bind(project_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_role(&self, username: &str, role: &str, project_id: Option<&str>) -> RepoResult<()> {
            sqlx::query(
                "DELETE FROM role_assignment WHERE username = $1 AND role = $2 AND project_id IS NOT DISTINCT FROM $3",
            )
            .bind(username)
            .bind(role)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    pub struct PgSecurityLevelRepository {
        pool: PgPool,
    }

    impl PgSecurityLevelRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl SecurityLevelRepository for PgSecurityLevelRepository {
        async fn entity_security(&self, entity_kind: &str, entity_id: &str) -> RepoResult<Option<EntitySecurityRow>> {
            let row = sqlx::query_as::<_, EntitySecurityRow>(
                r#"SELECT e.entity_kind, e.entity_id, e.security_level_id, s.rank AS security_level_rank,
                          e.project_id, e.required_roles, e.team_members
                   FROM entity_security_level e
                   LEFT JOIN security_level s ON s.id = e.security_level_id
                   WHERE e.entity_kind = $1 AND e.entity_id = $2"#,
            )
            .bind(entity_kind)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn has_explicit_grant(
            &self,
            security_level_id: Uuid,
            grantee_kind: &str,
            grantee_id: &str,
        ) -> RepoResult<bool> {
            let row: Option<(i32,)> = sqlx::query_as(
                r#"SELECT 1 FROM security_level_grant
                   WHERE security_level_id = $1 AND grantee_kind = $2 AND grantee_id = $3"#,
            )
            .bind(security_level_id)
            .bind(grantee_kind)
            .bind(grantee_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.is_some())
        }
    }
}
