//! Authorization engine: three independent set lookups (direct grants,
//! team grants, role grants) reduced by `max`, plus the security-level and
//! project-role overlays layered on top. Deliberately not a graph walk —
//! there are no cycles to resolve, just a composition of lookups and a
//! max reduction.

use helixtrack_cache::PermissionCache;
use helixtrack_core::{AccessDecision, AccessRequest, Principal, PermissionLevel, Role, RoleAssignment};
use helixtrack_database::{
    GrantRepository, GrantRow, RepositoryError, RoleAssignmentRepository, SecurityLevelRepository,
    TeamRepository,
};
use helixtrack_security::{AuditEntry, AuditKind, AuditSink};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone)]
pub struct AuthEngineConfig {
    pub enable_cache: bool,
    pub enable_audit: bool,
}

impl Default for AuthEngineConfig {
    fn default() -> Self {
        Self { enable_cache: true, enable_audit: true }
    }
}

/// A principal's roles, teams, and effective permissions per resource —
/// the result of `AuthorizationEngine::security_context`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SecurityContext {
    pub roles: Vec<RoleAssignment>,
    pub teams: Vec<String>,
    pub effective_permissions: BTreeMap<String, PermissionLevel>,
}

/// The canonical role name strings used by the `grantee_id` column when
/// `grantee_kind = 'role'` and by `entity_security_level.required_roles`.
fn role_name(role: Role) -> &'static str {
    match role {
        Role::Viewer => "Viewer",
        Role::Contributor => "Contributor",
        Role::Developer => "Developer",
        Role::ProjectLead => "Project-Lead",
        Role::ProjectAdministrator => "Project-Administrator",
    }
}

fn row_applies(row: &GrantRow, project_id: Option<&str>) -> bool {
    match (&row.project_id, project_id) {
        (None, _) => true,
        (Some(scope), Some(pid)) => scope == pid,
        (Some(_), None) => false,
    }
}

/// Holds capability handles to its collaborators (cache, audit sink,
/// repositories) rather than reaching for process-wide globals: construct
/// once at startup and pass by capability to handlers.
pub struct AuthorizationEngine {
    grants: Arc<dyn GrantRepository>,
    teams_repo: Arc<dyn TeamRepository>,
    roles_repo: Arc<dyn RoleAssignmentRepository>,
    security_repo: Arc<dyn SecurityLevelRepository>,
    cache: Arc<PermissionCache>,
    audit: Arc<AuditSink>,
    config: AuthEngineConfig,
}

impl AuthorizationEngine {
    pub fn new(
        grants: Arc<dyn GrantRepository>,
        teams_repo: Arc<dyn TeamRepository>,
        roles_repo: Arc<dyn RoleAssignmentRepository>,
        security_repo: Arc<dyn SecurityLevelRepository>,
        cache: Arc<PermissionCache>,
        audit: Arc<AuditSink>,
        config: AuthEngineConfig,
    ) -> Self {
        Self { grants, teams_repo, roles_repo, security_repo, cache, audit, config }
    }

    /// Materializes a `Principal` from the team-membership and
    /// role-assignment tables. Unknown role names (schema drift, typos in a
    /// migration) are skipped rather than failing the whole lookup.
    pub async fn load_principal(&self, username: &str) -> AuthResult<Principal> {
        let teams = self.teams_repo.teams_for_user(username).await?;
        let role_rows = self.roles_repo.roles_for_user(username).await?;

        let mut principal = Principal::new(username);
        principal.teams = teams;
        for row in role_rows {
            if let Ok(role) = Role::parse(&row.role) {
                principal = principal.with_role(RoleAssignment { role, project_scope: row.project_id });
            }
        }
        Ok(principal)
    }

    /// Full access decision: cache-first, fail-closed, audited.
    pub async fn check_access(&self, request: &AccessRequest) -> AccessDecision {
        if self.config.enable_cache {
            let (cached, hit) = self.cache.get(request).await;
            if hit {
                if let Some(decision) = cached {
                    return decision;
                }
            }
        }

        match self.resolve(request).await {
            Ok(decision) => {
                if self.config.enable_cache {
                    self.cache.put(request, decision.clone()).await;
                }
                if self.config.enable_audit {
                    self.write_audit(request, &decision);
                }
                decision
            }
            Err(err) => {
                error!(error = %err, username = %request.username, resource = %request.resource, "authorization resolution failed, failing closed");
                let decision = AccessDecision::deny("authorization error");
                if self.config.enable_audit {
                    self.write_audit(request, &decision);
                }
                decision
            }
        }
    }

    /// The ordered decision algorithm: permission level, then security
    /// level, then project role. The cache lookup and the cache/audit
    /// write live in `check_access`.
    async fn resolve(&self, request: &AccessRequest) -> AuthResult<AccessDecision> {
        let principal = self.load_principal(&request.username).await?;
        let required = PermissionLevel::required_for_action(&request.action);

        let effective = self
            .effective_permission_level(&principal, &request.resource, request.project_id.as_deref())
            .await?;
        if effective.map(|level| level < required).unwrap_or(true) {
            return Ok(AccessDecision::deny("insufficient permission"));
        }

        if let Some(resource_id) = &request.resource_id {
            if !self.validate_security_level(&principal, &request.resource, resource_id).await? {
                return Ok(AccessDecision::deny("security-level"));
            }
        }

        if let Some(project_id) = &request.project_id {
            // Project-scoped actions additionally require some standing in
            // the project itself: a permission grant alone (e.g. a global
            // team grant) doesn't substitute for project membership. See
            // DESIGN.md for why this reading of project-role denial was chosen.
            if principal.highest_role_in(Some(project_id.as_str())).is_none() {
                return Ok(AccessDecision::deny("role"));
            }
        }

        Ok(AccessDecision::allow("ok"))
    }

    /// The maximum over (a) direct grants, (b) team grants, and (c) role
    /// grants — both explicit `PermissionGrant` rows targeting a role and
    /// the role's own hierarchy-implied level feed the same max, since both
    /// are forms of role standing evaluated in the request's project scope.
    async fn effective_permission_level(
        &self,
        principal: &Principal,
        resource: &str,
        project_id: Option<&str>,
    ) -> AuthResult<Option<PermissionLevel>> {
        let direct = self.grants.grants_for_user(&principal.username, resource).await?;

        let team_ids: Vec<String> = principal.teams.iter().cloned().collect();
        let team_grants = self.grants.grants_for_teams(&team_ids, resource).await?;

        let role_names: Vec<String> = principal
            .roles
            .iter()
            .filter(|assignment| assignment.applies_to_project(project_id))
            .map(|assignment| role_name(assignment.role).to_string())
            .collect();
        let role_grants = self.grants.grants_for_roles(&role_names, resource).await?;

        let mut max_level: Option<PermissionLevel> = None;
        for row in direct.iter().chain(team_grants.iter()).chain(role_grants.iter()) {
            if !row_applies(row, project_id) {
                continue;
            }
            if let Ok(level) = PermissionLevel::from_rank(row.level as i32) {
                max_level = Some(max_level.map_or(level, |current| current.max(level)));
            }
        }

        for assignment in principal.roles.iter().filter(|a| a.applies_to_project(project_id)) {
            let implied = assignment.role.implied_permission_level();
            max_level = Some(max_level.map_or(implied, |current| current.max(implied)));
        }

        Ok(max_level)
    }

    /// Security-level check. Returns `true` (no denial) if the entity
    /// carries no security level at all.
    pub async fn validate_security_level(
        &self,
        principal: &Principal,
        entity_kind: &str,
        entity_id: &str,
    ) -> AuthResult<bool> {
        let entity = match self.security_repo.entity_security(entity_kind, entity_id).await? {
            Some(entity) => entity,
            None => return Ok(true),
        };
        let rank = match entity.security_level_rank {
            Some(rank) => rank,
            None => return Ok(true),
        };

        let allowed = match rank {
            0 => true,
            1 => true, // any authenticated principal; a Principal always is one
            2 => {
                let team_match = entity.team_members.iter().any(|m| principal.teams.contains(m));
                team_match || self.has_any_explicit_grant(principal, &entity).await?
            }
            3 => {
                let role_match = principal
                    .roles
                    .iter()
                    .filter(|a| a.applies_to_project(entity.project_id.as_deref()))
                    .any(|a| entity.required_roles.iter().any(|r| r == role_name(a.role)));
                role_match || self.has_any_explicit_grant(principal, &entity).await?
            }
            4 => {
                principal.is_project_admin(entity.project_id.as_deref())
                    || self.has_any_explicit_grant(principal, &entity).await?
            }
            5 => self.has_any_explicit_grant(principal, &entity).await?,
            _ => false,
        };
        Ok(allowed)
    }

    async fn has_any_explicit_grant(
        &self,
        principal: &Principal,
        entity: &helixtrack_database::EntitySecurityRow,
    ) -> AuthResult<bool> {
        let Some(security_level_id) = entity.security_level_id else {
            return Ok(false);
        };

        if self.security_repo.has_explicit_grant(security_level_id, "user", &principal.username).await? {
            return Ok(true);
        }
        for team in &principal.teams {
            if self.security_repo.has_explicit_grant(security_level_id, "team", team).await? {
                return Ok(true);
            }
        }
        for assignment in &principal.roles {
            let name = role_name(assignment.role);
            if self.security_repo.has_explicit_grant(security_level_id, "role", name).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Verifies a WebSocket client's principal holds at least one of an
    /// event's `required-permissions` on its `project-id`.
    /// Fails closed (returns `false`) on any repository error, the same as
    /// `check_access`, rather than propagating it to the Hub's delivery loop.
    pub async fn satisfies(
        &self,
        username: &str,
        resource: &str,
        project_id: Option<&str>,
        required_permissions: &[String],
    ) -> bool {
        // The scale is totally ordered and each level subsumes the ones
        // below it, so satisfying several named permissions at once reduces
        // to satisfying the strictest one named.
        let required = required_permissions
            .iter()
            .filter_map(|name| PermissionLevel::parse_name(name))
            .max();
        let Some(required) = required else {
            // No (recognized) required permission means the event carries no
            // gate: delivery is only restricted when the context names
            // required permissions.
            return true;
        };

        let principal = match self.load_principal(username).await {
            Ok(principal) => principal,
            Err(err) => {
                error!(error = %err, username, "failed to load principal for event fan-out, dropping delivery");
                return false;
            }
        };

        match self.effective_permission_level(&principal, resource, project_id).await {
            Ok(effective) => effective.map(|level| level >= required).unwrap_or(false),
            Err(err) => {
                error!(error = %err, username, "failed to resolve event fan-out permissions, dropping delivery");
                false
            }
        }
    }

    /// True iff `principal` holds `role` or any higher-ranked role in
    /// `project` (or globally).
    pub fn evaluate_role(&self, principal: &Principal, project: Option<&str>, role: Role) -> bool {
        principal.evaluates_role(project, role)
    }

    pub fn is_project_admin(&self, principal: &Principal, project: Option<&str>) -> bool {
        principal.is_project_admin(project)
    }

    /// A principal's roles, teams, and effective permission level per
    /// resource.
    pub async fn get_security_context(&self, username: &str) -> AuthResult<SecurityContext> {
        let principal = self.load_principal(username).await?;

        let direct = self.grants.all_grants_for_user(username).await?;
        let team_ids: Vec<String> = principal.teams.iter().cloned().collect();
        let team_grants = self.grants.all_grants_for_teams(&team_ids).await?;
        let role_names: Vec<String> = principal.roles.iter().map(|a| role_name(a.role).to_string()).collect();
        let role_grants = self.grants.all_grants_for_roles(&role_names).await?;

        let mut effective_permissions: BTreeMap<String, PermissionLevel> = BTreeMap::new();
        for row in direct.iter().chain(team_grants.iter()).chain(role_grants.iter()) {
            if let Ok(level) = PermissionLevel::from_rank(row.level as i32) {
                effective_permissions
                    .entry(row.resource.clone())
                    .and_modify(|current| *current = (*current).max(level))
                    .or_insert(level);
            }
        }

        Ok(SecurityContext {
            roles: principal.roles.clone(),
            teams: principal.teams.into_iter().collect(),
            effective_permissions,
        })
    }

    /// Drops every cached decision for a single principal.
    pub async fn invalidate_cache(&self, username: &str) {
        self.cache.invalidate_principal(username).await;
    }

    /// Drops the entire cache — used when a change is role- or team-wide.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await;
    }

    fn write_audit(&self, request: &AccessRequest, decision: &AccessDecision) {
        let mut entry = AuditEntry::new(
            AuditKind::Access,
            Some(request.username.clone()),
            request.resource.clone(),
            request.action.clone(),
            decision.allowed,
            decision.reason.clone(),
        );
        if let Some(id) = &request.resource_id {
            entry = entry.with_resource_id(id.clone());
        }
        self.audit.log(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helixtrack_database::MockGrantRepository;

    fn grant_row(kind: &str, id: &str, resource: &str, level: i16, project: Option<&str>) -> GrantRow {
        GrantRow {
            id: uuid::Uuid::new_v4(),
            grantee_kind: kind.to_string(),
            grantee_id: id.to_string(),
            resource: resource.to_string(),
            level,
            project_id: project.map(|s| s.to_string()),
            deleted: false,
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
        }
    }

    // Exercises the max-over-grants rule against a mocked
    // repository, without standing up a full `AuthorizationEngine` (which
    // needs a live cache + audit sink backed by a real pool).
    #[tokio::test]
    async fn effective_level_is_max_over_direct_and_team_grants() {
        let mut grants = MockGrantRepository::new();
        grants
            .expect_grants_for_user()
            .returning(|_, _| Ok(vec![grant_row("user", "alice", "ticket", 1, None)]));
        grants
            .expect_grants_for_teams()
            .returning(|_, _| Ok(vec![grant_row("team", "team-a", "ticket", 2, None)]));
        grants.expect_grants_for_roles().returning(|_, _| Ok(vec![]));

        let principal = Principal::new("alice").with_team("team-a");

        let direct = grants.grants_for_user(&principal.username, "ticket").await.unwrap();
        let team_ids: Vec<String> = principal.teams.iter().cloned().collect();
        let team_grants = grants.grants_for_teams(&team_ids, "ticket").await.unwrap();
        let role_grants = grants.grants_for_roles(&[], "ticket").await.unwrap();

        let mut max_level: Option<PermissionLevel> = None;
        for row in direct.iter().chain(team_grants.iter()).chain(role_grants.iter()) {
            if let Ok(l) = PermissionLevel::from_rank(row.level as i32) {
                max_level = Some(max_level.map_or(l, |c| c.max(l)));
            }
        }

        assert_eq!(max_level, Some(PermissionLevel::Create));
    }

    #[test]
    fn row_applies_treats_global_grant_as_matching_any_project() {
        let row = grant_row("user", "alice", "ticket", 1, None);
        assert!(row_applies(&row, Some("proj-1")));
        assert!(row_applies(&row, None));

        let scoped = grant_row("user", "alice", "ticket", 1, Some("proj-1"));
        assert!(row_applies(&scoped, Some("proj-1")));
        assert!(!row_applies(&scoped, Some("proj-2")));
        assert!(!row_applies(&scoped, None));
    }
}
