//! Principal, role assignment, and security-level types.

use crate::permission::Role;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A role binding, either scoped to a project or global.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: Role,
    pub project_scope: Option<String>,
}

impl RoleAssignment {
    pub fn global(role: Role) -> Self {
        Self {
            role,
            project_scope: None,
        }
    }

    pub fn scoped(role: Role, project_id: impl Into<String>) -> Self {
        Self {
            role,
            project_scope: Some(project_id.into()),
        }
    }

    /// Whether this assignment is in effect for the given project (or
    /// globally, in which case it applies to every project).
    pub fn applies_to_project(&self, project_id: Option<&str>) -> bool {
        match (&self.project_scope, project_id) {
            (None, _) => true,
            (Some(scope), Some(pid)) => scope == pid,
            (Some(_), None) => false,
        }
    }
}

/// An authenticated caller materialized from persistent tables — a
/// stable username, team memberships, and role assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub teams: HashSet<String>,
    pub roles: Vec<RoleAssignment>,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            teams: HashSet::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.teams.insert(team_id.into());
        self
    }

    pub fn with_role(mut self, assignment: RoleAssignment) -> Self {
        self.roles.push(assignment);
        self
    }

    /// The highest-ranked role this principal holds in the given project (or
    /// globally). Returns `None` if the principal holds no applicable role —
    /// "missing" is not a denial by itself; the caller
    /// must still weigh it against permission grants.
    pub fn highest_role_in(&self, project_id: Option<&str>) -> Option<Role> {
        self.roles
            .iter()
            .filter(|a| a.applies_to_project(project_id))
            .map(|a| a.role)
            .max()
    }

    /// True iff the principal holds `role` or any higher-ranked role in
    /// `project` (or globally).
    pub fn evaluates_role(&self, project_id: Option<&str>, role: Role) -> bool {
        self.highest_role_in(project_id)
            .map(|held| held >= role)
            .unwrap_or(false)
    }

    pub fn is_project_admin(&self, project_id: Option<&str>) -> bool {
        self.highest_role_in(project_id)
            .map(Role::is_project_admin)
            .unwrap_or(false)
    }
}

/// A 0-5 classification attached to an entity, independent of permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    pub const PUBLIC: SecurityLevel = SecurityLevel(0);
    pub const AUTHENTICATED: SecurityLevel = SecurityLevel(1);
    pub const TEAM: SecurityLevel = SecurityLevel(2);
    pub const ROLE: SecurityLevel = SecurityLevel(3);
    pub const ADMIN: SecurityLevel = SecurityLevel(4);
    pub const EXPLICIT_ONLY: SecurityLevel = SecurityLevel(5);

    pub fn new(rank: u8) -> Result<Self, CoreError> {
        if rank <= 5 {
            Ok(Self(rank))
        } else {
            Err(CoreError::InvalidSecurityLevel(rank as i32))
        }
    }

    pub fn rank(self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_role_is_max_over_inheritance_chain() {
        let principal = Principal::new("alice")
            .with_role(RoleAssignment::scoped(Role::Viewer, "proj-1"))
            .with_role(RoleAssignment::scoped(Role::Developer, "proj-1"));
        assert_eq!(
            principal.highest_role_in(Some("proj-1")),
            Some(Role::Developer)
        );
    }

    #[test]
    fn global_role_applies_to_every_project() {
        let principal = Principal::new("alice").with_role(RoleAssignment::global(Role::Developer));
        assert!(principal.evaluates_role(Some("proj-1"), Role::Developer));
        assert!(principal.evaluates_role(Some("anything"), Role::Contributor));
        assert!(!principal.evaluates_role(Some("anything"), Role::ProjectAdministrator));
    }

    #[test]
    fn security_level_rejects_out_of_range() {
        assert!(SecurityLevel::new(6).is_err());
        assert!(SecurityLevel::new(5).is_ok());
    }
}
