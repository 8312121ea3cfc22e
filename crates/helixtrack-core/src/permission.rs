//! Permission levels, roles, and grants: a totally-ordered numeric scale
//! rather than name-string wildcard matching.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The totally ordered permission scale. Higher levels subsume
/// lower ones: a level-5 grant allows any action of level <= 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PermissionLevel {
    Read = 1,
    Create = 2,
    /// Update and Execute share rank 3.
    UpdateOrExecute = 3,
    Delete = 5,
}

impl PermissionLevel {
    pub fn rank(self) -> i32 {
        self as i32
    }

    pub fn from_rank(rank: i32) -> CoreResult<Self> {
        match rank {
            1 => Ok(Self::Read),
            2 => Ok(Self::Create),
            3 => Ok(Self::UpdateOrExecute),
            5 => Ok(Self::Delete),
            other => Err(CoreError::InvalidPermissionLevel(other)),
        }
    }

    /// Parses a permission-name string (as used in an event's
    /// `required-permissions` list) into its level. Unknown names
    /// return `None`; callers should treat that as "cannot be satisfied"
    /// rather than defaulting to the lowest bar.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "READ" => Some(Self::Read),
            "CREATE" => Some(Self::Create),
            "UPDATE" | "EXECUTE" => Some(Self::UpdateOrExecute),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Canonical wire name,
    /// the inverse of [`Self::parse_name`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Create => "CREATE",
            Self::UpdateOrExecute => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Maps an action name to its required permission level:
    /// `*Create -> Create`, `*Modify/*Update -> Update`, `*Remove/*Delete ->
    /// Delete`, `*List/*Read -> Read`, and the special-cased verbs that also
    /// require Update (`*Release`, `*Archive`, `*Share`).
    pub fn required_for_action(action: &str) -> Self {
        let lower = action.to_ascii_lowercase();
        if lower.ends_with("delete") || lower.ends_with("remove") {
            Self::Delete
        } else if lower.ends_with("update")
            || lower.ends_with("modify")
            || lower.ends_with("release")
            || lower.ends_with("archive")
            || lower.ends_with("share")
            || lower.ends_with("execute")
        {
            Self::UpdateOrExecute
        } else if lower.ends_with("create") {
            Self::Create
        } else {
            // list/read/get and anything unrecognized default to the
            // lowest bar; an unknown-action 404 happens upstream in the
            // dispatcher before this is ever consulted.
            Self::Read
        }
    }
}

/// Role hierarchy. Ordered; a higher rank subsumes every
/// permission of a lower rank within the same project scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Viewer = 1,
    Contributor = 2,
    Developer = 3,
    ProjectLead = 4,
    ProjectAdministrator = 5,
}

impl Role {
    pub fn rank(self) -> i32 {
        self as i32
    }

    pub fn parse(name: &str) -> CoreResult<Self> {
        match name {
            "Viewer" => Ok(Self::Viewer),
            "Contributor" => Ok(Self::Contributor),
            "Developer" => Ok(Self::Developer),
            "Project-Lead" | "ProjectLead" => Ok(Self::ProjectLead),
            "Project-Administrator" | "ProjectAdministrator" => Ok(Self::ProjectAdministrator),
            other => Err(CoreError::InvalidRole(other.to_string())),
        }
    }

    /// The permission level a role of this rank grants on its scope.
    /// Mirrors the permission scale: Viewer reads, Contributor creates,
    /// Developer updates/executes, Lead and Admin can delete.
    pub fn implied_permission_level(self) -> PermissionLevel {
        match self {
            Role::Viewer => PermissionLevel::Read,
            Role::Contributor => PermissionLevel::Create,
            Role::Developer => PermissionLevel::UpdateOrExecute,
            Role::ProjectLead | Role::ProjectAdministrator => PermissionLevel::Delete,
        }
    }

    pub fn is_project_admin(self) -> bool {
        self >= Role::ProjectAdministrator
    }
}

/// The kind of entity a grant, team membership, or role assignment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranteeKind {
    User,
    Team,
    Role,
}

/// A resource name, e.g. "ticket", "project", "version".
pub type Resource = String;

/// An action name, e.g. "ticketCreate".
pub type Action = String;

/// A permission grant: `(grantee-kind, grantee-id, resource, level,
/// optional project-scope, deleted flag, timestamps)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub id: Uuid,
    pub grantee_kind: GranteeKind,
    /// Username, team id, or role name depending on `grantee_kind`.
    pub grantee_id: String,
    pub resource: Resource,
    pub level: PermissionLevel,
    pub project_scope: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl PermissionGrant {
    pub fn new(
        grantee_kind: GranteeKind,
        grantee_id: impl Into<String>,
        resource: impl Into<String>,
        level: PermissionLevel,
        project_scope: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            grantee_kind,
            grantee_id: grantee_id.into(),
            resource: resource.into(),
            level,
            project_scope,
            deleted: false,
            created_at: now,
            modified_at: now,
        }
    }

    /// Whether this grant applies to the given project scope: global grants
    /// (`project_scope = None`) apply everywhere; scoped grants apply only
    /// within their own project.
    pub fn applies_to_project(&self, project_id: Option<&str>) -> bool {
        match (&self.project_scope, project_id) {
            (None, _) => true,
            (Some(scope), Some(pid)) => scope == pid,
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_level_ordering_subsumes_lower_levels() {
        assert!(PermissionLevel::Delete > PermissionLevel::UpdateOrExecute);
        assert!(PermissionLevel::UpdateOrExecute > PermissionLevel::Create);
        assert!(PermissionLevel::Create > PermissionLevel::Read);
    }

    #[test]
    fn action_to_level_mapping_covers_all_verbs() {
        assert_eq!(
            PermissionLevel::required_for_action("ticketCreate"),
            PermissionLevel::Create
        );
        assert_eq!(
            PermissionLevel::required_for_action("ticketUpdate"),
            PermissionLevel::UpdateOrExecute
        );
        assert_eq!(
            PermissionLevel::required_for_action("ticketDelete"),
            PermissionLevel::Delete
        );
        assert_eq!(
            PermissionLevel::required_for_action("ticketList"),
            PermissionLevel::Read
        );
        assert_eq!(
            PermissionLevel::required_for_action("versionRelease"),
            PermissionLevel::UpdateOrExecute
        );
        assert_eq!(
            PermissionLevel::required_for_action("filterShare"),
            PermissionLevel::UpdateOrExecute
        );
    }

    #[test]
    fn parse_name_is_case_insensitive_and_rejects_unknown_names() {
        assert_eq!(PermissionLevel::parse_name("read"), Some(PermissionLevel::Read));
        assert_eq!(PermissionLevel::parse_name("DELETE"), Some(PermissionLevel::Delete));
        assert_eq!(PermissionLevel::parse_name("frobnicate"), None);
    }

    #[test]
    fn role_hierarchy_rank_order() {
        assert!(Role::ProjectAdministrator > Role::ProjectLead);
        assert!(Role::ProjectLead > Role::Developer);
        assert!(Role::Developer > Role::Contributor);
        assert!(Role::Contributor > Role::Viewer);
        assert!(Role::ProjectAdministrator.is_project_admin());
        assert!(!Role::ProjectLead.is_project_admin());
    }

    #[test]
    fn grant_project_scope_matching() {
        let global = PermissionGrant::new(
            GranteeKind::User,
            "alice",
            "ticket",
            PermissionLevel::Read,
            None,
        );
        assert!(global.applies_to_project(Some("proj-1")));
        assert!(global.applies_to_project(None));

        let scoped = PermissionGrant::new(
            GranteeKind::User,
            "alice",
            "ticket",
            PermissionLevel::Read,
            Some("proj-1".to_string()),
        );
        assert!(scoped.applies_to_project(Some("proj-1")));
        assert!(!scoped.applies_to_project(Some("proj-2")));
        assert!(!scoped.applies_to_project(None));
    }
}

/// The "maximum over grants" resolution the authorization engine performs
/// (`effective_permission_level`) is just a fold over `PermissionLevel::max`,
/// so its monotonicity is checked here directly on the ordering rather than
/// through the async engine.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_level() -> impl Strategy<Value = PermissionLevel> {
        prop_oneof![
            Just(PermissionLevel::Read),
            Just(PermissionLevel::Create),
            Just(PermissionLevel::UpdateOrExecute),
            Just(PermissionLevel::Delete),
        ]
    }

    proptest! {
        /// Folding an additional grant into the running maximum never lowers
        /// it: granting principals more access never revokes access they
        /// already had.
        #[test]
        fn additional_grant_never_lowers_effective_level(levels in prop::collection::vec(any_level(), 1..16)) {
            let folded = levels.iter().copied().fold(None::<PermissionLevel>, |acc, level| {
                Some(acc.map_or(level, |current| current.max(level)))
            });
            let running_max = levels.iter().copied().max();
            prop_assert_eq!(folded, running_max);

            let mut prefix_max: Option<PermissionLevel> = None;
            for &level in &levels {
                let next = Some(prefix_max.map_or(level, |current| current.max(level)));
                prop_assert!(next >= prefix_max);
                prefix_max = next;
            }
        }

        /// `rank`/`from_rank` round-trip for every level the type can hold.
        #[test]
        fn rank_round_trips(level in any_level()) {
            prop_assert_eq!(PermissionLevel::from_rank(level.rank()).unwrap(), level);
        }

        /// A role's implied permission level never exceeds what `Delete`
        /// (the ceiling of the scale) allows, and role rank order matches
        /// implied-level order exactly.
        #[test]
        fn role_rank_order_matches_implied_level_order(
            a in prop_oneof![
                Just(Role::Viewer), Just(Role::Contributor), Just(Role::Developer),
                Just(Role::ProjectLead), Just(Role::ProjectAdministrator),
            ],
            b in prop_oneof![
                Just(Role::Viewer), Just(Role::Contributor), Just(Role::Developer),
                Just(Role::ProjectLead), Just(Role::ProjectAdministrator),
            ],
        ) {
            if a > b {
                prop_assert!(a.implied_permission_level() >= b.implied_permission_level());
            } else if a < b {
                prop_assert!(a.implied_permission_level() <= b.implied_permission_level());
            } else {
                prop_assert_eq!(a.implied_permission_level(), b.implied_permission_level());
            }
        }
    }
}
