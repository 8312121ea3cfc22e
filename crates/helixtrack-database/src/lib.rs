//! Persistence layer for HelixTrack Core's access-control state: grants,
//! team membership, role assignments, and security levels.
//! Domain CRUD tables are explicitly out of scope; this crate only owns
//! the tables the authorization engine and audit sink need.

pub mod config;
pub mod models;
pub mod pool;
pub mod repository;

pub use config::{DatabaseConfig, DatabaseKind};
pub use models::{EntitySecurityRow, GrantRow, RoleAssignmentRow};
pub use pool::{connect, run_migrations};
pub use repository::{
    postgres::{PgGrantRepository, PgRoleAssignmentRepository, PgSecurityLevelRepository, PgTeamRepository},
    GrantRepository, RepoResult, RepositoryError, RoleAssignmentRepository, SecurityLevelRepository,
    TeamRepository,
};

#[cfg(feature = "test-util")]
pub use repository::{MockGrantRepository, MockRoleAssignmentRepository, MockSecurityLevelRepository, MockTeamRepository};
