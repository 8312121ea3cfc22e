//! Shared domain types for HelixTrack Core.

pub mod access;
pub mod error;
pub mod permission;
pub mod principal;

pub use access::{AccessDecision, AccessRequest};
pub use error::{CoreError, CoreResult};
pub use permission::{Action, GranteeKind, PermissionGrant, PermissionLevel, Resource, Role};
pub use principal::{Principal, RoleAssignment, SecurityLevel};

use uuid::Uuid;

/// Universal identifier type used throughout HelixTrack, matching the
/// engine-wide `HelixId` convention.
pub type HelixId = Uuid;
