use thiserror::Error;

/// Result type used throughout the core crates.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid permission level: {0}")]
    InvalidPermissionLevel(i32),

    #[error("invalid role name: {0}")]
    InvalidRole(String),

    #[error("invalid security level: {0}")]
    InvalidSecurityLevel(i32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
