//! Stable error-code taxonomy and the `ApiError` wrapper, covering the
//! dispatcher's four failure classes: client errors, authorization
//! denials, ingress violations, and internal errors.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// The stable error-code taxonomy. `-1` (success) is represented by
/// `ResponseEnvelope::success`, not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest = 1000,
    UnknownAction = 1001,
    MissingJwt = 1007,
    InvalidJwt = 1008,
    ForbiddenPermission = 1020,
    ForbiddenSecurityLevel = 1021,
    ForbiddenRole = 1022,
    RateLimited = 1030,
    CsrfMismatch = 1031,
    BruteForceLockout = 1032,
    InputInvalid = 1040,
    InternalError = 2000,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Maps an authorization denial reason
    /// to the matching forbidden-* code.
    pub fn from_denial_reason(reason: &str) -> Self {
        match reason {
            "security-level" => Self::ForbiddenSecurityLevel,
            "role" => Self::ForbiddenRole,
            _ => Self::ForbiddenPermission,
        }
    }

    /// Maps an ingress denial reason to its error code.
    pub fn from_ingress_reason(reason: &str) -> Self {
        match reason {
            "rate-limit" => Self::RateLimited,
            "csrf-mismatch" => Self::CsrfMismatch,
            "brute-force-lockout" => Self::BruteForceLockout,
            "slowloris" => Self::InvalidRequest,
            _ => Self::InputInvalid,
        }
    }
}

/// `ApiError` carries both the stable code the client sees and the HTTP
/// transport status the ingress/dispatcher layer maps it to.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub status: u16,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, status: u16) -> Self {
        Self { code, message: message.into(), status }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message, 400)
    }

    pub fn unknown_action(action: &str) -> Self {
        Self::new(ErrorCode::UnknownAction, format!("Unknown action: {action}"), 200)
    }

    pub fn missing_jwt() -> Self {
        Self::new(ErrorCode::MissingJwt, "Missing JWT", 401)
    }

    pub fn invalid_jwt() -> Self {
        Self::new(ErrorCode::InvalidJwt, "Invalid JWT", 401)
    }

    pub fn forbidden(reason: &str) -> Self {
        Self::new(ErrorCode::from_denial_reason(reason), "Permission denied", 403)
    }

    pub fn ingress_denied(reason: &str, detail: Option<&str>, status: u16) -> Self {
        let message = match detail {
            Some(sub_reason) => format!("Invalid input: {sub_reason}"),
            None => format!("Request rejected: {reason}"),
        };
        Self::new(ErrorCode::from_ingress_reason(reason), message, status)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message, 500)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code.code())
    }
}

impl std::error::Error for ApiError {}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(
            actix_web::http::StatusCode::from_u16(self.status).unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
        )
        .json(crate::envelope::ResponseEnvelope::error(self.code.code(), self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_body_maps_to_input_invalid() {
        assert_eq!(ErrorCode::from_ingress_reason("oversized"), ErrorCode::InputInvalid);
    }

    #[test]
    fn injection_detail_renders_the_sub_reason() {
        let err = ApiError::ingress_denied("sql-injection", Some("sql"), 400);
        assert_eq!(err.code, ErrorCode::InputInvalid);
        assert_eq!(err.message, "Invalid input: sql");
    }

    #[test]
    fn denial_without_detail_falls_back_to_the_reason() {
        let err = ApiError::ingress_denied("rate-limit", None, 429);
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.message, "Request rejected: rate-limit");
    }
}
