//! JWT issuance and validation. Claims carry just the shape the
//! authorization engine consults: username, teams, and role assignments.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("JWT secret must be at least 32 bytes")]
    SecretTooShort,
    #[error("failed to encode token: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("invalid or expired token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

pub type JwtResult<T> = Result<T, JwtError>;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub issuer: String,
    pub audience: String,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_seconds: 3600,
            refresh_ttl_seconds: 86_400 * 7,
            issuer: "helixtrack-core".to_string(),
            audience: "helixtrack-clients".to_string(),
        }
    }
}

/// Access-token claims. `roles` and `teams` are a point-in-time snapshot;
/// the authorization engine still consults the database on every request
/// rather than trusting the token's claims as the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub teams: Vec<String>,
    pub roles: Vec<String>,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    token_type: &'static str,
    exp: usize,
    iat: usize,
    jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

fn now_secs() -> usize {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> JwtResult<Self> {
        if config.secret.len() < 32 {
            return Err(JwtError::SecretTooShort);
        }
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.set_audience(&[config.audience.clone()]);

        Ok(Self { config, encoding_key, decoding_key, validation })
    }

    /// Issues an access token for an already-authenticated principal.
    pub fn issue_access_token(&self, username: &str, teams: Vec<String>, roles: Vec<String>) -> JwtResult<String> {
        let iat = now_secs();
        let claims = Claims {
            sub: username.to_string(),
            username: username.to_string(),
            teams,
            roles,
            exp: iat + self.config.access_ttl_seconds as usize,
            iat,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(JwtError::Encode)
    }

    pub fn issue_refresh_token(&self, username: &str) -> JwtResult<String> {
        let iat = now_secs();
        let claims = RefreshClaims {
            sub: username.to_string(),
            token_type: "refresh",
            exp: iat + self.config.refresh_ttl_seconds as usize,
            iat,
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(JwtError::Encode)
    }

    pub fn issue_token_pair(&self, username: &str, teams: Vec<String>, roles: Vec<String>) -> JwtResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(username, teams, roles)?,
            refresh_token: self.issue_refresh_token(username)?,
            token_type: "Bearer",
            expires_in: self.config.access_ttl_seconds,
        })
    }

    pub fn validate_access_token(&self, token: &str) -> JwtResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(JwtError::Invalid)?;
        Ok(data.claims)
    }

    /// Refresh tokens skip audience checks since they only ever round-trip
    /// through this service, never reaching a downstream resource server.
    pub fn validate_refresh_token(&self, token: &str) -> JwtResult<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_issuer(&[self.config.issuer.clone()]);

        let data = decode::<RefreshClaims>(token, &self.decoding_key, &validation).map_err(JwtError::Invalid)?;
        if data.claims.token_type != "refresh" {
            return Err(JwtError::Invalid(jsonwebtoken::errors::ErrorKind::InvalidToken.into()));
        }
        Ok(data.claims.sub)
    }

    pub fn is_expired(&self, claims: &Claims) -> bool {
        claims.exp < now_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new(JwtConfig::new("a-test-secret-that-is-at-least-32-bytes-long")).unwrap()
    }

    #[test]
    fn rejects_short_secret() {
        assert!(JwtManager::new(JwtConfig::new("short")).is_err());
    }

    #[test]
    fn access_token_round_trips() {
        let mgr = manager();
        let token = mgr.issue_access_token("alice", vec!["team-a".into()], vec!["Developer".into()]).unwrap();
        let claims = mgr.validate_access_token(&token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.teams, vec!["team-a".to_string()]);
        assert!(!mgr.is_expired(&claims));
    }

    #[test]
    fn refresh_token_round_trips_to_username() {
        let mgr = manager();
        let refresh = mgr.issue_refresh_token("bob").unwrap();
        assert_eq!(mgr.validate_refresh_token(&refresh).unwrap(), "bob");
    }

    #[test]
    fn access_token_rejected_by_refresh_validation() {
        let mgr = manager();
        let access = mgr.issue_access_token("alice", vec![], vec![]).unwrap();
        assert!(mgr.validate_refresh_token(&access).is_err());
    }

    #[test]
    fn tampered_token_fails_validation() {
        let mgr = manager();
        let mut token = mgr.issue_access_token("alice", vec![], vec![]).unwrap();
        token.push('x');
        assert!(mgr.validate_access_token(&token).is_err());
    }
}
