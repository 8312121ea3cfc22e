//! Password hashing with Argon2. Just hashing and verification — account
//! lockout after repeated failures is handled separately by
//! `helixtrack-security`'s brute-force guard at the ingress layer.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("invalid Argon2 parameters: {0}")]
    InvalidParams(argon2::password_hash::Error),
    #[error("failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("invalid password hash format: {0}")]
    InvalidHash(argon2::password_hash::Error),
}

pub type PasswordResult<T> = Result<T, PasswordError>;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { memory_cost_kib: 65_536, time_cost: 3, parallelism: 4 }
    }
}

pub struct PasswordHashingService {
    argon2: Argon2<'static>,
}

impl PasswordHashingService {
    pub fn new(policy: PasswordPolicy) -> PasswordResult<Self> {
        let params = Params::new(policy.memory_cost_kib, policy.time_cost, policy.parallelism, None)
            .map_err(PasswordError::InvalidParams)?;
        Ok(Self { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params) })
    }

    pub fn hash(&self, password: &str) -> PasswordResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self.argon2.hash_password(password.as_bytes(), &salt).map_err(PasswordError::Hash)?;
        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> PasswordResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(PasswordError::InvalidHash)?;
        Ok(self.argon2.verify_password(password.as_bytes(), &parsed).is_ok())
    }
}

impl Default for PasswordHashingService {
    fn default() -> Self {
        Self::new(PasswordPolicy::default()).expect("default Argon2 parameters are always valid")
    }
}

/// A password held in memory only as long as needed, zeroed on drop.
pub struct SecurePassword {
    inner: String,
}

impl SecurePassword {
    pub fn new(password: String) -> Self {
        Self { inner: password }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl Drop for SecurePassword {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let service = PasswordHashingService::default();
        let hash = service.hash("MySecureP@ssw0rd123!").unwrap();
        assert!(hash.starts_with("$argon2id"));
        assert!(service.verify("MySecureP@ssw0rd123!", &hash).unwrap());
        assert!(!service.verify("wrong", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_rejected() {
        let service = PasswordHashingService::default();
        assert!(service.verify("anything", "not-a-hash").is_err());
    }
}
