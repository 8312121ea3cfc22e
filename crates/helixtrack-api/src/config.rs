//! Process configuration, loaded through the `config`/`dotenvy` crates so a
//! deployment can supply a `config.toml` plus a `HELIXTRACK_*` environment
//! overlay.

use helixtrack_database::config::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub address: String,
    pub port: u16,
    pub https: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub http_to_https_redirect: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            https: false,
            cert_file: None,
            key_file: None,
            http_to_https_redirect: false,
        }
    }
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    #[serde(with = "secs")]
    pub access_ttl: Duration,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production-change-me-in-production".to_string(),
            issuer: "helixtrack-core".to_string(),
            access_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationSettings {
    pub enable_cache: bool,
    #[serde(with = "secs")]
    pub cache_ttl: Duration,
    pub cache_max_size: u64,
    pub enable_audit: bool,
    pub audit_retention_days: i64,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_ttl: Duration::from_secs(60),
            cache_max_size: 50_000,
            enable_audit: true,
            audit_retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSettings {
    #[serde(with = "secs")]
    pub ping_interval: Duration,
    pub client_outbound_queue_size: u64,
    pub max_clients: u64,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            client_outbound_queue_size: 16,
            max_clients: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self { allowed_origins: vec!["http://localhost:3000".to_string()] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    pub listener: ListenerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtSettings,
    pub authorization: AuthorizationSettings,
    pub websocket: WebSocketSettings,
    pub cors: CorsSettings,
}

impl ApiConfig {
    /// Layers, lowest to highest precedence: built-in defaults, an optional
    /// `config.toml` / `config.yaml` in the working directory (via `config`'s
    /// auto-detected format), then `HELIXTRACK__SECTION__FIELD`-style
    /// environment variables (double underscore separates nesting, matching
    /// `config::Environment`'s default). `.env` is loaded first so exported
    /// variables are visible to the environment layer.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&Self::default())?;
        let built = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("HELIXTRACK").separator("__"))
            .build()?;

        Ok(built.try_deserialize()?)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listener_binds_all_interfaces_on_8080() {
        let listener = ListenerConfig::default();
        assert_eq!(listener.bind_address(), "0.0.0.0:8080");
    }
}
