//! Configuration loading, layered with [`figment`] the way the teacher's
//! `DataServiceConfig`/`AuthServiceConfig` do: a checked-in default file,
//! an optional local override, then environment variables on top.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

/// Top-level configuration for an sblite instance.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service network configuration.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database / migration configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Password hashing configuration.
    #[serde(default)]
    pub password: PasswordConfig,
    /// Auth-domain configuration (JWT, anonymous signup).
    #[serde(default)]
    pub auth: AuthConfig,
    /// Object-storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// SMTP configuration (optional — email is a best-effort sidecar).
    pub smtp: Option<SmtpConfig>,
}

/// Service endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on. Also the port-scoping suffix for the session cookie.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database and migration-journal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (`sqlite::memory:` for ephemeral instances).
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Directory that the migration journal's `.sql` files are written to.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            migrations_dir: default_migrations_dir(),
        }
    }
}

/// Dashboard session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
        }
    }
}

/// Dashboard-operator password hashing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    /// bcrypt cost factor.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

/// Auth-domain configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign issued JWTs, unless overridden per-instance
    /// in `_dashboard.jwt_secret`.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Whether anonymous sign-up is allowed by default.
    #[serde(default)]
    pub allow_anonymous: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            allow_anonymous: false,
        }
    }
}

/// Object-storage configuration (directory-per-bucket; blob I/O itself is
/// out of scope for the core, see spec §1).
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for stored blobs.
    #[serde(default = "default_storage_path")]
    pub base_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
        }
    }
}

/// SMTP configuration for the invite/notification mailer.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// SMTP username.
    pub username: Option<String>,
    /// SMTP password.
    pub password: Option<String>,
    /// Default from-address for outgoing mail.
    pub from_address: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
const fn default_port() -> u16 {
    8080
}
fn default_db_path() -> String {
    "sblite.db".to_string()
}
fn default_migrations_dir() -> String {
    "migrations".to_string()
}
const fn default_session_ttl() -> i64 {
    86_400 // 24h, per spec §4.5
}
const fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}
fn default_jwt_secret() -> String {
    "sblite-development-secret-change-me".to_string()
}
fn default_storage_path() -> String {
    "storage".to_string()
}
const fn default_smtp_port() -> u16 {
    587
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files or environment variables
    /// cannot be parsed into [`Config`].
    pub fn load() -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"))
            .merge(Env::prefixed("SBLITE_").split("__"));

        Ok(figment.extract()?)
    }

    /// The name of the dashboard session cookie for this instance, scoped
    /// to the listening port so that simultaneous instances remain
    /// independent (spec §4.5, §6).
    #[must_use]
    pub fn session_cookie_name(&self) -> String {
        format!("_sblite_session_{}", self.service.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config {
            service: ServiceConfig::default(),
            database: DatabaseConfig::default(),
            session: SessionConfig::default(),
            password: PasswordConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            smtp: None,
        };
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.session.ttl_seconds, 86_400);
        assert_eq!(config.session_cookie_name(), "_sblite_session_8080");
    }
}
