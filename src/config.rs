//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Scheme accepted for the in-process cache backend
pub const LOCMEM_SCHEME: &str = "locmem://";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Development mode: real admin on `/admin/`, media served, no HSTS
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    #[serde(default)]
    pub tls_cert: String,
    #[serde(default)]
    pub tls_key: String,
    /// Public URL used to rebuild full visit URLs (e.g., "https://example.com")
    #[serde(default)]
    pub public_url: String,
    /// Accepted `Host` header values. A leading dot matches any subdomain, `*` matches all.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            https_port: default_https_port(),
            tls_cert: String::new(),
            tls_key: String::new(),
            public_url: String::new(),
            allowed_hosts: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_https_port() -> u16 {
    8443
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "db.sqlite3".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_url")]
    pub url: String,
    /// Expiry of cached visit statistics in seconds
    #[serde(default = "default_cache_timeout")]
    pub timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_cache_url(),
            timeout_secs: default_cache_timeout(),
        }
    }
}

fn default_cache_url() -> String {
    "locmem://unique-snowflake".to_string()
}

fn default_cache_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_static_url")]
    pub static_url: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_media_url")]
    pub media_url: String,
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    /// Destination of `vendor-pull` downloads
    #[serde(default)]
    pub vendor_dir: Option<PathBuf>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            static_url: default_static_url(),
            static_dir: default_static_dir(),
            media_url: default_media_url(),
            media_dir: default_media_dir(),
            vendor_dir: None,
        }
    }
}

fn default_static_url() -> String {
    "/static/".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_media_url() -> String {
    "/media/".to_string()
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// URL segment of the real admin in production; `/admin/` is the decoy there
    #[serde(default = "default_admin_path")]
    pub path: String,
    #[serde(default = "default_admin_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            path: default_admin_path(),
            username: default_admin_username(),
            password: String::new(),
        }
    }
}

fn default_admin_path() -> String {
    "secret".to_string()
}

fn default_admin_username() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("VISITS")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_hosts")
                    .try_parsing(true),
            );

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.http_port == 0 {
            anyhow::bail!("Invalid http_port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        // Validate database config
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Only the in-process cache is supported
        if !self.cache.url.starts_with(LOCMEM_SCHEME) {
            anyhow::bail!(
                "Unsupported cache URL '{}'. Must start with '{}'",
                self.cache.url,
                LOCMEM_SCHEME
            );
        }

        // Validate TLS (both or neither must be set)
        let has_cert = !self.server.tls_cert.is_empty();
        let has_key = !self.server.tls_key.is_empty();
        if has_cert != has_key {
            anyhow::bail!("TLS configuration incomplete: both tls_cert and tls_key must be set, or neither");
        }

        let admin_path = self.admin.path.trim_matches('/');
        if admin_path.is_empty() || admin_path.contains('/') {
            anyhow::bail!("Invalid admin path '{}': must be a single URL segment", self.admin.path);
        }
        if !self.debug {
            if admin_path == "admin" {
                anyhow::bail!("Admin path 'admin' is reserved for the decoy in production");
            }
            if self.admin.password.is_empty() {
                anyhow::bail!("Admin password must be set when debug is off");
            }
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }

    pub fn tls_enabled(&self) -> bool {
        !self.server.tls_cert.is_empty() && !self.server.tls_key.is_empty()
    }

    /// URL prefix of the real admin, e.g. `/admin` in debug or `/secret` in production
    pub fn admin_prefix(&self) -> String {
        if self.debug {
            "/admin".to_string()
        } else {
            format!("/{}", self.admin.path.trim_matches('/'))
        }
    }

    /// Base URL prepended to stored paths to rebuild the full visited URL
    pub fn site_url(&self) -> String {
        if self.server.public_url.is_empty() {
            format!("http://{}:{}", self.server.host, self.server.http_port)
        } else {
            self.server.public_url.trim_end_matches('/').to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> Config {
        let mut config = Config::default();
        config.admin.password = "hunter2hunter2".to_string();
        config
    }

    #[test]
    fn defaults_validate_in_debug() {
        let config = Config {
            debug: true,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.admin_prefix(), "/admin");
    }

    #[test]
    fn production_requires_admin_password() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(production().validate().is_ok());
        assert_eq!(production().admin_prefix(), "/secret");
    }

    #[test]
    fn production_rejects_decoy_admin_path() {
        let mut config = production();
        config.admin.path = "/admin/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_cache_backend() {
        let mut config = production();
        config.cache.url = "redis://127.0.0.1:6379/1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_half_configured_tls() {
        let mut config = production();
        config.server.tls_cert = "cert.pem".to_string();
        assert!(config.validate().is_err());
        config.server.tls_key = "key.pem".to_string();
        assert!(config.validate().is_ok());
        assert!(config.tls_enabled());
    }

    #[test]
    fn site_url_prefers_public_url() {
        let mut config = production();
        assert_eq!(config.site_url(), "http://127.0.0.1:8000");
        config.server.public_url = "https://example.com/".to_string();
        assert_eq!(config.site_url(), "https://example.com");
    }
}
