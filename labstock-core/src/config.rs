use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Centralized configuration for the labstock service.
///
/// Loaded from a TOML file; `DATABASE_URL` and `LABSTOCK_ADDR` environment
/// variables override the corresponding file entries so deployments can keep
/// credentials out of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "127.0.0.1:3050"
    pub addr: String,
    /// Allow permissive CORS (development only)
    #[serde(default)]
    pub cors_permissive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for uploaded files. Created at startup if missing.
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in hours.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,
    /// Window after creation during which entities stay deletable.
    #[serde(default = "default_deletable_hours")]
    pub deletable_hours: i64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_session_ttl() -> i64 {
    24 * 14
}

fn default_deletable_hours() -> i64 {
    72
}

impl AppConfig {
    /// Load config from the given TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;

        let mut config: Self =
            toml::from_str(&content).context("Failed to parse config file (invalid TOML)")?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Build a config entirely from environment variables and defaults.
    ///
    /// Used when no config file is given; `DATABASE_URL` is required.
    pub fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set when no config file is given")?;

        let mut config = Self {
            server: ServerConfig {
                addr: "127.0.0.1:3050".to_string(),
                cors_permissive: false,
            },
            database: DatabaseConfig {
                url,
                max_connections: default_max_connections(),
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
            },
            auth: AuthConfig {
                session_ttl_hours: default_session_ttl(),
                deletable_hours: default_deletable_hours(),
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(addr) = env::var("LABSTOCK_ADDR") {
            self.server.addr = addr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_config() {
        let toml = r#"
            [server]
            addr = "0.0.0.0:8080"
            cors_permissive = true

            [database]
            url = "postgres://localhost/labstock"
            max_connections = 10

            [storage]
            upload_dir = "/var/lib/labstock/uploads"

            [auth]
            session_ttl_hours = 48
            deletable_hours = 24
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert!(config.server.cors_permissive);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.auth.deletable_hours, 24);
    }

    #[test]
    fn defaults_apply_for_optional_fields() {
        let toml = r#"
            [server]
            addr = "127.0.0.1:3050"

            [database]
            url = "postgres://localhost/labstock"

            [storage]
            upload_dir = "uploads"

            [auth]
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.auth.session_ttl_hours, 24 * 14);
        assert_eq!(config.auth.deletable_hours, 72);
        assert!(!config.server.cors_permissive);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [server]
            addr = "127.0.0.1:4000"

            [database]
            url = "postgres://localhost/test"

            [storage]
            upload_dir = "uploads"

            [auth]
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        // DATABASE_URL from the test environment may override the file value,
        // so only assert on fields without env overrides.
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
    }
}
