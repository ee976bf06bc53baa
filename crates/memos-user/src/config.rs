//! User manager configuration
//!
//! Flat per-backend field bags with serde defaults, selected through a
//! backend-tagged enum. Environment loaders back the factory's env-override
//! path.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_user_id() -> String {
    "root".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_username() -> String {
    "root".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_username() -> String {
    "postgres".to_string()
}

fn default_database() -> String {
    "memos_users".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_schema() -> String {
    "memos".to_string()
}

fn env_or(keys: &[&str], default: &str) -> String {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| default.to_string())
}

/// SQLite user manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteUserManagerConfig {
    /// Default user ID for root-user initialization.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Database file path; defaults to `memos_users.db` under the MemOS dir.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for SqliteUserManagerConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            db_path: None,
        }
    }
}

/// MySQL user manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySqlUserManagerConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    #[serde(default = "default_mysql_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_charset")]
    pub charset: String,
}

impl MySqlUserManagerConfig {
    /// Build from `MYSQL_*` environment variables.
    pub fn from_env(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            host: env_or(&["MYSQL_HOST"], "localhost"),
            port: env_or(&["MYSQL_PORT"], "3306").parse().unwrap_or(3306),
            username: env_or(&["MYSQL_USERNAME"], "root"),
            password: env_or(&["MYSQL_PASSWORD"], ""),
            database: env_or(&["MYSQL_DATABASE"], "memos_users"),
            charset: env_or(&["MYSQL_CHARSET"], "utf8mb4"),
        }
    }
}

/// Postgres user manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresUserManagerConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    #[serde(default = "default_postgres_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_schema", rename = "schema")]
    pub schema: String,
    #[serde(default)]
    pub sslmode: Option<String>,
}

impl PostgresUserManagerConfig {
    /// Build from `MOS_POSTGRES_*` environment variables, each falling back
    /// to the plain `POSTGRES_*` name.
    pub fn from_env(user_id: &str) -> Self {
        let sslmode = env_or(&["MOS_POSTGRES_SSLMODE", "POSTGRES_SSLMODE"], "");
        Self {
            user_id: user_id.to_string(),
            host: env_or(&["MOS_POSTGRES_HOST", "POSTGRES_HOST"], "localhost"),
            port: env_or(&["MOS_POSTGRES_PORT", "POSTGRES_PORT"], "5432")
                .parse()
                .unwrap_or(5432),
            username: env_or(&["MOS_POSTGRES_USERNAME", "POSTGRES_USERNAME"], "postgres"),
            password: env_or(&["MOS_POSTGRES_PASSWORD", "POSTGRES_PASSWORD"], ""),
            database: env_or(&["MOS_POSTGRES_DATABASE", "POSTGRES_DATABASE"], "memos_users"),
            schema: env_or(&["MOS_POSTGRES_SCHEMA", "POSTGRES_SCHEMA"], "memos"),
            sslmode: if sslmode.is_empty() { None } else { Some(sslmode) },
        }
    }
}

/// Backend-tagged user manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", content = "config", rename_all = "lowercase")]
pub enum UserManagerConfig {
    Sqlite(SqliteUserManagerConfig),
    Mysql(MySqlUserManagerConfig),
    Postgres(PostgresUserManagerConfig),
}

impl UserManagerConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            UserManagerConfig::Sqlite(_) => "sqlite",
            UserManagerConfig::Mysql(_) => "mysql",
            UserManagerConfig::Postgres(_) => "postgres",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            UserManagerConfig::Sqlite(c) => &c.user_id,
            UserManagerConfig::Mysql(c) => &c.user_id,
            UserManagerConfig::Postgres(c) => &c.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_backend_dispatch() {
        let config: UserManagerConfig = serde_json::from_value(serde_json::json!({
            "backend": "sqlite",
            "config": {}
        }))
        .unwrap();
        assert_eq!(config.backend(), "sqlite");
        assert_eq!(config.user_id(), "root");
    }

    #[test]
    fn test_mysql_defaults() {
        let config: UserManagerConfig = serde_json::from_value(serde_json::json!({
            "backend": "mysql",
            "config": {"password": "secret"}
        }))
        .unwrap();
        let UserManagerConfig::Mysql(inner) = config else {
            panic!("expected mysql backend");
        };
        assert_eq!(inner.host, "localhost");
        assert_eq!(inner.port, 3306);
        assert_eq!(inner.username, "root");
        assert_eq!(inner.database, "memos_users");
        assert_eq!(inner.charset, "utf8mb4");
    }

    #[test]
    fn test_postgres_schema_alias() {
        let config: UserManagerConfig = serde_json::from_value(serde_json::json!({
            "backend": "postgres",
            "config": {"schema": "custom_schema"}
        }))
        .unwrap();
        let UserManagerConfig::Postgres(inner) = config else {
            panic!("expected postgres backend");
        };
        assert_eq!(inner.schema, "custom_schema");
        assert_eq!(inner.port, 5432);
        assert!(inner.sslmode.is_none());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<UserManagerConfig, _> = serde_json::from_value(serde_json::json!({
            "backend": "mongodb",
            "config": {}
        }));
        assert!(result.is_err());
    }
}
