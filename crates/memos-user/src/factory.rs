//! User manager factories
//!
//! Backend selection precedence: the explicit config argument is overridden
//! by a recognized backend named in the `MOS_USER_MANAGER*` environment
//! variables, whose connection parameters then come from the
//! backend-specific environment. The configured default `user_id` always
//! survives the override.

use memos_core::{MemosError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::{
    MySqlUserManagerConfig, PostgresUserManagerConfig, SqliteUserManagerConfig, UserManagerConfig,
};
use crate::manager::UserManager;
use crate::mysql::MySqlUserManager;
use crate::persistent::PersistentUserManager;
use crate::postgres::PostgresUserManager;
use crate::sqlite::SqliteUserManager;

/// First non-empty value among the given variables, lowercased.
fn env_backend(vars: &[&str]) -> Option<String> {
    vars.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
    })
}

/// Apply the environment backend override, rebuilding the config from the
/// backend-specific connection variables. Unrecognized names are ignored.
fn apply_env_override(
    config: UserManagerConfig,
    vars: &[&str],
    allowed: &[&str],
) -> UserManagerConfig {
    let Some(backend) = env_backend(vars) else {
        return config;
    };
    if !allowed.contains(&backend.as_str()) {
        return config;
    }

    let user_id = config.user_id().to_string();
    debug!("user manager backend overridden to '{}' via env", backend);
    match backend.as_str() {
        "sqlite" => UserManagerConfig::Sqlite(SqliteUserManagerConfig {
            user_id,
            db_path: None,
        }),
        "mysql" => UserManagerConfig::Mysql(MySqlUserManagerConfig::from_env(&user_id)),
        "postgres" => UserManagerConfig::Postgres(PostgresUserManagerConfig::from_env(&user_id)),
        _ => config,
    }
}

/// Factory for user manager instances
pub struct UserManagerFactory;

impl UserManagerFactory {
    pub async fn from_config(config: UserManagerConfig) -> Result<Arc<dyn UserManager>> {
        let config = apply_env_override(
            config,
            &["MOS_USER_MANAGER", "MOS_USER_MANAGER_BACKEND"],
            &["sqlite", "mysql", "postgres"],
        );

        match config {
            UserManagerConfig::Sqlite(config) => Ok(Arc::new(SqliteUserManager::new(config)?)),
            UserManagerConfig::Mysql(config) => {
                Ok(Arc::new(MySqlUserManager::new(config).await?))
            }
            UserManagerConfig::Postgres(config) => {
                Ok(Arc::new(PostgresUserManager::new(config).await?))
            }
        }
    }

    pub async fn create_sqlite(
        db_path: Option<PathBuf>,
        user_id: &str,
    ) -> Result<Arc<dyn UserManager>> {
        Self::from_config(UserManagerConfig::Sqlite(SqliteUserManagerConfig {
            user_id: user_id.to_string(),
            db_path,
        }))
        .await
    }

    pub async fn create_mysql(config: MySqlUserManagerConfig) -> Result<Arc<dyn UserManager>> {
        Self::from_config(UserManagerConfig::Mysql(config)).await
    }

    pub async fn create_postgres(
        config: PostgresUserManagerConfig,
    ) -> Result<Arc<dyn UserManager>> {
        Self::from_config(UserManagerConfig::Postgres(config)).await
    }
}

/// Factory for persistent (config-storing) user manager instances
pub struct PersistentUserManagerFactory;

impl PersistentUserManagerFactory {
    pub async fn from_config(config: UserManagerConfig) -> Result<Arc<dyn PersistentUserManager>> {
        let config = apply_env_override(
            config,
            &[
                "MOS_PERSISTENT_USER_MANAGER",
                "MOS_USER_MANAGER",
                "MOS_USER_MANAGER_BACKEND",
            ],
            &["sqlite", "mysql"],
        );

        match config {
            UserManagerConfig::Sqlite(config) => Ok(Arc::new(SqliteUserManager::new(config)?)),
            UserManagerConfig::Mysql(config) => {
                Ok(Arc::new(MySqlUserManager::new(config).await?))
            }
            UserManagerConfig::Postgres(_) => Err(MemosError::Config(
                "invalid persistent user manager backend: postgres".to_string(),
            )),
        }
    }

    pub async fn create_sqlite(
        db_path: Option<PathBuf>,
        user_id: &str,
    ) -> Result<Arc<dyn PersistentUserManager>> {
        Self::from_config(UserManagerConfig::Sqlite(SqliteUserManagerConfig {
            user_id: user_id.to_string(),
            db_path,
        }))
        .await
    }

    pub async fn create_mysql(
        config: MySqlUserManagerConfig,
    ) -> Result<Arc<dyn PersistentUserManager>> {
        Self::from_config(UserManagerConfig::Mysql(config)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment mutation is process-wide; serialize these tests.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "MOS_USER_MANAGER",
            "MOS_USER_MANAGER_BACKEND",
            "MOS_PERSISTENT_USER_MANAGER",
            "MYSQL_HOST",
            "MYSQL_PORT",
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_no_env_keeps_explicit_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = apply_env_override(
            UserManagerConfig::Sqlite(SqliteUserManagerConfig::default()),
            &["MOS_USER_MANAGER", "MOS_USER_MANAGER_BACKEND"],
            &["sqlite", "mysql", "postgres"],
        );
        assert_eq!(config.backend(), "sqlite");
    }

    #[test]
    fn test_env_backend_overrides_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("MOS_USER_MANAGER", "MySQL");
            std::env::set_var("MYSQL_HOST", "db.internal");
            std::env::set_var("MYSQL_PORT", "3307");
        }

        let config = apply_env_override(
            UserManagerConfig::Sqlite(SqliteUserManagerConfig {
                user_id: "admin".to_string(),
                db_path: None,
            }),
            &["MOS_USER_MANAGER", "MOS_USER_MANAGER_BACKEND"],
            &["sqlite", "mysql", "postgres"],
        );

        let UserManagerConfig::Mysql(inner) = config else {
            panic!("expected mysql backend");
        };
        assert_eq!(inner.user_id, "admin");
        assert_eq!(inner.host, "db.internal");
        assert_eq!(inner.port, 3307);

        clear_env();
    }

    #[test]
    fn test_unrecognized_env_backend_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("MOS_USER_MANAGER", "mongodb") };

        let config = apply_env_override(
            UserManagerConfig::Sqlite(SqliteUserManagerConfig::default()),
            &["MOS_USER_MANAGER", "MOS_USER_MANAGER_BACKEND"],
            &["sqlite", "mysql", "postgres"],
        );
        assert_eq!(config.backend(), "sqlite");

        clear_env();
    }

    #[test]
    fn test_persistent_override_excludes_postgres() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("MOS_PERSISTENT_USER_MANAGER", "postgres") };

        let config = apply_env_override(
            UserManagerConfig::Sqlite(SqliteUserManagerConfig::default()),
            &[
                "MOS_PERSISTENT_USER_MANAGER",
                "MOS_USER_MANAGER",
                "MOS_USER_MANAGER_BACKEND",
            ],
            &["sqlite", "mysql"],
        );
        assert_eq!(config.backend(), "sqlite");

        clear_env();
    }
}
