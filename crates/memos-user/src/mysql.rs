//! MySQL-backed user manager

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use memos_core::{MemosError, Result};
use serde_json::Value;
use sqlx::Row;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MySqlUserManagerConfig;
use crate::manager::UserManager;
use crate::models::{Cube, User, UserRole};
use crate::persistent::ConfigStore;

fn db_err(e: sqlx::Error) -> MemosError {
    MemosError::UserManager(e.to_string())
}

fn user_from_row(row: &MySqlRow) -> Result<User> {
    let role_str: String = row.try_get("role").map_err(db_err)?;
    let role = UserRole::from_str(&role_str)
        .ok_or_else(|| MemosError::Parse(format!("unknown role: {}", role_str)))?;
    let created_at: NaiveDateTime = row.try_get("created_at").map_err(db_err)?;
    Ok(User {
        user_id: row.try_get("user_id").map_err(db_err)?,
        user_name: row.try_get("user_name").map_err(db_err)?,
        role,
        created_at: created_at.and_utc(),
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

fn cube_from_row(row: &MySqlRow) -> Result<Cube> {
    let created_at: NaiveDateTime = row.try_get("created_at").map_err(db_err)?;
    Ok(Cube {
        cube_id: row.try_get("cube_id").map_err(db_err)?,
        cube_name: row.try_get("cube_name").map_err(db_err)?,
        owner_id: row.try_get("owner_id").map_err(db_err)?,
        created_at: created_at.and_utc(),
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

/// MySQL user manager
pub struct MySqlUserManager {
    pool: MySqlPool,
}

impl MySqlUserManager {
    pub async fn new(config: MySqlUserManagerConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .charset(&config.charset);

        let pool = MySqlPoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                MemosError::UserManager(format!("failed to connect to MySQL: {}", e))
            })?;

        let manager = Self { pool };
        manager.create_tables().await?;
        manager.init_root_user(&config.user_id).await?;

        info!(
            "MySqlUserManager initialized with database at {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(manager)
    }

    async fn create_tables(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS users (
                user_id VARCHAR(255) PRIMARY KEY,
                user_name VARCHAR(255) NOT NULL UNIQUE,
                role VARCHAR(32) NOT NULL,
                created_at DATETIME NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )",
            "CREATE TABLE IF NOT EXISTS cubes (
                cube_id VARCHAR(255) PRIMARY KEY,
                cube_name VARCHAR(255) NOT NULL,
                owner_id VARCHAR(255) NOT NULL,
                created_at DATETIME NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )",
            "CREATE TABLE IF NOT EXISTS user_cube_association (
                user_id VARCHAR(255) NOT NULL,
                cube_id VARCHAR(255) NOT NULL,
                PRIMARY KEY (user_id, cube_id)
            )",
            "CREATE TABLE IF NOT EXISTS user_configs (
                user_id VARCHAR(255) PRIMARY KEY,
                config TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            )",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    async fn init_root_user(&self, user_id: &str) -> Result<()> {
        if self.get_user(user_id).await?.is_none() {
            self.create_user("root", UserRole::Root, Some(user_id.to_string()))
                .await?;
        }
        Ok(())
    }

    async fn require_active_user(&self, user_id: &str) -> Result<()> {
        match self.get_user(user_id).await? {
            Some(user) if user.is_active => Ok(()),
            _ => Err(MemosError::UserManager(format!(
                "user '{}' not found or inactive",
                user_id
            ))),
        }
    }
}

#[async_trait]
impl UserManager for MySqlUserManager {
    fn backend(&self) -> &str {
        "mysql"
    }

    async fn create_user(
        &self,
        user_name: &str,
        role: UserRole,
        user_id: Option<String>,
    ) -> Result<String> {
        let existing = sqlx::query("SELECT user_id FROM users WHERE user_name = ?")
            .bind(user_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if let Some(row) = existing {
            let id: String = row.try_get("user_id").map_err(db_err)?;
            warn!("user '{}' already exists, returning existing id", user_name);
            return Ok(id);
        }

        let id = user_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        sqlx::query(
            "INSERT INTO users (user_id, user_name, role, created_at, is_active)
             VALUES (?, ?, ?, ?, TRUE)",
        )
        .bind(&id)
        .bind(user_name)
        .bind(role.as_str())
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT user_id, user_name, role, created_at, is_active
             FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_name(&self, user_name: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT user_id, user_name, role, created_at, is_active
             FROM users WHERE user_name = ?",
        )
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn validate_user(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .get_user(user_id)
            .await?
            .map(|u| u.is_active)
            .unwrap_or(false))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT user_id, user_name, role, created_at, is_active
             FROM users WHERE is_active = TRUE ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(user_from_row).collect()
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(false);
        };
        if user.role == UserRole::Root {
            return Err(MemosError::UserManager(
                "cannot delete root user".to_string(),
            ));
        }
        sqlx::query("UPDATE users SET is_active = FALSE WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(true)
    }

    async fn create_cube(
        &self,
        cube_name: &str,
        owner_id: &str,
        cube_id: Option<String>,
    ) -> Result<String> {
        self.require_active_user(owner_id).await?;

        let id = cube_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        sqlx::query(
            "INSERT INTO cubes (cube_id, cube_name, owner_id, created_at, is_active)
             VALUES (?, ?, ?, ?, TRUE)",
        )
        .bind(&id)
        .bind(cube_name)
        .bind(owner_id)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query("INSERT IGNORE INTO user_cube_association (user_id, cube_id) VALUES (?, ?)")
            .bind(owner_id)
            .bind(&id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    async fn get_cube(&self, cube_id: &str) -> Result<Option<Cube>> {
        let row = sqlx::query(
            "SELECT cube_id, cube_name, owner_id, created_at, is_active
             FROM cubes WHERE cube_id = ?",
        )
        .bind(cube_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(cube_from_row).transpose()
    }

    async fn get_user_cubes(&self, user_id: &str) -> Result<Vec<Cube>> {
        let rows = sqlx::query(
            "SELECT DISTINCT c.cube_id, c.cube_name, c.owner_id, c.created_at, c.is_active
             FROM cubes c
             LEFT JOIN user_cube_association a ON a.cube_id = c.cube_id
             WHERE c.is_active = TRUE AND (c.owner_id = ? OR a.user_id = ?)
             ORDER BY c.created_at",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(cube_from_row).collect()
    }

    async fn validate_user_cube_access(&self, user_id: &str, cube_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n
             FROM cubes c
             JOIN users u ON u.user_id = ?
             LEFT JOIN user_cube_association a
                 ON a.cube_id = c.cube_id AND a.user_id = ?
             WHERE c.cube_id = ? AND c.is_active = TRUE AND u.is_active = TRUE
                 AND (c.owner_id = ? OR a.user_id IS NOT NULL)",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(cube_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        let count: i64 = row.try_get("n").map_err(db_err)?;
        Ok(count > 0)
    }

    async fn add_user_to_cube(&self, user_id: &str, cube_id: &str) -> Result<()> {
        self.require_active_user(user_id).await?;
        match self.get_cube(cube_id).await? {
            Some(cube) if cube.is_active => {}
            _ => {
                return Err(MemosError::UserManager(format!(
                    "cube '{}' not found or inactive",
                    cube_id
                )));
            }
        }

        sqlx::query("INSERT IGNORE INTO user_cube_association (user_id, cube_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(cube_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn remove_user_from_cube(&self, user_id: &str, cube_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_cube_association WHERE user_id = ? AND cube_id = ?")
            .bind(user_id)
            .bind(cube_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_cube(&self, cube_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE cubes SET is_active = FALSE WHERE cube_id = ?")
            .bind(cube_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("MySqlUserManager database connections closed");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MySqlUserManager {
    async fn save_user_config(&self, user_id: &str, config: &Value) -> Result<()> {
        let serialized = serde_json::to_string(config)?;
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO user_configs (user_id, config, updated_at) VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE config = ?, updated_at = ?",
        )
        .bind(user_id)
        .bind(&serialized)
        .bind(now)
        .bind(&serialized)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_user_config(&self, user_id: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT config FROM user_configs WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let serialized: String = row.try_get("config").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&serialized)?))
            }
            None => Ok(None),
        }
    }

    async fn delete_user_config(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_configs WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_user_configs(&self) -> Result<HashMap<String, Value>> {
        let rows = sqlx::query("SELECT user_id, config FROM user_configs")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut configs = HashMap::new();
        for row in rows {
            let user_id: String = row.try_get("user_id").map_err(db_err)?;
            let serialized: String = row.try_get("config").map_err(db_err)?;
            configs.insert(user_id, serde_json::from_str(&serialized)?);
        }
        Ok(configs)
    }
}
