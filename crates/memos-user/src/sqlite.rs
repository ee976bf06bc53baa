//! SQLite-backed user manager

use async_trait::async_trait;
use chrono::Utc;
use memos_core::{MemosError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SqliteUserManagerConfig;
use crate::manager::UserManager;
use crate::models::{Cube, User, UserRole};
use crate::persistent::ConfigStore;

fn db_err(e: rusqlite::Error) -> MemosError {
    MemosError::UserManager(e.to_string())
}

fn default_db_path() -> PathBuf {
    let base = std::env::var("MEMOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".memos")
        });
    base.join("memos_users.db")
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(2)?;
    let role = UserRole::from_str(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown role: {}", role_str).into(),
        )
    })?;
    Ok(User {
        user_id: row.get(0)?,
        user_name: row.get(1)?,
        role,
        created_at: row.get(3)?,
        is_active: row.get(4)?,
    })
}

fn map_cube(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cube> {
    Ok(Cube {
        cube_id: row.get(0)?,
        cube_name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: row.get(3)?,
        is_active: row.get(4)?,
    })
}

/// SQLite user manager
pub struct SqliteUserManager {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteUserManager {
    pub fn new(config: SqliteUserManagerConfig) -> Result<Self> {
        let db_path = config.db_path.unwrap_or_else(default_db_path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path).map_err(db_err)?;
        let manager = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        manager.create_tables()?;
        manager.init_root_user(&config.user_id)?;

        info!(
            "SqliteUserManager initialized with database at {}",
            manager.db_path.display()
        );
        Ok(manager)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MemosError::UserManager(e.to_string()))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS cubes (
                cube_id TEXT PRIMARY KEY,
                cube_name TEXT NOT NULL,
                owner_id TEXT NOT NULL REFERENCES users(user_id),
                created_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS user_cube_association (
                user_id TEXT NOT NULL REFERENCES users(user_id),
                cube_id TEXT NOT NULL REFERENCES cubes(cube_id),
                PRIMARY KEY (user_id, cube_id)
            );
            CREATE TABLE IF NOT EXISTS user_configs (
                user_id TEXT PRIMARY KEY,
                config TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(db_err)
    }

    fn init_root_user(&self, user_id: &str) -> Result<()> {
        if self.get_user_impl(user_id)?.is_none() {
            self.create_user_impl("root", UserRole::Root, Some(user_id.to_string()))?;
        }
        Ok(())
    }

    fn create_user_impl(
        &self,
        user_name: &str,
        role: UserRole,
        user_id: Option<String>,
    ) -> Result<String> {
        let conn = self.conn()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT user_id FROM users WHERE user_name = ?1",
                params![user_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(id) = existing {
            warn!("user '{}' already exists, returning existing id", user_name);
            return Ok(id);
        }

        let id = user_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        conn.execute(
            "INSERT INTO users (user_id, user_name, role, created_at, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![id, user_name, role.as_str(), Utc::now()],
        )
        .map_err(db_err)?;
        Ok(id)
    }

    fn get_user_impl(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, user_name, role, created_at, is_active
             FROM users WHERE user_id = ?1",
            params![user_id],
            map_user,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_user_by_name_impl(&self, user_name: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, user_name, role, created_at, is_active
             FROM users WHERE user_name = ?1",
            params![user_name],
            map_user,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_cube_impl(&self, cube_id: &str) -> Result<Option<Cube>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT cube_id, cube_name, owner_id, created_at, is_active
             FROM cubes WHERE cube_id = ?1",
            params![cube_id],
            map_cube,
        )
        .optional()
        .map_err(db_err)
    }

    fn require_active_user(&self, user_id: &str) -> Result<()> {
        match self.get_user_impl(user_id)? {
            Some(user) if user.is_active => Ok(()),
            _ => Err(MemosError::UserManager(format!(
                "user '{}' not found or inactive",
                user_id
            ))),
        }
    }
}

#[async_trait]
impl UserManager for SqliteUserManager {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn create_user(
        &self,
        user_name: &str,
        role: UserRole,
        user_id: Option<String>,
    ) -> Result<String> {
        self.create_user_impl(user_name, role, user_id)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.get_user_impl(user_id)
    }

    async fn get_user_by_name(&self, user_name: &str) -> Result<Option<User>> {
        self.get_user_by_name_impl(user_name)
    }

    async fn validate_user(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .get_user_impl(user_id)?
            .map(|u| u.is_active)
            .unwrap_or(false))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, user_name, role, created_at, is_active
                 FROM users WHERE is_active = 1 ORDER BY created_at",
            )
            .map_err(db_err)?;
        let users = stmt
            .query_map([], map_user)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(users)
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let Some(user) = self.get_user_impl(user_id)? else {
            return Ok(false);
        };
        if user.role == UserRole::Root {
            return Err(MemosError::UserManager(
                "cannot delete root user".to_string(),
            ));
        }
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET is_active = 0 WHERE user_id = ?1",
            params![user_id],
        )
        .map_err(db_err)?;
        Ok(true)
    }

    async fn create_cube(
        &self,
        cube_name: &str,
        owner_id: &str,
        cube_id: Option<String>,
    ) -> Result<String> {
        self.require_active_user(owner_id)?;

        let id = cube_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cubes (cube_id, cube_name, owner_id, created_at, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![id, cube_name, owner_id, Utc::now()],
        )
        .map_err(db_err)?;
        // The owner always has association access to their own cube.
        conn.execute(
            "INSERT OR IGNORE INTO user_cube_association (user_id, cube_id) VALUES (?1, ?2)",
            params![owner_id, id],
        )
        .map_err(db_err)?;
        Ok(id)
    }

    async fn get_cube(&self, cube_id: &str) -> Result<Option<Cube>> {
        self.get_cube_impl(cube_id)
    }

    async fn get_user_cubes(&self, user_id: &str) -> Result<Vec<Cube>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT c.cube_id, c.cube_name, c.owner_id, c.created_at, c.is_active
                 FROM cubes c
                 LEFT JOIN user_cube_association a ON a.cube_id = c.cube_id
                 WHERE c.is_active = 1 AND (c.owner_id = ?1 OR a.user_id = ?1)
                 ORDER BY c.created_at",
            )
            .map_err(db_err)?;
        let cubes = stmt
            .query_map(params![user_id], map_cube)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(cubes)
    }

    async fn validate_user_cube_access(&self, user_id: &str, cube_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*)
                 FROM cubes c
                 JOIN users u ON u.user_id = ?1
                 LEFT JOIN user_cube_association a
                     ON a.cube_id = c.cube_id AND a.user_id = ?1
                 WHERE c.cube_id = ?2 AND c.is_active = 1 AND u.is_active = 1
                     AND (c.owner_id = ?1 OR a.user_id IS NOT NULL)",
                params![user_id, cube_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn add_user_to_cube(&self, user_id: &str, cube_id: &str) -> Result<()> {
        self.require_active_user(user_id)?;
        match self.get_cube_impl(cube_id)? {
            Some(cube) if cube.is_active => {}
            _ => {
                return Err(MemosError::UserManager(format!(
                    "cube '{}' not found or inactive",
                    cube_id
                )));
            }
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO user_cube_association (user_id, cube_id) VALUES (?1, ?2)",
            params![user_id, cube_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn remove_user_from_cube(&self, user_id: &str, cube_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM user_cube_association WHERE user_id = ?1 AND cube_id = ?2",
            params![user_id, cube_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_cube(&self, cube_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE cubes SET is_active = 0 WHERE cube_id = ?1",
                params![cube_id],
            )
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    async fn close(&self) -> Result<()> {
        // The connection is released when the manager drops.
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for SqliteUserManager {
    async fn save_user_config(&self, user_id: &str, config: &Value) -> Result<()> {
        let serialized = serde_json::to_string(config)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_configs (user_id, config, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET config = ?2, updated_at = ?3",
            params![user_id, serialized, Utc::now()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_user_config(&self, user_id: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let serialized: Option<String> = conn
            .query_row(
                "SELECT config FROM user_configs WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match serialized {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn delete_user_config(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM user_configs WHERE user_id = ?1",
                params![user_id],
            )
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    async fn list_user_configs(&self) -> Result<HashMap<String, Value>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT user_id, config FROM user_configs")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut configs = HashMap::new();
        for (user_id, serialized) in rows {
            configs.insert(user_id, serde_json::from_str(&serialized)?);
        }
        Ok(configs)
    }
}
