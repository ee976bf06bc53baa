//! Postgres-backed user manager
//!
//! Same CRUD surface as the MySQL manager; the differences are connection
//! construction, schema/search-path handling, and `$n` binds. The schema
//! name is validated before any connection is attempted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memos_core::{MemosError, Result};
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PostgresUserManagerConfig;
use crate::manager::UserManager;
use crate::models::{Cube, User, UserRole};

fn db_err(e: sqlx::Error) -> MemosError {
    MemosError::UserManager(e.to_string())
}

/// Validate a Postgres schema name: non-empty, starts with a letter or
/// underscore, contains only letters, digits, and underscores.
pub fn validate_schema(schema: &str) -> Result<&str> {
    let Some(first) = schema.chars().next() else {
        return Err(MemosError::Config(
            "postgres schema name cannot be empty".to_string(),
        ));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(MemosError::Config(
            "postgres schema name must start with a letter or underscore".to_string(),
        ));
    }
    if !schema
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MemosError::Config(
            "postgres schema name may only contain letters, numbers, and underscores".to_string(),
        ));
    }
    Ok(schema)
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role_str: String = row.try_get("role").map_err(db_err)?;
    let role = UserRole::from_str(&role_str)
        .ok_or_else(|| MemosError::Parse(format!("unknown role: {}", role_str)))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
    Ok(User {
        user_id: row.try_get("user_id").map_err(db_err)?,
        user_name: row.try_get("user_name").map_err(db_err)?,
        role,
        created_at,
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

fn cube_from_row(row: &PgRow) -> Result<Cube> {
    Ok(Cube {
        cube_id: row.try_get("cube_id").map_err(db_err)?,
        cube_name: row.try_get("cube_name").map_err(db_err)?,
        owner_id: row.try_get("owner_id").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

/// Postgres user manager
pub struct PostgresUserManager {
    pool: PgPool,
    schema: String,
}

impl PostgresUserManager {
    pub async fn new(config: PostgresUserManagerConfig) -> Result<Self> {
        let schema = validate_schema(&config.schema)?.to_string();

        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .database(&config.database)
            .options([("search_path", schema.as_str())]);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if let Some(sslmode) = &config.sslmode {
            let mode = PgSslMode::from_str(sslmode).map_err(|e| {
                MemosError::Config(format!("invalid postgres sslmode '{}': {}", sslmode, e))
            })?;
            options = options.ssl_mode(mode);
        }

        // New pool connections start in the configured schema.
        let connect_schema = schema.clone();
        let pool = PgPoolOptions::new()
            .after_connect(move |conn, _meta| {
                let schema = connect_schema.clone();
                Box::pin(async move {
                    sqlx::query(&format!("SET search_path TO \"{}\"", schema))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| {
                MemosError::UserManager(format!("failed to connect to Postgres: {}", e))
            })?;

        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema))
            .execute(&pool)
            .await
            .map_err(db_err)?;

        let manager = Self { pool, schema };
        manager.create_tables().await?;
        manager.init_root_user(&config.user_id).await?;

        info!(
            "PostgresUserManager initialized with database at {}:{}/{} (schema '{}')",
            config.host, config.port, config.database, manager.schema
        );
        Ok(manager)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn create_tables(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )",
            "CREATE TABLE IF NOT EXISTS cubes (
                cube_id TEXT PRIMARY KEY,
                cube_name TEXT NOT NULL,
                owner_id TEXT NOT NULL REFERENCES users(user_id),
                created_at TIMESTAMPTZ NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )",
            "CREATE TABLE IF NOT EXISTS user_cube_association (
                user_id TEXT NOT NULL REFERENCES users(user_id),
                cube_id TEXT NOT NULL REFERENCES cubes(cube_id),
                PRIMARY KEY (user_id, cube_id)
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
impl UserManager for PostgresUserManager {
    fn backend(&self) -> &str {
        "postgres"
    }

    async fn create_user(
        &self,
        user_name: &str,
        role: UserRole,
        user_id: Option<String>,
    ) -> Result<String> {
        let existing = sqlx::query("SELECT user_id FROM users WHERE user_name = $1")
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
             VALUES ($1, $2, $3, $4, TRUE)",
        )
        .bind(&id)
        .bind(user_name)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT user_id, user_name, role, created_at, is_active
             FROM users WHERE user_id = $1",
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
             FROM users WHERE user_name = $1",
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
        sqlx::query("UPDATE users SET is_active = FALSE WHERE user_id = $1")
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
             VALUES ($1, $2, $3, $4, TRUE)",
        )
        .bind(&id)
        .bind(cube_name)
        .bind(owner_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "INSERT INTO user_cube_association (user_id, cube_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
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
             FROM cubes WHERE cube_id = $1",
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
             WHERE c.is_active = TRUE AND (c.owner_id = $1 OR a.user_id = $1)
             ORDER BY c.created_at",
        )
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
             JOIN users u ON u.user_id = $1
             LEFT JOIN user_cube_association a
                 ON a.cube_id = c.cube_id AND a.user_id = $1
             WHERE c.cube_id = $2 AND c.is_active = TRUE AND u.is_active = TRUE
                 AND (c.owner_id = $1 OR a.user_id IS NOT NULL)",
        )
        .bind(user_id)
        .bind(cube_id)
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

        sqlx::query(
            "INSERT INTO user_cube_association (user_id, cube_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(cube_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn remove_user_from_cube(&self, user_id: &str, cube_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_cube_association WHERE user_id = $1 AND cube_id = $2")
            .bind(user_id)
            .bind(cube_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_cube(&self, cube_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE cubes SET is_active = FALSE WHERE cube_id = $1")
            .bind(cube_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("PostgresUserManager database connections closed");
        Ok(())
    }
}
