//! User manager trait
//!
//! The common CRUD surface every storage backend implements. All lookups
//! apart from `get_user`/`get_cube` respect the soft-delete flag.

use async_trait::async_trait;
use memos_core::Result;

use crate::models::{Cube, User, UserRole};

#[async_trait]
pub trait UserManager: Send + Sync {
    /// Backend tag ("sqlite", "mysql", "postgres").
    fn backend(&self) -> &str;

    /// Create a user, returning its id. When the name is already taken the
    /// existing user's id is returned instead.
    async fn create_user(
        &self,
        user_name: &str,
        role: UserRole,
        user_id: Option<String>,
    ) -> Result<String>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn get_user_by_name(&self, user_name: &str) -> Result<Option<User>>;

    /// Whether the user exists and is active.
    async fn validate_user(&self, user_id: &str) -> Result<bool>;

    /// All active users.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Soft-delete a user. The root user cannot be deleted. Returns false
    /// when no such user exists.
    async fn delete_user(&self, user_id: &str) -> Result<bool>;

    /// Create a cube owned by an existing active user, returning its id. The
    /// owner is also granted association access.
    async fn create_cube(
        &self,
        cube_name: &str,
        owner_id: &str,
        cube_id: Option<String>,
    ) -> Result<String>;

    async fn get_cube(&self, cube_id: &str) -> Result<Option<Cube>>;

    /// Active cubes the user owns or has been added to.
    async fn get_user_cubes(&self, user_id: &str) -> Result<Vec<Cube>>;

    /// Whether an active user may access an active cube (owner or shared).
    async fn validate_user_cube_access(&self, user_id: &str, cube_id: &str) -> Result<bool>;

    async fn add_user_to_cube(&self, user_id: &str, cube_id: &str) -> Result<()>;

    async fn remove_user_from_cube(&self, user_id: &str, cube_id: &str) -> Result<()>;

    /// Soft-delete a cube. Returns false when no such cube exists.
    async fn delete_cube(&self, cube_id: &str) -> Result<bool>;

    /// Release the underlying connection/pool.
    async fn close(&self) -> Result<()>;
}
