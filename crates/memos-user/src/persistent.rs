//! Per-user configuration persistence
//!
//! The persistent manager variants additionally store a serialized service
//! configuration per user in a `user_configs` table.

use async_trait::async_trait;
use memos_core::Result;
use serde_json::Value;
use std::collections::HashMap;

use crate::manager::UserManager;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Upsert the configuration for a user.
    async fn save_user_config(&self, user_id: &str, config: &Value) -> Result<()>;

    async fn get_user_config(&self, user_id: &str) -> Result<Option<Value>>;

    /// Returns false when no configuration was stored.
    async fn delete_user_config(&self, user_id: &str) -> Result<bool>;

    async fn list_user_configs(&self) -> Result<HashMap<String, Value>>;
}

/// A user manager that also persists per-user configuration.
pub trait PersistentUserManager: UserManager + ConfigStore {}

impl<T: UserManager + ConfigStore> PersistentUserManager for T {}
