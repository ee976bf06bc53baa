//! Persistence records for users and cubes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Root,
    Admin,
    User,
    Guest,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Root => "root",
            UserRole::Admin => "admin",
            UserRole::User => "user",
            UserRole::Guest => "guest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "root" => Some(Self::Root),
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            "guest" => Some(Self::Guest),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    pub user_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag; inactive users fail validation but stay queryable.
    pub is_active: bool,
}

/// A named memory container owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cube {
    pub cube_id: String,
    pub cube_name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}
