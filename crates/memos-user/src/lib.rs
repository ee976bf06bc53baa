//! MemOS User - user/cube persistence over pluggable relational backends
//!
//! CRUD over two tables (users, cubes) plus an access-association table, with
//! idempotent schema creation on startup. Backends: SQLite (rusqlite), MySQL
//! and Postgres (sqlx). Factories resolve the backend from configuration and
//! environment-variable overrides.

pub mod config;
pub mod factory;
pub mod manager;
pub mod models;
pub mod mysql;
pub mod persistent;
pub mod postgres;
pub mod sqlite;

pub use config::*;
pub use factory::*;
pub use manager::*;
pub use models::*;
pub use mysql::*;
pub use persistent::*;
pub use postgres::*;
pub use sqlite::*;
