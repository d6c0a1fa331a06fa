// ============================================================================
// OLYMPUS CLOUD - DATABASE MODULE
// ============================================================================
// Module: shared/src/database/mod.rs
// Description: Database connection management and utilities
// Date: 2025-01-18
// ============================================================================

pub mod connection;
pub mod migrations;
pub mod health;

pub use connection::{ConnectionPool, DatabaseConfig};
pub use health::HealthChecker;
pub use migrations::MigrationRunner;

use sqlx::{PgPool, Postgres, Transaction};

/// Type alias for database pool
pub type DbPool = PgPool;

/// Type alias for database transaction
pub type DbTransaction<'a> = Transaction<'a, Postgres>;

/// Database result type
pub type DbResult<T> = Result<T, sqlx::Error>;
