//! Database initialization, schema and settings access

pub mod init;
pub mod migrations;
pub mod settings;

pub use init::init_database;

/// Whether an sqlx error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Whether an sqlx error is a FOREIGN KEY constraint violation
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
