//! # Database Errors
//!
//! ```text
//! sqlx::Error ──► DbError ──┬── transient (Conflict, PoolExhausted)
//!                           │     └─► TransactionManager retries
//!                           │
//!                           └── everything else
//!                                 └─► aborts the unit of work, surfaces
//!                                     as CommerceError::Database
//! ```
//!
//! Constraint failures are classified with `sqlx`'s `ErrorKind`; lock
//! contention is read from the SQLite result code, where extended codes such
//! as `SQLITE_BUSY_SNAPSHOT` (517) keep the primary code in the low byte.

use sqlx::error::ErrorKind;
use thiserror::Error;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `field` is `table.column` as reported by SQLite.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A schema CHECK rejected the row, e.g. `stock >= reserved`.
    #[error("Check constraint violated: {message}")]
    CheckViolation { message: String },

    /// Another connection holds the write lock, or our read snapshot went
    /// stale before we could write.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Every pooled connection stayed checked out past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether running the whole transaction again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Conflict(_) | DbError::PoolExhausted)
    }
}

fn is_lock_contention(code: Option<&str>, message: &str) -> bool {
    let primary = code
        .and_then(|c| c.parse::<i32>().ok())
        .map(|c| c & 0xff);

    matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
        || message.contains("database is locked")
        || message.contains("database table is locked")
}

/// `"UNIQUE constraint failed: products.sku"` → `"products.sku"`
fn constraint_target(message: &str) -> String {
    message
        .split_once("constraint failed: ")
        .map(|(_, target)| target.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();

                if is_lock_contention(db_err.code().as_deref(), &message) {
                    return DbError::Conflict(message);
                }

                match db_err.kind() {
                    // The offending value is not in SQLite's message;
                    // repositories fill it in where they know it.
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        field: constraint_target(&message),
                        value: "unknown".to_string(),
                    },
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
                    ErrorKind::CheckViolation => DbError::CheckViolation { message },
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_detection() {
        assert!(is_lock_contention(Some("5"), ""));
        assert!(is_lock_contention(Some("517"), ""));
        assert!(is_lock_contention(Some("262"), ""));
        assert!(is_lock_contention(None, "database is locked"));

        assert!(!is_lock_contention(Some("2067"), "UNIQUE constraint failed: products.sku"));
        assert!(!is_lock_contention(None, "no such table: products"));
    }

    #[test]
    fn test_constraint_target() {
        assert_eq!(
            constraint_target("UNIQUE constraint failed: products.sku"),
            "products.sku"
        );
        assert_eq!(constraint_target("something else"), "unknown");
    }

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Conflict("busy".into()).is_transient());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DbError::not_found("Product", "p1").is_transient());
        assert!(!DbError::QueryFailed("syntax".into()).is_transient());
    }

    #[tokio::test]
    async fn test_constraint_errors_are_classified() {
        let db = crate::Database::new(crate::DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, code TEXT UNIQUE, n INTEGER CHECK (n >= 0))",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO t (code, n) VALUES ('a', 1)")
            .execute(db.pool())
            .await
            .unwrap();

        let dup = sqlx::query("INSERT INTO t (code, n) VALUES ('a', 1)")
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(matches!(
            DbError::from(dup),
            DbError::UniqueViolation { ref field, .. } if field == "t.code"
        ));

        let negative = sqlx::query("INSERT INTO t (code, n) VALUES ('b', -1)")
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(matches!(DbError::from(negative), DbError::CheckViolation { .. }));
    }
}
