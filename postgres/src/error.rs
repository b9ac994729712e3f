//! `sqlx` error classification.

use tripdesk_core::StoreError;

/// `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";
/// `lock_not_available`, raised when `lock_timeout` elapses
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// `query_canceled`, raised when `statement_timeout` elapses
const QUERY_CANCELED: &str = "57014";
/// `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";
/// Class 23, integrity constraint violations
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";
/// Class 08, connection exceptions
const CONNECTION_EXCEPTION_CLASS: &str = "08";

/// Map a SQLSTATE onto the storage taxonomy.
///
/// Lock timeouts, deadlocks and serialization failures are timeouts: the
/// transaction was rolled back and may be retried. Integrity violations
/// (class `23`) and unknown codes are bugs and are never retried.
fn classify_sqlstate(code: Option<&str>, constraint: Option<&str>, message: &str) -> StoreError {
    let constraint = constraint.unwrap_or("unknown").to_string();
    match code {
        Some(UNIQUE_VIOLATION) => StoreError::UniqueViolation { constraint },
        Some(
            LOCK_NOT_AVAILABLE | QUERY_CANCELED | DEADLOCK_DETECTED | SERIALIZATION_FAILURE,
        ) => StoreError::Timeout(message.to_string()),
        Some(code) if code.starts_with(INTEGRITY_CONSTRAINT_CLASS) => {
            StoreError::ConstraintViolation { constraint }
        }
        Some(code) if code.starts_with(CONNECTION_EXCEPTION_CLASS) => {
            StoreError::Unavailable(message.to_string())
        }
        _ => StoreError::Backend(message.to_string()),
    }
}

/// Map a `sqlx` error onto the storage taxonomy.
pub(crate) fn store_error(error: sqlx::Error) -> StoreError {
    let mapped = match &error {
        sqlx::Error::Database(db) => {
            classify_sqlstate(db.code().as_deref(), db.constraint(), db.message())
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout("timed out acquiring a connection".to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(error.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(error.to_string()),
        _ => StoreError::Backend(error.to_string()),
    };

    let kind = match &mapped {
        StoreError::Unavailable(_) => "unavailable",
        StoreError::Timeout(_) => "timeout",
        StoreError::UniqueViolation { .. } => "unique_violation",
        StoreError::ConstraintViolation { .. } => "constraint_violation",
        StoreError::Corrupt(_) => "corrupt",
        StoreError::Backend(_) => "backend",
    };
    metrics::counter!("store_errors_total", "kind" => kind).increment(1);
    tracing::debug!(kind, error = %error, "Storage error");
    mapped
}
