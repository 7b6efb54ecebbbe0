//! Database error type.

use std::borrow::Cow;

use deadpool::managed::TimeoutType;
use diesel::result::{ConnectionError, Error as DieselError};
use diesel_async::pooled_connection::PoolError as ManagerError;
use diesel_async::pooled_connection::deadpool::PoolError;

use crate::TRACING_TARGET_CONNECTION;

/// Boxed error used for migration failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a database operation.
pub type PgResult<T, E = PgError> = Result<T, E>;

/// Failure of a PostgreSQL operation.
#[derive(Debug, thiserror::Error)]
#[must_use = "database errors should be handled appropriately"]
pub enum PgError {
    #[error("invalid postgres configuration: {0}")]
    Config(String),

    /// No connection could be checked out, created or recycled in time.
    #[error("postgres {0:?} timeout")]
    Timeout(TimeoutType),

    #[error("postgres connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("postgres migration failed: {0}")]
    Migration(BoxError),

    #[error("postgres query failed: {0}")]
    Query(#[from] DieselError),

    #[error("postgres client failure: {0}")]
    Unexpected(Cow<'static, str>),
}

impl PgError {
    /// Name of the violated constraint, for constraint violations.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            Self::Query(DieselError::DatabaseError(_, info)) => info.constraint_name(),
            _ => None,
        }
    }

    /// Whether the same call may succeed once the database recovers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(ConnectionError::BadConnection(_))
        )
    }

    /// What an operator should check first.
    pub fn hint(&self) -> Option<&'static str> {
        let hint = match self {
            Self::Timeout(TimeoutType::Wait) => "all pooled connections are busy, raise POSTGRES_MAX_CONNECTIONS",
            Self::Timeout(TimeoutType::Create) => "the database did not accept a new connection in time",
            Self::Timeout(TimeoutType::Recycle) => "an idle connection could not be reset",
            Self::Connection(_) => "check that POSTGRES_URL points to a reachable database",
            Self::Migration(_) => "inspect __diesel_schema_migrations for a partially applied migration",
            _ => return None,
        };
        Some(hint)
    }
}

impl From<PoolError> for PgError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::Timeout(timeout) => Self::Timeout(timeout),
            PoolError::Backend(ManagerError::ConnectionError(e)) => Self::Connection(e),
            PoolError::Backend(ManagerError::QueryError(e)) => Self::Query(e),
            PoolError::Closed => Self::Unexpected("connection pool is closed".into()),
            PoolError::NoRuntimeSpecified => Self::Unexpected("connection pool has no runtime".into()),
            PoolError::PostCreateHook(e) => {
                tracing::warn!(target: TRACING_TARGET_CONNECTION, error = %e, "post-create hook failed");
                Self::Unexpected(e.to_string().into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_transient() {
        let error = PgError::from(PoolError::Timeout(TimeoutType::Wait));
        assert!(error.is_transient());
        assert!(error.hint().is_some_and(|hint| hint.contains("POSTGRES_MAX_CONNECTIONS")));
    }

    #[test]
    fn config_errors_have_no_hint() {
        let error = PgError::Config("postgres_max_connections is 100, expected 2..=16".into());
        assert!(!error.is_transient());
        assert_eq!(error.constraint(), None);
        assert_eq!(error.hint(), None);
    }

    #[test]
    fn closed_pool_is_permanent() {
        let error = PgError::from(PoolError::Closed);
        assert!(matches!(error, PgError::Unexpected(_)));
        assert!(!error.is_transient());
    }
}
