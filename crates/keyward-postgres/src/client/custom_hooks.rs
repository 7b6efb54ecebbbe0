//! Connection setup and pool lifecycle hooks.

use std::time::Instant;

use deadpool::managed::{HookResult, Metrics};
use diesel::ConnectionResult;
use diesel_async::pooled_connection::{PoolError, PoolableConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection};
use futures::FutureExt;
use futures::future::BoxFuture;

use super::pg_config::mask_url;
use crate::TRACING_TARGET_CONNECTION;

/// Opens a connection for the pool manager and reports the outcome.
///
/// The URL is masked before it reaches the logs.
pub fn establish_connection<C>(url: &str) -> BoxFuture<'_, ConnectionResult<C>>
where
    C: AsyncConnection + 'static,
{
    async move {
        let started = Instant::now();
        let result = C::establish(url).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(err) = &result {
            tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                url = %mask_url(url),
                elapsed_ms,
                error = %err,
                "Could not open a PostgreSQL connection"
            );
        } else {
            tracing::debug!(
                target: TRACING_TARGET_CONNECTION,
                url = %mask_url(url),
                elapsed_ms,
                "Opened a PostgreSQL connection"
            );
        }

        result
    }
    .boxed()
}

/// Runs once for every connection the pool creates.
pub fn on_create(_conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    tracing::trace!(
        target: TRACING_TARGET_CONNECTION,
        created = ?metrics.created,
        "Pooled connection created"
    );

    Ok(())
}

/// Runs before an idle connection is handed out again.
///
/// Broken connections are still returned to deadpool, whose own recycle
/// check discards them. This hook only records that it happened.
pub fn on_recycle(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    if conn.is_broken() {
        tracing::warn!(
            target: TRACING_TARGET_CONNECTION,
            recycle_count = metrics.recycle_count,
            age_ms = metrics.age().as_millis() as u64,
            "Pooled connection is broken"
        );
    }

    Ok(())
}
