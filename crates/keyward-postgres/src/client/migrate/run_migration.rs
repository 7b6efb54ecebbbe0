use std::time::Instant;

use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::PoolableConnection;
use diesel_migrations::MigrationHarness;

use super::{MigrationResult, get_migration_status};
use crate::{MIGRATIONS, PgClient, PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Applies every embedded migration the database has not seen yet.
///
/// The diesel harness is blocking. It runs on tokio's blocking pool over
/// an [`AsyncConnectionWrapper`] that owns the pooled connection.
#[tracing::instrument(skip_all, target = TRACING_TARGET_MIGRATION)]
pub async fn run_pending_migrations(pg: &PgClient) -> PgResult<MigrationResult> {
    let started = Instant::now();
    let mut conn = pg.get_pooled_connection().await?;

    let status = get_migration_status(&mut conn).await?;
    if status.is_up_to_date() {
        tracing::debug!(
            target: TRACING_TARGET_MIGRATION,
            applied = status.applied_migrations(),
            "schema up to date"
        );
        return Ok(MigrationResult::success(started.elapsed(), Vec::new()));
    }

    if conn.is_broken() {
        return Err(PgError::Migration(
            "connection broken before migrating".into(),
        ));
    }

    tracing::info!(
        target: TRACING_TARGET_MIGRATION,
        pending = status.pending_migrations(),
        from = status.last_applied_version().unwrap_or("none"),
        "applying migrations"
    );

    let mut wrapper: AsyncConnectionWrapper<_> = conn.into();
    let applied = tokio::task::spawn_blocking(move || {
        wrapper
            .run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.iter().map(ToString::to_string).collect::<Vec<_>>())
    })
    .await
    .map_err(|e| PgError::Migration(e.into()))?
    .inspect_err(|e| {
        tracing::error!(target: TRACING_TARGET_MIGRATION, error = %e, "migration failed");
    })
    .map_err(PgError::Migration)?;

    let result = MigrationResult::success(started.elapsed(), applied);
    tracing::info!(
        target: TRACING_TARGET_MIGRATION,
        applied = result.processed_versions.len(),
        to = result.last_processed_version().unwrap_or("none"),
        duration_ms = result.duration.as_millis() as u64,
        "migrations applied"
    );

    Ok(result)
}
