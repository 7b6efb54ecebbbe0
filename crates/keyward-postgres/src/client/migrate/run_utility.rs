use diesel::pg::Pg;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel::migration::MigrationSource;

use super::MigrationStatus;
use crate::{MIGRATIONS, PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Diesel's bookkeeping table.
const MIGRATIONS_TABLE: &str = "__diesel_schema_migrations";

#[derive(diesel::QueryableByName)]
struct ExistsResult {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    exists: bool,
}

/// Returns the versions of all embedded migrations, oldest first.
pub fn embedded_migrations() -> PgResult<Vec<String>> {
    let mut versions = MigrationSource::<Pg>::migrations(&MIGRATIONS)
        .map_err(PgError::Migration)?
        .iter()
        .map(|migration| migration.name().version().to_string())
        .collect::<Vec<_>>();
    versions.sort();
    Ok(versions)
}

/// Compares embedded migrations with the ones recorded in the database.
#[tracing::instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn get_migration_status(conn: &mut AsyncPgConnection) -> PgResult<MigrationStatus> {
    let embedded = embedded_migrations()?;
    let applied = get_applied_migrations(conn).await?;
    let status = MigrationStatus::compare(&embedded, applied);

    tracing::debug!(
        target: TRACING_TARGET_MIGRATION,
        applied_count = status.applied_migrations(),
        pending_count = status.pending_migrations(),
        is_up_to_date = status.is_up_to_date(),
        "Migration status retrieved"
    );

    Ok(status)
}

/// Checks that the migration bookkeeping table exists.
#[tracing::instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn verify_schema_integrity(conn: &mut AsyncPgConnection) -> PgResult<()> {
    if !migrations_table_exists(conn).await? {
        tracing::warn!(
            target: TRACING_TARGET_MIGRATION,
            "Migration table does not exist, database may not be initialized"
        );
        return Err(PgError::Migration(
            format!("Migration table {MIGRATIONS_TABLE} does not exist").into(),
        ));
    }

    Ok(())
}

/// Returns applied migration versions, or none on a fresh database.
#[tracing::instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn get_applied_migrations(conn: &mut AsyncPgConnection) -> PgResult<Vec<String>> {
    #[derive(diesel::QueryableByName)]
    struct MigrationVersion {
        #[diesel(sql_type = diesel::sql_types::Text)]
        version: String,
    }

    if !migrations_table_exists(conn).await? {
        return Ok(Vec::new());
    }

    let versions = diesel::sql_query(format!(
        "SELECT version FROM {MIGRATIONS_TABLE} ORDER BY version"
    ))
    .get_results::<MigrationVersion>(conn)
    .await
    .map_err(|e| PgError::Migration(format!("Failed to get applied migrations: {}", e).into()))?
    .into_iter()
    .map(|row| row.version)
    .collect();

    Ok(versions)
}

async fn migrations_table_exists(conn: &mut AsyncPgConnection) -> PgResult<bool> {
    let result = diesel::sql_query(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
         ) AS exists",
    )
    .bind::<diesel::sql_types::Text, _>(MIGRATIONS_TABLE)
    .get_result::<ExistsResult>(conn)
    .await
    .map_err(|e| PgError::Migration(format!("Failed to check migration table: {}", e).into()))?;

    Ok(result.exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_protection_keys_migration() -> anyhow::Result<()> {
        let versions = embedded_migrations()?;
        assert_eq!(versions, vec!["20240101000000".to_string()]);
        Ok(())
    }
}
