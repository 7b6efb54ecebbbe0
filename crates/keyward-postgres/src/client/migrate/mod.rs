//! Database migration management.
//!
//! Migrations are embedded at compile time and applied through the
//! [`PgClientMigrationExt`] extension trait.

mod client_ext;
mod migrate_result;
mod run_migration;
mod run_utility;

pub use client_ext::PgClientMigrationExt;
pub use migrate_result::{MigrationResult, MigrationStatus};
pub use run_migration::run_pending_migrations;
pub use run_utility::{
    embedded_migrations, get_applied_migrations, get_migration_status, verify_schema_integrity,
};
