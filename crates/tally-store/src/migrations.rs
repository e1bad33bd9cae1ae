//! Schema migrations for [`SqliteStore`](crate::SqliteStore), embedded at
//! compile time from the workspace `migrations/sqlite/` directory.
//!
//! New schema goes in a new `NNN_description.sql` file. Applied files are
//! checksummed by sqlx, so an edited migration fails at startup.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::StoreResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every pending migration in filename order.
pub async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
    let embedded = MIGRATOR.migrations.len();
    debug!(embedded, "Applying store migrations");

    MIGRATOR.run(pool).await?;

    info!(embedded, "Store schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts. A pool that never ran
/// migrations reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> StoreResult<(usize, usize)> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied: i64 = if tracked == 0 {
        0
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    };

    Ok((MIGRATOR.migrations.len(), applied as usize))
}
