//! Durable execution ledger with at-most-once idempotency guarantees.
//!
//! A [`types::TaskRun`] row records one logical unit of work, identified by
//! (name, idempotency_key). The [`guard::run_once`] wrapper acquires the
//! execution slot, runs the job body, and finalizes the row on every exit
//! path.

pub mod error;
pub mod guard;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    guard::{GuardOutcome, run_once},
    store::TaskRunStore,
};

/// Run database migrations for the ledger crate.
///
/// Creates the `task_runs` table. Call at application startup when using
/// [`store_sqlite::SqliteTaskRunStore`] with a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
