//! Trigger evaluation and dispatch for one-off and recurring jobs.
//!
//! Trigger state is persisted across restarts: a one-time trigger that
//! already fired stays fired, and cron triggers resume their schedule
//! instead of replaying a backlog. The engine guarantees the
//! invocation-level concurrency envelope (`max_instances`, misfire grace);
//! all-time idempotency for one-off jobs belongs to the ledger guard.

pub mod engine;
pub mod error;
pub mod registry;
pub mod schedule;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    engine::{EngineDefaults, SchedulerEngine},
    error::{Error, Result},
    registry::{JobFn, JobRegistry, JobSet, OneOffJobSpec, RecurringJobSpec},
};

/// Run database migrations for the scheduler crate.
///
/// Creates the `scheduler_jobs` and `scheduler_fires` tables. Call at
/// application startup when using [`store_sqlite::SqliteTriggerStore`]
/// with a shared pool, after the ledger migrations.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
