//! Startup and shutdown wiring for the daemon.

use std::sync::Arc;

use {
    anyhow::Result,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::info,
};

use {
    vigil_config::VigilConfig,
    vigil_ledger::{TaskRunStore, run_once, store_sqlite::SqliteTaskRunStore},
    vigil_scheduler::{
        EngineDefaults, JobRegistry, SchedulerEngine, store_sqlite::SqliteTriggerStore,
    },
};

/// Everything the running daemon holds onto.
pub struct Runtime {
    pub engine: Arc<SchedulerEngine>,
    pub ledger: Arc<dyn TaskRunStore>,
    pub pool: SqlitePool,
}

/// Connect storage, wrap one-off targets in the idempotency guard,
/// register the job catalog, and start the engine.
pub async fn on_startup(config: &VigilConfig, registry: JobRegistry) -> Result<Runtime> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url)
        .await?;

    // Ledger first: the guard's table must exist before any job fires.
    vigil_ledger::run_migrations(&pool).await?;
    vigil_scheduler::run_migrations(&pool).await?;

    let ledger: Arc<dyn TaskRunStore> = Arc::new(SqliteTaskRunStore::with_pool(pool.clone()));
    let triggers = Arc::new(SqliteTriggerStore::with_pool(pool.clone()));

    let registry = guard_one_offs(registry, Arc::clone(&ledger));
    let job_count = registry.one_off.len() + registry.recurring.len();

    let engine = SchedulerEngine::new(triggers, EngineDefaults {
        timezone: config.scheduler.timezone.clone(),
        max_instances: config.scheduler.max_instances,
        misfire_grace_ms: config.scheduler.misfire_grace_secs * 1000,
    });
    engine.register_all(&registry).await?;
    engine.start().await?;

    info!(jobs = job_count, "scheduler started");

    Ok(Runtime {
        engine,
        ledger,
        pool,
    })
}

/// Stop the engine. In-flight job bodies finish on their own tasks.
pub async fn on_shutdown(runtime: &Runtime) {
    runtime.engine.shutdown().await;
}

/// Wrap every one-off target so a fire whose (name, key) already succeeded
/// is a silent skip, whatever the trigger store thinks.
fn guard_one_offs(mut registry: JobRegistry, ledger: Arc<dyn TaskRunStore>) -> JobRegistry {
    for spec in &mut registry.one_off {
        let name = spec.name.clone();
        let key = spec.idempotency_key.clone();
        let inner = Arc::clone(&spec.target);
        let ledger = Arc::clone(&ledger);
        spec.target = Arc::new(move || {
            let name = name.clone();
            let key = key.clone();
            let inner = Arc::clone(&inner);
            let ledger = Arc::clone(&ledger);
            Box::pin(async move {
                run_once(ledger.as_ref(), &name, &key, || inner()).await?;
                Ok(())
            })
        });
    }
    registry
}
