//! SQLite-backed trigger store using sqlx.
//!
//! The full [`JobRecord`] is stored as a JSON blob in `data`;
//! `next_fire_at_ms` and `running_at_ms` are mirrored into their own
//! columns so [`TriggerStore::claim`] can be a single conditional UPDATE.

use {
    async_trait::async_trait,
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqlitePoolOptions, SqliteRow},
    },
};

use crate::{
    Result,
    store::TriggerStore,
    types::{FireRecord, FireStatus, JobRecord},
};

/// SQLite-backed persistence for triggers and fire history.
pub struct SqliteTriggerStore {
    pool: SqlitePool,
}

impl SqliteTriggerStore {
    /// Create a new store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<JobRecord> {
    let data: String = row.get("data");
    let record: JobRecord = serde_json::from_str(&data)?;
    Ok(record)
}

fn row_to_fire(row: &SqliteRow) -> Result<FireRecord> {
    let status_str: String = row.get("status");
    Ok(FireRecord {
        job_id: row.get("job_id"),
        scheduled_for_ms: row.get::<i64, _>("scheduled_for_ms") as u64,
        started_at_ms: row.get::<i64, _>("started_at_ms") as u64,
        finished_at_ms: row.get::<i64, _>("finished_at_ms") as u64,
        status: FireStatus::from_db(&status_str)?,
        error: row.get("error"),
        duration_ms: row.get::<i64, _>("duration_ms") as u64,
    })
}

#[async_trait]
impl TriggerStore for SqliteTriggerStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query("SELECT data FROM scheduler_jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn load_all(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query("SELECT data FROM scheduler_jobs")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn upsert(&self, record: &JobRecord) -> Result<()> {
        let data = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO scheduler_jobs (job_id, data, next_fire_at_ms, running_at_ms)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(job_id) DO UPDATE
               SET data = excluded.data,
                   next_fire_at_ms = excluded.next_fire_at_ms,
                   running_at_ms = excluded.running_at_ms",
        )
        .bind(&record.job_id)
        .bind(&data)
        .bind(record.state.next_fire_at_ms.map(|v| v as i64))
        .bind(record.state.running_at_ms.map(|v| v as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim(&self, job_id: &str, scheduled_for_ms: u64, now_ms: u64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduler_jobs
             SET running_at_ms = ?, next_fire_at_ms = NULL
             WHERE job_id = ? AND next_fire_at_ms = ?",
        )
        .bind(now_ms as i64)
        .bind(job_id)
        .bind(scheduled_for_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_fire(&self, fire: &FireRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO scheduler_fires
               (job_id, scheduled_for_ms, started_at_ms, finished_at_ms, status, error, duration_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&fire.job_id)
        .bind(fire.scheduled_for_ms as i64)
        .bind(fire.started_at_ms as i64)
        .bind(fire.finished_at_ms as i64)
        .bind(fire.status.as_str())
        .bind(fire.error.as_deref())
        .bind(fire.duration_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fires(&self, job_id: &str, limit: usize) -> Result<Vec<FireRecord>> {
        let rows = sqlx::query(
            "SELECT job_id, scheduled_for_ms, started_at_ms, finished_at_ms, status, error, duration_ms
             FROM scheduler_fires WHERE job_id = ?
             ORDER BY id DESC LIMIT ?",
        )
        .bind(job_id)
        // Guard the cast: a wrapped negative LIMIT is unbounded in SQLite.
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut fires: Vec<FireRecord> = rows.iter().map(row_to_fire).collect::<Result<_>>()?;
        fires.reverse();
        Ok(fires)
    }
}
