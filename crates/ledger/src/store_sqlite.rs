//! SQLite-backed ledger store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqlitePoolOptions, SqliteRow},
    },
    uuid::Uuid,
};

use vigil_common::now_ms;

use crate::{
    Error, Result,
    store::TaskRunStore,
    types::{TaskRun, TaskStatus},
};

/// SQLite-backed persistence for task runs.
pub struct SqliteTaskRunStore {
    pool: SqlitePool,
}

impl SqliteTaskRunStore {
    /// Create a new store with its own connection pool and run migrations.
    ///
    /// Use this for standalone ledger databases. For shared pools (e.g. the
    /// daemon's single vigil.db), use [`SqliteTaskRunStore::with_pool`] after
    /// calling [`crate::run_migrations`].
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

fn row_to_task_run(row: &SqliteRow) -> Result<TaskRun> {
    let status_str: String = row.get("status");
    Ok(TaskRun {
        id: row.get("id"),
        name: row.get("name"),
        idempotency_key: row.get("idempotency_key"),
        status: TaskStatus::from_db(&status_str)?,
        last_error: row.get("last_error"),
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
    })
}

#[async_trait]
impl TaskRunStore for SqliteTaskRunStore {
    async fn begin(&self, name: &str, key: &str) -> Result<TaskRun> {
        let id = Uuid::new_v4().to_string();
        let now = now_ms() as i64;

        // Atomic insert-or-retry: a fresh key inserts, a `failure` row is
        // flipped back to `processing`, anything else leaves 0 rows affected.
        let result = sqlx::query(
            "INSERT INTO task_runs (id, name, idempotency_key, status, last_error, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, 'processing', NULL, ?, ?)
             ON CONFLICT(name, idempotency_key) DO UPDATE
               SET status = 'processing', last_error = NULL, updated_at_ms = excluded.updated_at_ms
               WHERE task_runs.status = 'failure'",
        )
        .bind(&id)
        .bind(name)
        .bind(key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find(name, key).await? {
                Some(existing) if existing.status == TaskStatus::Success => {
                    Err(Error::already_completed(name, key))
                },
                _ => Err(Error::already_running(name, key)),
            };
        }

        // Re-select: on the retry path the row keeps its original id.
        self.find(name, key)
            .await?
            .ok_or_else(|| Error::already_running(name, key))
    }

    async fn complete(&self, run: &TaskRun) -> Result<TaskRun> {
        self.transition(run, TaskStatus::Success, None).await
    }

    async fn fail(&self, run: &TaskRun, error_text: &str) -> Result<TaskRun> {
        self.transition(run, TaskStatus::Failure, Some(error_text))
            .await
    }

    async fn find(&self, name: &str, key: &str) -> Result<Option<TaskRun>> {
        let row = sqlx::query(
            "SELECT id, name, idempotency_key, status, last_error, created_at_ms, updated_at_ms
             FROM task_runs WHERE name = ? AND idempotency_key = ?",
        )
        .bind(name)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_task_run).transpose()
    }

    async fn list(&self, name: Option<&str>, limit: usize) -> Result<Vec<TaskRun>> {
        // Guard the cast: a wrapped negative LIMIT is unbounded in SQLite.
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match name {
            Some(name) => {
                sqlx::query(
                    "SELECT id, name, idempotency_key, status, last_error, created_at_ms, updated_at_ms
                     FROM task_runs WHERE name = ?
                     ORDER BY updated_at_ms DESC LIMIT ?",
                )
                .bind(name)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query(
                    "SELECT id, name, idempotency_key, status, last_error, created_at_ms, updated_at_ms
                     FROM task_runs ORDER BY updated_at_ms DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            },
        };

        rows.iter().map(row_to_task_run).collect()
    }
}

impl SqliteTaskRunStore {
    async fn transition(
        &self,
        run: &TaskRun,
        to: TaskStatus,
        error_text: Option<&str>,
    ) -> Result<TaskRun> {
        let now = now_ms() as i64;
        let result = sqlx::query(
            "UPDATE task_runs SET status = ?, last_error = ?, updated_at_ms = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(to.as_str())
        .bind(error_text)
        .bind(now)
        .bind(&run.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::InvalidTransition {
                id: run.id.clone(),
            });
        }

        self.find(&run.name, &run.idempotency_key)
            .await?
            .ok_or_else(|| Error::InvalidTransition {
                id: run.id.clone(),
            })
    }
}
