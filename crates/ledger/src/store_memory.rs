//! In-memory ledger store for testing.

use std::{collections::HashMap, sync::Mutex};

use {async_trait::async_trait, uuid::Uuid};

use vigil_common::now_ms;

use crate::{
    Error, Result,
    store::TaskRunStore,
    types::{TaskRun, TaskStatus},
};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryTaskRunStore {
    rows: Mutex<HashMap<(String, String), TaskRun>>,
}

impl InMemoryTaskRunStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTaskRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunStore for InMemoryTaskRunStore {
    async fn begin(&self, name: &str, key: &str) -> Result<TaskRun> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_ms();

        match rows.get_mut(&(name.to_string(), key.to_string())) {
            Some(existing) => match existing.status {
                TaskStatus::Success => Err(Error::already_completed(name, key)),
                TaskStatus::Processing => Err(Error::already_running(name, key)),
                TaskStatus::Failure => {
                    existing.status = TaskStatus::Processing;
                    existing.last_error = None;
                    existing.updated_at_ms = now;
                    Ok(existing.clone())
                },
            },
            None => {
                let run = TaskRun {
                    id: Uuid::new_v4().to_string(),
                    name: name.to_string(),
                    idempotency_key: key.to_string(),
                    status: TaskStatus::Processing,
                    last_error: None,
                    created_at_ms: now,
                    updated_at_ms: now,
                };
                rows.insert((name.to_string(), key.to_string()), run.clone());
                Ok(run)
            },
        }
    }

    async fn complete(&self, run: &TaskRun) -> Result<TaskRun> {
        self.transition(run, TaskStatus::Success, None)
    }

    async fn fail(&self, run: &TaskRun, error_text: &str) -> Result<TaskRun> {
        self.transition(run, TaskStatus::Failure, Some(error_text))
    }

    async fn find(&self, name: &str, key: &str) -> Result<Option<TaskRun>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.get(&(name.to_string(), key.to_string())).cloned())
    }

    async fn list(&self, name: Option<&str>, limit: usize) -> Result<Vec<TaskRun>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<TaskRun> = rows
            .values()
            .filter(|r| name.is_none_or(|n| r.name == n))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        out.truncate(limit);
        Ok(out)
    }
}

impl InMemoryTaskRunStore {
    fn transition(
        &self,
        run: &TaskRun,
        to: TaskStatus,
        error_text: Option<&str>,
    ) -> Result<TaskRun> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let key = (run.name.clone(), run.idempotency_key.clone());
        match rows.get_mut(&key) {
            Some(existing) if existing.status == TaskStatus::Processing => {
                existing.status = to;
                existing.last_error = error_text.map(str::to_string);
                existing.updated_at_ms = now_ms();
                Ok(existing.clone())
            },
            _ => Err(Error::InvalidTransition {
                id: run.id.clone(),
            }),
        }
    }
}
