//! In-memory trigger store for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    store::TriggerStore,
    types::{FireRecord, JobRecord},
};

struct Entry {
    record: JobRecord,
    // Mirrors of record.state, updated independently by `claim` exactly
    // like the sqlite columns.
    next_fire_at_ms: Option<u64>,
    running_at_ms: Option<u64>,
}

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryTriggerStore {
    jobs: Mutex<HashMap<String, Entry>>,
    fires: Mutex<HashMap<String, Vec<FireRecord>>>,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            fires: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTriggerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(job_id).map(|e| e.record.clone()))
    }

    async fn load_all(&self) -> Result<Vec<JobRecord>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.values().map(|e| e.record.clone()).collect())
    }

    async fn upsert(&self, record: &JobRecord) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(
            record.job_id.clone(),
            Entry {
                record: record.clone(),
                next_fire_at_ms: record.state.next_fire_at_ms,
                running_at_ms: record.state.running_at_ms,
            },
        );
        Ok(())
    }

    async fn claim(&self, job_id: &str, scheduled_for_ms: u64, now_ms: u64) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        match jobs.get_mut(job_id) {
            Some(entry) if entry.next_fire_at_ms == Some(scheduled_for_ms) => {
                entry.next_fire_at_ms = None;
                entry.running_at_ms = Some(now_ms);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn append_fire(&self, fire: &FireRecord) -> Result<()> {
        let mut fires = self.fires.lock().unwrap_or_else(|e| e.into_inner());
        fires
            .entry(fire.job_id.clone())
            .or_default()
            .push(fire.clone());
        Ok(())
    }

    async fn fires(&self, job_id: &str, limit: usize) -> Result<Vec<FireRecord>> {
        let fires = self.fires.lock().unwrap_or_else(|e| e.into_inner());
        let all = fires.get(job_id).map(Vec::as_slice).unwrap_or_default();
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }
}
