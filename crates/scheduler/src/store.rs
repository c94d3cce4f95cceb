//! Persistence trait for trigger state and fire history.

use async_trait::async_trait;

use crate::{
    Result,
    types::{FireRecord, JobRecord},
};

/// Storage backend for trigger records.
///
/// `claim` is the dispatch linchpin: one atomic conditional update that
/// marks a due fire as taken and clears the pending schedule. Two engines
/// sharing a store cannot both win the same fire, and a restart between
/// claim and completion leaves the job parked rather than replayed.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Look up a trigger by id.
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>>;

    /// All persisted triggers, in unspecified order.
    async fn load_all(&self) -> Result<Vec<JobRecord>>;

    /// Insert or replace a trigger. The record's state is authoritative:
    /// the schedule mirror is rewritten from `state.next_fire_at_ms` and
    /// `state.running_at_ms`.
    async fn upsert(&self, record: &JobRecord) -> Result<()>;

    /// Claim the fire scheduled for `scheduled_for_ms`.
    ///
    /// Succeeds only while the pending schedule still equals
    /// `scheduled_for_ms`; on success the schedule is cleared and
    /// `running_at_ms` set to `now_ms` in one step. Returns `false` when
    /// another engine already claimed it or the trigger changed underneath.
    async fn claim(&self, job_id: &str, scheduled_for_ms: u64, now_ms: u64) -> Result<bool>;

    /// Append one fire decision to the history.
    async fn append_fire(&self, fire: &FireRecord) -> Result<()>;

    /// Fire history for a trigger: the latest `limit` entries,
    /// oldest-first within that window.
    async fn fires(&self, job_id: &str, limit: usize) -> Result<Vec<FireRecord>>;
}
