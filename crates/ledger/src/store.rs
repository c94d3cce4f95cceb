//! Persistence trait for the execution ledger.

use async_trait::async_trait;

use crate::{Result, types::TaskRun};

/// Storage backend for [`TaskRun`] rows.
///
/// `begin` is the linchpin of at-most-once: a single atomic
/// insert-or-conditional-update against the unique (name, idempotency_key)
/// index. No other synchronization is required anywhere in the system.
#[async_trait]
pub trait TaskRunStore: Send + Sync {
    /// Acquire the execution slot for (name, key).
    ///
    /// Creates a `processing` row, or atomically flips an existing `failure`
    /// row back to `processing` (explicit retry). Errors with
    /// [`crate::Error::AlreadyCompleted`] if a `success` row exists and
    /// [`crate::Error::AlreadyRunning`] if a `processing` row exists.
    async fn begin(&self, name: &str, key: &str) -> Result<TaskRun>;

    /// Transition a `processing` row to `success` (terminal).
    async fn complete(&self, run: &TaskRun) -> Result<TaskRun>;

    /// Transition a `processing` row to `failure`, recording `error_text`.
    async fn fail(&self, run: &TaskRun, error_text: &str) -> Result<TaskRun>;

    /// Most recent row for (name, key), if any.
    async fn find(&self, name: &str, key: &str) -> Result<Option<TaskRun>>;

    /// Rows latest-first, optionally filtered by name.
    async fn list(&self, name: Option<&str>, limit: usize) -> Result<Vec<TaskRun>>;
}
