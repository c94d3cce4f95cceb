//! Scoped acquisition of a one-off execution slot.

use std::future::Future;

use tracing::{error, info};

use crate::{Error, Result, store::TaskRunStore};

/// What happened to a guarded execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The body ran to completion and the row is `success`.
    Completed,
    /// A prior run already succeeded for this key; the body was not run.
    AlreadyCompleted,
    /// Another run holds the slot (concurrent caller, or a leftover
    /// `processing` row from a crashed process); the body was not run.
    AlreadyRunning,
}

impl GuardOutcome {
    /// Whether the wrapped body actually executed.
    #[must_use]
    pub fn did_run(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Run `body` at most once for (name, key), finalizing the ledger row on
/// every exit path.
///
/// Conflicts (already done, already in progress) are silent skips. A body
/// failure is recorded as `failure` with its error chain text, then
/// re-raised as [`Error::Execution`] so upstream dispatch logging sees it.
/// Storage errors propagate; a crash between `begin` and finalization
/// leaves the row in `processing` until a future run of the same key.
pub async fn run_once<F, Fut>(
    store: &dyn TaskRunStore,
    name: &str,
    key: &str,
    body: F,
) -> Result<GuardOutcome>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let run = match store.begin(name, key).await {
        Ok(run) => run,
        Err(Error::AlreadyCompleted { .. }) => {
            info!(name, key, "task already completed, skipping");
            return Ok(GuardOutcome::AlreadyCompleted);
        },
        Err(Error::AlreadyRunning { .. }) => {
            info!(name, key, "task already in progress, skipping");
            return Ok(GuardOutcome::AlreadyRunning);
        },
        Err(e) => return Err(e),
    };

    info!(name, key, "task started");

    match body().await {
        Ok(()) => {
            store.complete(&run).await?;
            info!(name, key, "task completed");
            Ok(GuardOutcome::Completed)
        },
        Err(e) => {
            // `{:#}` flattens the whole anyhow context chain into the row.
            let detail = format!("{e:#}");
            error!(name, key, error = %detail, "task failed");
            if let Err(store_err) = store.fail(&run, &detail).await {
                // The body failure takes precedence over the bookkeeping
                // failure; the row stays `processing` for manual recovery.
                error!(name, key, error = %store_err, "failed to record task failure");
            }
            Err(Error::Execution(e))
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        super::*,
        crate::{store_memory::InMemoryTaskRunStore, types::TaskStatus},
    };

    #[tokio::test]
    async fn test_runs_once_then_skips() {
        let store = InMemoryTaskRunStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let outcome = run_once(&store, "daily_scraper", "2024-01-01", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, GuardOutcome::Completed);
        assert!(outcome.did_run());

        let c = Arc::clone(&calls);
        let outcome = run_once(&store, "daily_scraper", "2024-01-01", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, GuardOutcome::AlreadyCompleted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let row = store.find("daily_scraper", "2024-01-01").await.unwrap();
        assert_eq!(row.unwrap().status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_failure_recorded_and_reraised() {
        let store = InMemoryTaskRunStore::new();

        let err = run_once(&store, "job", "k1", || async {
            Err(anyhow::anyhow!("network down"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert!(err.to_string().contains("network down"));

        let row = store.find("job", "k1").await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failure);
        assert!(row.last_error.unwrap().contains("network down"));
    }

    #[tokio::test]
    async fn test_failed_key_is_retryable() {
        let store = InMemoryTaskRunStore::new();

        let _ = run_once(&store, "job", "k1", || async {
            Err(anyhow::anyhow!("first attempt"))
        })
        .await;

        let outcome = run_once(&store, "job", "k1", || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome, GuardOutcome::Completed);

        let row = store.find("job", "k1").await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Success);
        assert!(row.last_error.is_none());
    }

    #[tokio::test]
    async fn test_leftover_processing_row_skips() {
        let store = InMemoryTaskRunStore::new();
        // Simulate a crashed process: begin without finalizing.
        store.begin("job", "k1").await.unwrap();

        let outcome = run_once(&store, "job", "k1", || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome, GuardOutcome::AlreadyRunning);
        assert!(!outcome.did_run());
    }

    #[tokio::test]
    async fn test_concurrent_guards_yield_single_winner() {
        let store = Arc::new(InMemoryTaskRunStore::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                run_once(&*store, "job", "k1", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // Hold the slot long enough for the others to collide.
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    Ok(())
                })
                .await
            }));
        }

        let outcomes: Vec<GuardOutcome> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let ran = outcomes.iter().filter(|o| o.did_run()).count();
        assert_eq!(ran, 1, "exactly one guard should win the slot");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
