//! Core scheduler: timer loop, fire dispatch, trigger registration.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use {
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

use vigil_common::now_ms;

use crate::{
    Result,
    registry::{JobFn, JobRegistry, OneOffJobSpec, RecurringJobSpec},
    schedule::compute_next_fire,
    store::TriggerStore,
    types::{FireRecord, FireStatus, JobRecord, SchedulerStatus, TriggerRule, TriggerState},
};

/// Per-deployment dispatch defaults, applied to every registered job.
#[derive(Debug, Clone)]
pub struct EngineDefaults {
    /// IANA timezone cron fields are evaluated in, unless a spec
    /// overrides it.
    pub timezone: String,
    /// Max concurrent fires per job.
    pub max_instances: u32,
    /// A due fire older than this is skipped instead of run.
    pub misfire_grace_ms: u64,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            max_instances: 1,
            misfire_grace_ms: 300_000, // 5 minutes
        }
    }
}

/// Poll interval when no trigger has a pending fire.
const IDLE_POLL_MS: u64 = 60_000;

/// The scheduler engine.
///
/// Trigger records persist in the store; targets are plain closures and
/// live in memory for the process lifetime. A persisted record whose
/// target was not re-registered after a restart is left dormant.
pub struct SchedulerEngine {
    store: Arc<dyn TriggerStore>,
    defaults: EngineDefaults,
    jobs: RwLock<Vec<JobRecord>>,
    targets: RwLock<HashMap<String, JobFn>>,
    running_counts: StdMutex<HashMap<String, u32>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl SchedulerEngine {
    pub fn new(store: Arc<dyn TriggerStore>, defaults: EngineDefaults) -> Arc<Self> {
        Arc::new(Self {
            store,
            defaults,
            jobs: RwLock::new(Vec::new()),
            targets: RwLock::new(HashMap::new()),
            running_counts: StdMutex::new(HashMap::new()),
            timer_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    /// Register every job in the registry.
    pub async fn register_all(&self, registry: &JobRegistry) -> Result<()> {
        for spec in &registry.one_off {
            self.register_one_off(spec).await?;
        }
        for spec in &registry.recurring {
            self.register_recurring(spec).await?;
        }
        Ok(())
    }

    /// Register (or replace) a one-time job.
    ///
    /// Replace-existing: a persisted record that already fired keeps its
    /// history and is not re-armed. All-time at-most-once belongs to the
    /// ledger guard; this only keeps a restart from re-dispatching.
    pub async fn register_one_off(&self, spec: &OneOffJobSpec) -> Result<()> {
        let now = now_ms();
        let prior = self.store.get(&spec.job_id).await?;

        let trigger = TriggerRule::Once {
            run_at_ms: spec.run_at_ms.unwrap_or(now),
        };

        let mut state = prior
            .as_ref()
            .map(|p| p.state.clone())
            .unwrap_or_default();
        // A crash between claim and completion leaves running_at set.
        state.running_at_ms = None;
        state.next_fire_at_ms = if state.fired_at_ms.is_some() {
            None
        } else {
            compute_next_fire(&trigger, &self.defaults.timezone, now)?
        };

        let record = JobRecord {
            job_id: spec.job_id.clone(),
            name: spec.name.clone(),
            trigger,
            max_instances: self.defaults.max_instances,
            misfire_grace_ms: self.defaults.misfire_grace_ms,
            state,
            created_at_ms: prior.as_ref().map_or(now, |p| p.created_at_ms),
            updated_at_ms: now,
        };

        self.install(record, Arc::clone(&spec.target)).await?;
        info!(job_id = %spec.job_id, "one-off job registered");
        Ok(())
    }

    /// Register (or replace) a recurring job.
    ///
    /// Replace-existing: last-run stats survive, but the next fire is
    /// recomputed under the new definition.
    pub async fn register_recurring(&self, spec: &RecurringJobSpec) -> Result<()> {
        let now = now_ms();
        let prior = self.store.get(&spec.job_id).await?;

        let trigger = TriggerRule::Cron {
            fields: spec.fields.clone(),
            tz: spec.timezone.clone(),
        };

        let mut state = prior
            .as_ref()
            .map(|p| p.state.clone())
            .unwrap_or_default();
        state.running_at_ms = None;
        // Also validates the expression and timezone at registration time.
        state.next_fire_at_ms = compute_next_fire(&trigger, &self.defaults.timezone, now)?;

        let record = JobRecord {
            job_id: spec.job_id.clone(),
            name: spec.name.clone(),
            trigger,
            max_instances: self.defaults.max_instances,
            misfire_grace_ms: self.defaults.misfire_grace_ms,
            state,
            created_at_ms: prior.as_ref().map_or(now, |p| p.created_at_ms),
            updated_at_ms: now,
        };

        self.install(record, Arc::clone(&spec.target)).await?;
        info!(job_id = %spec.job_id, "recurring job registered");
        Ok(())
    }

    async fn install(&self, record: JobRecord, target: JobFn) -> Result<()> {
        self.store.upsert(&record).await?;

        {
            let mut targets = self.targets.write().await;
            targets.insert(record.job_id.clone(), target);
        }
        {
            let mut jobs = self.jobs.write().await;
            match jobs.iter_mut().find(|j| j.job_id == record.job_id) {
                Some(existing) => *existing = record,
                None => jobs.push(record),
            }
        }

        self.wake_notify.notify_one();
        Ok(())
    }

    /// Load persisted triggers and start the timer loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let loaded = self.store.load_all().await?;
        info!(count = loaded.len(), "loaded scheduler jobs");

        let targets = self.targets.read().await;
        let mut jobs = self.jobs.write().await;
        for mut record in loaded {
            if !targets.contains_key(&record.job_id) {
                // Persisted trigger with no target this process knows.
                warn!(job_id = %record.job_id, "no target registered, leaving dormant");
                record.state.next_fire_at_ms = None;
            }
            match jobs.iter_mut().find(|j| j.job_id == record.job_id) {
                Some(existing) => *existing = record,
                None => jobs.push(record),
            }
        }
        drop(jobs);
        drop(targets);

        *self.running.write().await = true;

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.timer_loop().await;
        });

        *self.timer_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the timer loop. In-flight job bodies are not cancelled.
    pub async fn shutdown(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        let mut handle = self.timer_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        info!("scheduler stopped");
    }

    /// All registered triggers.
    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.read().await.clone()
    }

    /// Fire history for one trigger.
    pub async fn fires(&self, job_id: &str, limit: usize) -> Result<Vec<FireRecord>> {
        let known = {
            let jobs = self.jobs.read().await;
            jobs.iter().any(|j| j.job_id == job_id)
        };
        if !known {
            return Err(crate::Error::job_not_found(job_id));
        }
        self.store.fires(job_id, limit).await
    }

    /// Engine summary.
    pub async fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.read().await;
        let running = *self.running.read().await;
        SchedulerStatus {
            running,
            job_count: jobs.len(),
            next_fire_at_ms: jobs.iter().filter_map(|j| j.state.next_fire_at_ms).min(),
        }
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_wake().await;

            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        debug!("timer loop woken by notify");
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            if !self.process_due_at(now_ms()).await {
                // Storage is failing; hold at the idle cadence instead of
                // spinning on a still-due trigger.
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(IDLE_POLL_MS)) => {},
                    () = notify.notified() => {},
                }
            }
        }
    }

    async fn ms_until_next_wake(&self) -> u64 {
        let jobs = self.jobs.read().await;
        let now = now_ms();
        jobs.iter()
            .filter_map(|j| j.state.next_fire_at_ms)
            .map(|t| t.saturating_sub(now))
            .min()
            .unwrap_or(IDLE_POLL_MS)
    }

    /// One dispatch pass over every trigger due at `now`. Returns `false`
    /// when the store failed and the caller should back off before retrying.
    async fn process_due_at(self: &Arc<Self>, now: u64) -> bool {
        let mut store_ok = true;
        let due: Vec<JobRecord> = {
            let jobs = self.jobs.read().await;
            jobs.iter()
                .filter(|j| j.state.next_fire_at_ms.is_some_and(|t| t <= now))
                .cloned()
                .collect()
        };

        for job in due {
            let Some(scheduled_for) = job.state.next_fire_at_ms else {
                continue;
            };

            let target = {
                let targets = self.targets.read().await;
                targets.get(&job.job_id).cloned()
            };
            let Some(target) = target else {
                // Dormant record; should not carry a schedule.
                continue;
            };

            // The claim is the only gate: whoever wins it owns this fire,
            // whether the outcome is a run or a recorded skip.
            let claimed = match self.store.claim(&job.job_id, scheduled_for, now).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(job_id = %job.job_id, error = %e, "claim failed");
                    store_ok = false;
                    continue;
                },
            };
            if !claimed {
                debug!(job_id = %job.job_id, scheduled_for, "fire already claimed");
                self.refresh_from_store(&job.job_id).await;
                continue;
            }

            let next_after = self.next_after(&job, now);

            if now.saturating_sub(scheduled_for) > job.misfire_grace_ms {
                let missed_by = now - scheduled_for;
                warn!(job_id = %job.job_id, missed_by_ms = missed_by, "misfire, skipping");
                self.record_skip(
                    &job,
                    scheduled_for,
                    now,
                    format!("misfire: missed by {missed_by}ms"),
                    next_after,
                )
                .await;
                continue;
            }

            let over_limit = {
                let counts = self
                    .running_counts
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                counts.get(&job.job_id).copied().unwrap_or(0) >= job.max_instances
            };
            if over_limit {
                warn!(job_id = %job.job_id, max_instances = job.max_instances, "instance limit reached, skipping");
                self.record_skip(
                    &job,
                    scheduled_for,
                    now,
                    format!("skipped: {} instance(s) already running", job.max_instances),
                    next_after,
                )
                .await;
                continue;
            }

            {
                let mut counts = self
                    .running_counts
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                *counts.entry(job.job_id.clone()).or_insert(0) += 1;
            }
            self.persist_state(&job.job_id, |state| {
                state.running_at_ms = Some(now);
                state.next_fire_at_ms = next_after;
            })
            .await;

            let engine = Arc::clone(self);
            tokio::spawn(async move {
                engine.execute_fire(&job, scheduled_for, target).await;
            });
        }

        store_ok
    }

    async fn execute_fire(self: &Arc<Self>, job: &JobRecord, scheduled_for: u64, target: JobFn) {
        let started = now_ms();
        info!(job_id = %job.job_id, name = %job.name, "executing job");

        let result = target().await;

        let finished = now_ms();
        let duration_ms = finished.saturating_sub(started);
        let (status, error_text) = match &result {
            Ok(()) => (FireStatus::Ok, None),
            Err(e) => {
                error!(job_id = %job.job_id, error = %format!("{e:#}"), "job failed");
                (FireStatus::Error, Some(format!("{e:#}")))
            },
        };

        let fire = FireRecord {
            job_id: job.job_id.clone(),
            scheduled_for_ms: scheduled_for,
            started_at_ms: started,
            finished_at_ms: finished,
            status,
            error: error_text.clone(),
            duration_ms,
        };
        if let Err(e) = self.store.append_fire(&fire).await {
            warn!(job_id = %job.job_id, error = %e, "failed to record fire");
        }

        {
            let mut counts = self
                .running_counts
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(count) = counts.get_mut(&job.job_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&job.job_id);
                }
            }
        }

        let next_after = self.next_after(job, now_ms());
        let is_once = matches!(job.trigger, TriggerRule::Once { .. });
        self.persist_state(&job.job_id, |state| {
            state.running_at_ms = None;
            state.last_fire_at_ms = Some(finished);
            state.last_status = Some(status);
            state.last_error = error_text;
            state.last_duration_ms = Some(duration_ms);
            state.next_fire_at_ms = next_after;
            if is_once {
                state.fired_at_ms = Some(finished);
            }
        })
        .await;

        self.wake_notify.notify_one();
        info!(job_id = %job.job_id, status = ?status, duration_ms, "job finished");
    }

    /// Schedule after the fire decided at `now`: `Once` is spent, cron
    /// rolls forward.
    fn next_after(&self, job: &JobRecord, now: u64) -> Option<u64> {
        match &job.trigger {
            TriggerRule::Once { .. } => None,
            TriggerRule::Cron { .. } => {
                compute_next_fire(&job.trigger, &self.defaults.timezone, now).unwrap_or_else(|e| {
                    // Validated at registration; only a removed timezone
                    // database entry could get here.
                    error!(job_id = %job.job_id, error = %e, "next fire computation failed");
                    None
                })
            },
        }
    }

    async fn record_skip(
        &self,
        job: &JobRecord,
        scheduled_for: u64,
        now: u64,
        reason: String,
        next_after: Option<u64>,
    ) {
        let fire = FireRecord {
            job_id: job.job_id.clone(),
            scheduled_for_ms: scheduled_for,
            started_at_ms: now,
            finished_at_ms: now,
            status: FireStatus::Skipped,
            error: Some(reason.clone()),
            duration_ms: 0,
        };
        if let Err(e) = self.store.append_fire(&fire).await {
            warn!(job_id = %job.job_id, error = %e, "failed to record skip");
        }

        self.persist_state(&job.job_id, |state| {
            state.running_at_ms = None;
            state.last_status = Some(FireStatus::Skipped);
            state.last_error = Some(reason);
            state.next_fire_at_ms = next_after;
        })
        .await;
    }

    /// Apply `f` to the in-memory record and persist the result.
    async fn persist_state<F: FnOnce(&mut TriggerState)>(&self, job_id: &str, f: F) {
        let updated = self.mutate_job(job_id, |job| f(&mut job.state)).await;
        if let Some(record) = updated
            && let Err(e) = self.store.upsert(&record).await
        {
            warn!(job_id, error = %e, "failed to persist job state");
        }
    }

    async fn mutate_job<F: FnOnce(&mut JobRecord)>(&self, job_id: &str, f: F) -> Option<JobRecord> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.iter_mut().find(|j| j.job_id == job_id)?;
        f(job);
        job.updated_at_ms = now_ms();
        Some(job.clone())
    }

    /// Re-read one record after losing a claim race.
    async fn refresh_from_store(&self, job_id: &str) {
        match self.store.get(job_id).await {
            Ok(Some(record)) => {
                let mut jobs = self.jobs.write().await;
                if let Some(existing) = jobs.iter_mut().find(|j| j.job_id == job_id) {
                    *existing = record;
                }
            },
            Ok(None) => {},
            Err(e) => warn!(job_id, error = %e, "failed to refresh job"),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        super::*,
        crate::{
            registry::{OneOffJobSpec, RecurringJobSpec},
            store_memory::InMemoryTriggerStore,
            types::CronFields,
        },
    };

    fn counting_target(counter: Arc<AtomicUsize>) -> JobFn {
        Arc::new(move || {
            let c = Arc::clone(&counter);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_target() -> JobFn {
        Arc::new(|| Box::pin(async { Err(anyhow::anyhow!("upstream timeout")) }))
    }

    fn slow_target(counter: Arc<AtomicUsize>, hold_ms: u64) -> JobFn {
        Arc::new(move || {
            let c = Arc::clone(&counter);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                Ok(())
            })
        })
    }

    fn one_off(job_id: &str, run_at_ms: Option<u64>, target: JobFn) -> OneOffJobSpec {
        OneOffJobSpec {
            job_id: job_id.into(),
            name: job_id.into(),
            idempotency_key: "v1".into(),
            run_at_ms,
            target,
        }
    }

    fn recurring(job_id: &str, fields: CronFields, target: JobFn) -> RecurringJobSpec {
        RecurringJobSpec {
            job_id: job_id.into(),
            name: job_id.into(),
            fields,
            timezone: None,
            target,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Force a cron job due at `now` in both the in-memory view and the
    /// store mirror.
    async fn force_due(engine: &Arc<SchedulerEngine>, job_id: &str, now: u64) {
        let record = engine
            .mutate_job(job_id, |j| j.state.next_fire_at_ms = Some(now))
            .await
            .unwrap();
        engine.store.upsert(&record).await.unwrap();
    }

    /// Delegates everything but `claim`, which fails like a dropped pool.
    struct ClaimOutageStore {
        inner: InMemoryTriggerStore,
    }

    #[async_trait::async_trait]
    impl TriggerStore for ClaimOutageStore {
        async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
            self.inner.get(job_id).await
        }

        async fn load_all(&self) -> Result<Vec<JobRecord>> {
            self.inner.load_all().await
        }

        async fn upsert(&self, record: &JobRecord) -> Result<()> {
            self.inner.upsert(record).await
        }

        async fn claim(&self, _job_id: &str, _scheduled_for_ms: u64, _now_ms: u64) -> Result<bool> {
            Err(sqlx::Error::PoolClosed.into())
        }

        async fn append_fire(&self, fire: &FireRecord) -> Result<()> {
            self.inner.append_fire(fire).await
        }

        async fn fires(&self, job_id: &str, limit: usize) -> Result<Vec<FireRecord>> {
            self.inner.fires(job_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_claim_error_reports_backoff_and_keeps_schedule() {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(ClaimOutageStore {
            inner: InMemoryTriggerStore::new(),
        });
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        engine
            .register_one_off(&one_off("import", None, counting_target(counter.clone())))
            .await
            .unwrap();

        let store_ok = engine.process_due_at(now_ms()).await;
        settle().await;

        assert!(!store_ok);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        // The trigger stays armed for the retry after the backoff.
        let job = engine.jobs().await.into_iter().next().unwrap();
        assert!(job.state.next_fire_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_one_off_fires_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        engine
            .register_one_off(&one_off("import", None, counting_target(counter.clone())))
            .await
            .unwrap();

        engine.process_due_at(now_ms()).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let job = engine.jobs().await.into_iter().next().unwrap();
        assert!(job.state.fired_at_ms.is_some());
        assert_eq!(job.state.next_fire_at_ms, None);
        assert_eq!(job.state.last_status, Some(FireStatus::Ok));

        // A second pass finds nothing due.
        engine.process_due_at(now_ms()).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_does_not_refire_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryTriggerStore::new());

        let engine = SchedulerEngine::new(store.clone(), EngineDefaults::default());
        engine
            .register_one_off(&one_off("import", None, counting_target(counter.clone())))
            .await
            .unwrap();
        engine.process_due_at(now_ms()).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        drop(engine);

        // Same process image restarting against the same store.
        let engine = SchedulerEngine::new(store, EngineDefaults::default());
        engine
            .register_one_off(&one_off("import", None, counting_target(counter.clone())))
            .await
            .unwrap();

        let job = engine.jobs().await.into_iter().next().unwrap();
        assert_eq!(job.state.next_fire_at_ms, None);
        assert!(job.state.fired_at_ms.is_some());

        engine.process_due_at(now_ms()).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replace_recomputes_cron_next() {
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());
        let noop: JobFn = Arc::new(|| Box::pin(async { Ok(()) }));

        engine
            .register_recurring(&recurring(
                "scrape",
                CronFields::daily(3, 0),
                Arc::clone(&noop),
            ))
            .await
            .unwrap();
        let first = engine.jobs().await[0].state.next_fire_at_ms.unwrap();

        engine
            .register_recurring(&recurring("scrape", CronFields::daily(4, 0), noop))
            .await
            .unwrap();
        let jobs = engine.jobs().await;
        assert_eq!(jobs.len(), 1);
        let second = jobs[0].state.next_fire_at_ms.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_misfire_is_skipped_and_recorded() {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        let now = now_ms();
        // Due an hour ago, far past the 5 minute grace.
        engine
            .register_one_off(&one_off(
                "stale",
                Some(now - 3_600_000),
                counting_target(counter.clone()),
            ))
            .await
            .unwrap();

        engine.process_due_at(now).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let fires = engine.fires("stale", 10).await.unwrap();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].status, FireStatus::Skipped);
        assert!(fires[0].error.as_deref().unwrap().contains("misfire"));

        let job = engine.jobs().await.into_iter().next().unwrap();
        assert_eq!(job.state.next_fire_at_ms, None);
        // Skipped is not fired: the ledger key stays unspent.
        assert!(job.state.fired_at_ms.is_none());
    }

    #[tokio::test]
    async fn test_within_grace_still_fires() {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        let now = now_ms();
        // One minute late, inside the 5 minute grace.
        engine
            .register_one_off(&one_off(
                "late",
                Some(now - 60_000),
                counting_target(counter.clone()),
            ))
            .await
            .unwrap();

        engine.process_due_at(now).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_misfire_boundary_is_exclusive() {
        let late = Arc::new(AtomicUsize::new(0));
        let ok = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        let now = now_ms();
        let grace = EngineDefaults::default().misfire_grace_ms;
        engine
            .register_one_off(&one_off(
                "edge_late",
                Some(now - grace - 1),
                counting_target(late.clone()),
            ))
            .await
            .unwrap();
        engine
            .register_one_off(&one_off(
                "edge_ok",
                Some(now - grace + 1),
                counting_target(ok.clone()),
            ))
            .await
            .unwrap();

        engine.process_due_at(now).await;
        settle().await;

        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(ok.load(Ordering::SeqCst), 1);
        let fires = engine.fires("edge_late", 10).await.unwrap();
        assert_eq!(fires[0].status, FireStatus::Skipped);
    }

    #[tokio::test]
    async fn test_max_instances_skips_overlap() {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        engine
            .register_recurring(&recurring(
                "slow",
                CronFields::daily(3, 0),
                slow_target(counter.clone(), 500),
            ))
            .await
            .unwrap();

        let now = now_ms();
        force_due(&engine, "slow", now).await;
        engine.process_due_at(now).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Due again while the first instance is still holding.
        force_due(&engine, "slow", now + 60_000).await;
        engine.process_due_at(now + 60_000).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let fires = engine.fires("slow", 10).await.unwrap();
        let skipped: Vec<_> = fires
            .iter()
            .filter(|f| f.status == FireStatus::Skipped)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(
            skipped[0]
                .error
                .as_deref()
                .unwrap()
                .contains("already running")
        );
    }

    #[tokio::test]
    async fn test_failing_body_records_error_and_reschedules() {
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        engine
            .register_recurring(&recurring(
                "flaky",
                CronFields::daily(3, 0),
                failing_target(),
            ))
            .await
            .unwrap();

        let now = now_ms();
        force_due(&engine, "flaky", now).await;
        engine.process_due_at(now).await;
        settle().await;

        let job = engine.jobs().await.into_iter().next().unwrap();
        assert_eq!(job.state.last_status, Some(FireStatus::Error));
        assert!(
            job.state
                .last_error
                .as_deref()
                .unwrap()
                .contains("upstream timeout")
        );
        // Schedule keeps rolling after a failure.
        assert!(job.state.next_fire_at_ms.is_some());

        let fires = engine.fires("flaky", 10).await.unwrap();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].status, FireStatus::Error);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        assert!(!engine.status().await.running);
        engine.start().await.unwrap();
        assert!(engine.status().await.running);
        engine.shutdown().await;
        assert!(!engine.status().await.running);
    }

    #[tokio::test]
    async fn test_timer_loop_fires_due_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());

        engine.start().await.unwrap();
        // Registering after start wakes the loop via notify.
        engine
            .register_one_off(&one_off("live", None, counting_target(counter.clone())))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("due one-off did not fire in time");

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_orphan_record_left_dormant() {
        let store = Arc::new(InMemoryTriggerStore::new());
        let now = now_ms();
        store
            .upsert(&JobRecord {
                job_id: "ghost".into(),
                name: "ghost".into(),
                trigger: TriggerRule::Once { run_at_ms: now },
                max_instances: 1,
                misfire_grace_ms: 300_000,
                state: TriggerState {
                    next_fire_at_ms: Some(now),
                    ..TriggerState::default()
                },
                created_at_ms: now,
                updated_at_ms: now,
            })
            .await
            .unwrap();

        let engine = SchedulerEngine::new(store, EngineDefaults::default());
        engine.start().await.unwrap();

        let jobs = engine.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state.next_fire_at_ms, None);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_fires_unknown_job_errors() {
        let store = Arc::new(InMemoryTriggerStore::new());
        let engine = SchedulerEngine::new(store, EngineDefaults::default());
        assert!(matches!(
            engine.fires("missing", 5).await.unwrap_err(),
            crate::Error::JobNotFound { .. }
        ));
    }
}
