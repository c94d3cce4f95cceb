//! Declarative job catalog, assembled at startup.
//!
//! Each feature module contributes a [`JobSet`] (zero or more specs);
//! [`JobRegistry::compose`] concatenates the contributions in order. Pure
//! data; nothing registers itself as an import side effect.

use std::{collections::HashSet, sync::Arc};

use futures::future::BoxFuture;

use crate::{Error, Result, types::CronFields};

/// A zero-argument unit of work. Completes or raises; the engine never
/// retries a raise.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Specification for a one-time job. Immutable after registration.
#[derive(Clone)]
pub struct OneOffJobSpec {
    /// Unique trigger identity, also the persistence key.
    pub job_id: String,
    /// Human label and ledger name.
    pub name: String,
    /// Ledger key: (name, idempotency_key) executes at most once ever.
    pub idempotency_key: String,
    /// Fire instant; `None` fires immediately at registration.
    pub run_at_ms: Option<u64>,
    pub target: JobFn,
}

/// Specification for a recurring job. Immutable after registration.
#[derive(Clone)]
pub struct RecurringJobSpec {
    pub job_id: String,
    pub name: String,
    pub fields: CronFields,
    /// Timezone override; falls back to the engine default.
    pub timezone: Option<String>,
    pub target: JobFn,
}

/// One feature module's contribution to the registry.
#[derive(Clone, Default)]
pub struct JobSet {
    pub one_off: Vec<OneOffJobSpec>,
    pub recurring: Vec<RecurringJobSpec>,
}

/// The full catalog for one process, in contribution order.
#[derive(Clone, Default)]
pub struct JobRegistry {
    pub one_off: Vec<OneOffJobSpec>,
    pub recurring: Vec<RecurringJobSpec>,
}

impl JobRegistry {
    /// Concatenate per-feature contributions.
    ///
    /// Fails fast on a duplicate `job_id`, checked across both sequences:
    /// the engine keys triggers by `job_id` alone, so a silent
    /// last-registered-wins overwrite would mask a real bug.
    pub fn compose(sets: impl IntoIterator<Item = JobSet>) -> Result<Self> {
        let mut registry = Self::default();
        let mut seen: HashSet<String> = HashSet::new();

        for set in sets {
            for spec in set.one_off {
                if !seen.insert(spec.job_id.clone()) {
                    return Err(Error::registration_conflict(&spec.job_id));
                }
                registry.one_off.push(spec);
            }
            for spec in set.recurring {
                if !seen.insert(spec.job_id.clone()) {
                    return Err(Error::registration_conflict(&spec.job_id));
                }
                registry.recurring.push(spec);
            }
        }

        Ok(registry)
    }
}
