//! Core data types for the scheduler.

use serde::{Deserialize, Serialize};

/// Cron trigger fields, APScheduler-style. Unset fields mean `*`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct CronFields {
    pub minute: Option<String>,
    pub hour: Option<String>,
    pub day: Option<String>,
    pub month: Option<String>,
    pub day_of_week: Option<String>,
}

impl CronFields {
    /// Fire once a day at `hour:minute`.
    #[must_use]
    pub fn daily(hour: u32, minute: u32) -> Self {
        Self {
            minute: Some(minute.to_string()),
            hour: Some(hour.to_string()),
            ..Self::default()
        }
    }

    /// Render as a 5-field cron expression (min hour dom month dow).
    #[must_use]
    pub fn expr(&self) -> String {
        let field = |f: &Option<String>| f.clone().unwrap_or_else(|| "*".into());
        format!(
            "{} {} {} {} {}",
            field(&self.minute),
            field(&self.hour),
            field(&self.day),
            field(&self.month),
            field(&self.day_of_week),
        )
    }
}

/// When a job fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TriggerRule {
    /// One-shot: fire once at `run_at_ms` (epoch millis).
    Once { run_at_ms: u64 },
    /// Cron recurrence, evaluated in `tz` or the engine's default timezone.
    Cron {
        fields: CronFields,
        #[serde(skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

/// Outcome of a single fire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FireStatus {
    Ok,
    Error,
    Skipped,
}

impl FireStatus {
    /// Stable string form used in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_db(s: &str) -> crate::Result<Self> {
        match s {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            other => Err(crate::Error::CorruptStatus {
                status: other.into(),
            }),
        }
    }
}

/// Mutable runtime state of a trigger. Persisted with the definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_at_ms: Option<u64>,
    /// Set once a one-time trigger has fired; never cleared by
    /// re-registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fired_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fire_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<FireStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
}

/// A registered trigger, persisted across restarts keyed by `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub name: String,
    pub trigger: TriggerRule,
    pub max_instances: u32,
    pub misfire_grace_ms: u64,
    #[serde(default)]
    pub state: TriggerState,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// Record of one fire decision, stored in fire history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FireRecord {
    pub job_id: String,
    pub scheduled_for_ms: u64,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub status: FireStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Summary status of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub job_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire_at_ms: Option<u64>,
}
