//! Config schema types (server, database, scheduler, heartbeat).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub heartbeat: HeartbeatConfig,
}

/// HTTP status API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8600,
        }
    }
}

/// Storage for the execution ledger and trigger state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection string. Both the task-run ledger and the
    /// scheduler's trigger store live in this database.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/vigil.db?mode=rwc".into(),
        }
    }
}

/// Scheduler engine defaults, applied to every registered trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// IANA timezone for cron triggers without an explicit override.
    pub timezone: String,
    /// Max concurrent invocations of one trigger. Defaults to 1.
    pub max_instances: u32,
    /// Fires missed by more than this many seconds are skipped.
    pub misfire_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            max_instances: 1,
            misfire_grace_secs: 300,
        }
    }
}

/// Built-in liveness heartbeat job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Whether the heartbeat job is registered. Defaults to true.
    pub enabled: bool,
    /// Cron minute field. Defaults to "*/30".
    pub minute: String,
    /// Cron hour field. Defaults to "*".
    pub hour: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minute: "*/30".into(),
            hour: "*".into(),
        }
    }
}
