//! Built-in liveness heartbeat job.

use std::sync::Arc;

use tracing::info;

use {
    vigil_config::HeartbeatConfig,
    vigil_scheduler::{JobFn, JobSet, RecurringJobSpec, types::CronFields},
};

/// Recurring job that logs scheduler liveness on its cron schedule.
/// Returns an empty contribution when disabled.
pub fn job_set(config: &HeartbeatConfig) -> JobSet {
    if !config.enabled {
        return JobSet::default();
    }

    let target: JobFn = Arc::new(|| {
        Box::pin(async {
            info!("heartbeat: scheduler alive");
            Ok(())
        })
    });

    JobSet {
        one_off: vec![],
        recurring: vec![RecurringJobSpec {
            job_id: "heartbeat".into(),
            name: "Heartbeat".into(),
            fields: CronFields {
                minute: Some(config.minute.clone()),
                hour: Some(config.hour.clone()),
                ..CronFields::default()
            },
            timezone: None,
            target,
        }],
    }
}
