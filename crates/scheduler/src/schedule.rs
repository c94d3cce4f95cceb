//! Next-fire computation for trigger rules.

use {
    chrono::DateTime,
    cron::Schedule,
};

use crate::{
    Error, Result,
    types::{CronFields, TriggerRule},
};

/// Compute the next fire time (epoch millis) for a rule.
///
/// `Once` rules return their instant verbatim while unfired: whether a
/// past instant still runs is a dispatch decision (misfire grace), and the
/// engine clears the schedule after the fire. Cron rules return the first
/// occurrence strictly after `now_ms`, or `None` if the expression has no
/// future occurrences.
pub fn compute_next_fire(
    rule: &TriggerRule,
    default_tz: &str,
    now_ms: u64,
) -> Result<Option<u64>> {
    match rule {
        TriggerRule::Once { run_at_ms } => Ok(Some(*run_at_ms)),
        TriggerRule::Cron { fields, tz } => {
            let schedule = parse_fields(fields)?;
            let tz = resolve_timezone(tz.as_deref().unwrap_or(default_tz))?;

            // Epoch fallback only on a clock far before 1970.
            let now_dt = DateTime::from_timestamp_millis(now_ms as i64).unwrap_or_default();
            let now_local = now_dt.with_timezone(&tz);

            Ok(schedule
                .after(&now_local)
                .next()
                .map(|dt| dt.timestamp_millis() as u64))
        },
    }
}

/// Parse cron fields into a schedule.
///
/// The `cron` crate requires 7 fields (sec min hour dom month dow year);
/// our fields render 5, so pad with "0" seconds and "*" year.
pub fn parse_fields(fields: &CronFields) -> Result<Schedule> {
    let expr = fields.expr();
    let padded = format!("0 {expr} *");
    padded.parse::<Schedule>().map_err(|e| Error::InvalidCron {
        expr,
        detail: e.to_string(),
    })
}

/// Resolve an IANA timezone name.
pub fn resolve_timezone(name: &str) -> Result<chrono_tz::Tz> {
    name.parse().map_err(|_| Error::unknown_timezone(name))
}
