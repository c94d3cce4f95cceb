use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Two specs share a `job_id`. Raised at composition time instead of
    /// letting the later registration silently overwrite the earlier one.
    #[error("duplicate job id: {job_id}")]
    RegistrationConflict { job_id: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("invalid cron expression '{expr}': {detail}")]
    InvalidCron { expr: String, detail: String },

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("unknown fire status in database: {status}")]
    CorruptStatus { status: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    #[must_use]
    pub fn registration_conflict(job_id: impl Into<String>) -> Self {
        Self::RegistrationConflict {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
