use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A `success` row already exists for this key. Normal skip path,
    /// not a failure.
    #[error("task '{name}' with key '{key}' already completed")]
    AlreadyCompleted { name: String, key: String },

    /// A `processing` row exists: either a concurrent caller holds the
    /// slot or a previous process crashed before finalizing.
    #[error("task '{name}' with key '{key}' is already in progress")]
    AlreadyRunning { name: String, key: String },

    /// Attempted transition on a row that is not in `processing`.
    #[error("task run {id} is not in processing state")]
    InvalidTransition { id: String },

    /// The wrapped job body failed; recorded to the ledger, then re-raised.
    #[error("{0}")]
    Execution(anyhow::Error),

    #[error("unknown task status in database: {status}")]
    CorruptStatus { status: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    #[must_use]
    pub fn already_completed(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyCompleted {
            name: name.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn already_running(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            name: name.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn corrupt_status(status: impl Into<String>) -> Self {
        Self::CorruptStatus {
            status: status.into(),
        }
    }

    /// Whether this error is a skip-path conflict rather than a real failure.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyCompleted { .. } | Self::AlreadyRunning { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
