use thiserror::Error;

/// The core error taxonomy: validation, not-found, conflict, transient,
/// permanent, panic, and ownership-lost are all distinct because callers
/// (services, the worker pool, the coordinator) route each one differently.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: i64, found: i64 },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent job failure: {0}")]
    Permanent(String),

    #[error("job panicked: {0}")]
    Panic(String),

    #[error("ownership lost: job no longer held by this worker")]
    OwnershipLost,

    #[error("{context}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Wrap an underlying error with additional context while preserving the
    /// original as the source, rather than discarding it.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        CoreError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }
}
