use thiserror::Error;

/// Queue-specific error types.
///
/// Submission calls either return the resulting command or fail with one of
/// these; no command is ever left in an ambiguous state.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Validation or configuration failure from the core types/resolvers
    #[error(transparent)]
    Core(#[from] gatelink_core::Error),

    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// No command with the given id exists
    #[error("Command not found: {0}")]
    NotFound(i64),

    /// The requested status change is not a legal state-machine transition
    #[error("Command {id} cannot leave status {status}")]
    InvalidTransition { id: i64, status: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
