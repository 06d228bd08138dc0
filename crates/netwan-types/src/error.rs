use thiserror::Error;

/// Closed error taxonomy shared by every component of the decision pipeline.
///
/// Adapters, collectors, and the controller all report failures through this
/// type so the scheduler can apply one retry/backoff policy instead of each
/// component inventing its own.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("failed to parse {what}: {detail}")]
    ParseError { what: String, detail: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Transient errors are worth retrying with backoff; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientIo(_) | CoreError::AdapterUnavailable(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
