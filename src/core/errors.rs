use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can stop a simulation run.
///
/// Input files are deliberately absent from this list: a missing or
/// unreadable input degrades to zero rows instead of failing.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("type mismatch: cannot {op} {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("unresolved reference {reference} in {instance}")]
    UnresolvedReference { instance: String, reference: String },

    #[error("scheduler invariant violated: {0}")]
    SchedulerInvariant(String),

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SimError {
    pub(crate) fn mismatch(op: &'static str, left: &'static str, right: &'static str) -> Self {
        SimError::TypeMismatch { op, left, right }
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        SimError::SchedulerInvariant(msg.into())
    }
}
