use thiserror::Error;

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Errors raised while rewriting an async function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A construct the rewrite cannot express as a promise chain.
    ///
    /// Only surfaced with `TransformOptions::strict`; otherwise the construct
    /// is left untouched and a warning is logged.
    #[error("unsupported construct in {function}: {construct}")]
    Unsupported { function: String, construct: String },

    /// The tree violates an invariant an earlier pass should have
    /// established. Always a bug in the pipeline.
    #[error("malformed tree: {message}")]
    Malformed { message: String },
}

impl TransformError {
    pub fn unsupported(function: impl Into<String>, construct: impl Into<String>) -> Self {
        TransformError::Unsupported {
            function: function.into(),
            construct: construct.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        TransformError::Malformed {
            message: message.into(),
        }
    }
}
