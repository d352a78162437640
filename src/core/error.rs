//! Unified error type for the serving stack.
//!
//! Startup failures (`Io`, `Validation`, `Model`, `Registration`) are fatal:
//! the process never starts serving on top of a broken artifact set.
//! Request-path failures map onto HTTP statuses in `server`: client input
//! errors (`UnknownCategory`, `Prediction`) versus internal consistency
//! faults (`TaxonomyMismatch`).

use std::path::PathBuf;

pub type ServingResult<T> = Result<T, ServingError>;

#[derive(Debug)]
pub enum ServingError {
    /// Filesystem failure while reading an artifact.
    Io {
        operation: String,
        path: Option<PathBuf>,
        source: std::io::Error,
    },
    /// An artifact or config field did not have the expected shape/content.
    Validation {
        field: String,
        expected: String,
        actual: String,
    },
    /// Model loading or forward-pass failure.
    Model {
        operation: String,
        source: String,
    },
    /// Caller supplied a category that is not in the registry.
    UnknownCategory { category: String },
    /// Request-scoped inference failure (decode, preprocess, forward).
    Prediction {
        operation: String,
        message: String,
    },
    /// Predicted index has no label in the resolved taxonomy. Indicates
    /// misconfigured artifacts, not bad client input.
    TaxonomyMismatch {
        key: String,
        index: usize,
        len: usize,
    },
    /// The startup registration call to the category service failed.
    Registration {
        url: String,
        status: Option<u16>,
        message: String,
    },
}

impl ServingError {
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ServingError::Io {
            operation: operation.into(),
            path: Some(path.into()),
            source,
        }
    }

    pub fn model(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        ServingError::Model {
            operation: operation.into(),
            source: source.to_string(),
        }
    }

    pub fn prediction(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ServingError::Prediction {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// True for faults a client can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServingError::UnknownCategory { .. } | ServingError::Prediction { .. }
        )
    }
}

impl std::fmt::Display for ServingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServingError::Io { operation, path, source } => match path {
                Some(p) => write!(f, "I/O error during {} ({}): {}", operation, p.display(), source),
                None => write!(f, "I/O error during {}: {}", operation, source),
            },
            ServingError::Validation { field, expected, actual } => {
                write!(f, "invalid {}: expected {}, got {}", field, expected, actual)
            }
            ServingError::Model { operation, source } => {
                write!(f, "model error during {}: {}", operation, source)
            }
            ServingError::UnknownCategory { category } => {
                write!(f, "model type '{}' not found", category)
            }
            ServingError::Prediction { operation, message } => {
                write!(f, "Prediction error: {} failed: {}", operation, message)
            }
            ServingError::TaxonomyMismatch { key, index, len } => {
                write!(
                    f,
                    "taxonomy mismatch for '{}': predicted index {} out of range for {} labels",
                    key, index, len
                )
            }
            ServingError::Registration { url, status, message } => match status {
                Some(code) => write!(f, "registration at {} rejected with status {}: {}", url, code, message),
                None => write!(f, "registration at {} failed: {}", url, message),
            },
        }
    }
}

impl std::error::Error for ServingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServingError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
