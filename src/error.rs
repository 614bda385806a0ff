use thiserror::Error;

/// Errors raised by the storage access layer.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A required environment variable is not defined
    #[error("Missing environment variable {0}")]
    MissingEnvironment(String),

    /// Failure reported by a storage backend (network, client, permission...)
    #[error("Issue occured using a {kind} storage: {detail}")]
    Backend { kind: String, detail: String },

    /// File or object does not exist
    #[error("File or object not found: {0}")]
    NotFound(String),

    /// Checksum recomputed on the destination differs from the expected one
    #[error("Invalid MD5 sum control for copy to {path} ({kind}): expected {expected}, got {actual}")]
    ChecksumMismatch {
        kind: String,
        path: String,
        expected: String,
        actual: String,
    },

    /// Operation not available for the storage type(s) involved
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Path cannot be split into container and object
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    /// Build a backend error from any displayable cause.
    pub fn backend(kind: impl ToString, detail: impl ToString) -> Self {
        StorageError::Backend {
            kind: kind.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Whether this error means the file or object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Errors raised when loading pyramids or extracting tiles.
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    /// Storage read or write issue
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Content does not respect the expected format
    #[error("Expected format {expected} to read '{subject}': {cause}")]
    Format {
        expected: String,
        subject: String,
        cause: String,
    },

    /// Required attribute absent from a descriptor
    #[error("Missing attribute {key} in '{path}'")]
    MissingAttribute { path: String, key: String },

    /// Unsupported pyramid format or slab geometry
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Level identifier unknown to the pyramid
    #[error("No level {0} in the pyramid")]
    UnknownLevel(String),

    /// Inconsistent pyramid definition or usage
    #[error("Invalid pyramid: {0}")]
    Invalid(String),
}

impl PyramidError {
    pub(crate) fn format(
        expected: impl Into<String>,
        subject: impl Into<String>,
        cause: impl ToString,
    ) -> Self {
        PyramidError::Format {
            expected: expected.into(),
            subject: subject.into(),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn missing(path: impl Into<String>, key: impl Into<String>) -> Self {
        PyramidError::MissingAttribute {
            path: path.into(),
            key: key.into(),
        }
    }
}
