//! Error types for the lifecycle backends and the image repository.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during VM lifecycle or image operations.
#[derive(Error, Debug)]
pub enum HypervisorError {
    /// Malformed or constraint-violating input, detected before any mutation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A VM or artifact with the same name already exists or is being written.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The targeted VM or image does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure talking to the virtualization control plane or a download source.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Local filesystem failure.
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The caller's cancellation token fired before the operation completed.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable classification of [`HypervisorError`] for transport status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    Conflict,
    NotFound,
    Upstream,
    Io,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl HypervisorError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HypervisorError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            HypervisorError::Conflict(_) => ErrorKind::Conflict,
            HypervisorError::NotFound(_) => ErrorKind::NotFound,
            HypervisorError::Upstream(_) => ErrorKind::Upstream,
            HypervisorError::Io { .. } => ErrorKind::Io,
            HypervisorError::Cancelled(_) => ErrorKind::Cancelled,
            HypervisorError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wrap an I/O error with a description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HypervisorError::Io {
            context: context.into(),
            source,
        }
    }

    /// Like [`HypervisorError::io`], but a missing path becomes `NotFound`.
    pub fn io_or_not_found(context: impl Into<String>, source: std::io::Error) -> Self {
        let context = context.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            HypervisorError::NotFound(format!("{}: {}", context, source))
        } else {
            HypervisorError::io(context, source)
        }
    }

    pub(crate) fn lock_poisoned() -> Self {
        HypervisorError::Internal("Lock poisoned".to_string())
    }
}

/// Fail with `Cancelled` if the token has already fired.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(HypervisorError::Cancelled(operation.to_string()));
    }
    Ok(())
}

/// Result type alias for lifecycle and image operations.
pub type Result<T> = std::result::Result<T, HypervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_maps_to_not_found() {
        let err = HypervisorError::io_or_not_found(
            "remove image",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = HypervisorError::io_or_not_found(
            "remove image",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("remove image"));
    }
}
