//! Error types for admission control
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Why an admission was refused.
///
/// Whenever `admit` returns one of these the call was not admitted and must not be sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmitError {
    /// The caller's context was canceled while waiting for a gate.
    #[error("admission canceled")]
    Canceled,
    /// The caller's deadline passed while waiting for a gate.
    #[error("admission deadline exceeded")]
    DeadlineExceeded,
    /// A pacing token would only become available after the caller's deadline.
    #[error("admission would wait {wait:?}, past the context deadline")]
    WouldExceedDeadline { wait: Duration },
    /// `admit` was called without a request path.
    #[error("admission requested for an empty path")]
    EmptyPath,
}

impl AdmitError {
    /// Check if this error comes from explicit cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Check if this error comes from the context deadline, reached or predicted
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::WouldExceedDeadline { .. })
    }
}

/// Error returned by [`AdmissionService`](crate::middleware::AdmissionService).
#[derive(Debug, Clone)]
pub enum ThrottleError<E> {
    /// The call was refused before reaching the inner service.
    Admission(AdmitError),
    /// The inner service failed after admission.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ThrottleError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admission(e) => write!(f, "request not admitted: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ThrottleError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Admission(e) => Some(e),
            Self::Inner(e) => Some(e),
        }
    }
}

impl<E> From<AdmitError> for ThrottleError<E> {
    fn from(err: AdmitError) -> Self {
        Self::Admission(err)
    }
}

impl<E> ThrottleError<E> {
    /// Check if the request was refused by the limiter
    pub fn is_admission(&self) -> bool {
        matches!(self, Self::Admission(_))
    }

    /// Borrow the admission error if present.
    pub fn admission(&self) -> Option<&AdmitError> {
        match self {
            Self::Admission(e) => Some(e),
            Self::Inner(_) => None,
        }
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Admission(_) => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Admission(_) => None,
        }
    }
}
