//! Service error type.
//!
//! Every failure at the service boundary is a status code plus context.
//! We avoid `std::io::Error` for protocol logic; transports convert their
//! own failures into a [`ServiceError`] with an appropriate status.

use thiserror::Error;

use crate::status::StatusCode;

/// A failed service invocation.
///
/// Carries the OPC UA status code describing the failure and a
/// human-readable message for logs. Cloneable because the same failure
/// may be delivered to every waiter coalesced onto one in-flight
/// operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("service error {status}: {message}")]
pub struct ServiceError {
    /// Status code describing the failure.
    pub status: StatusCode,
    /// Human-readable context.
    pub message: String,
}

impl ServiceError {
    /// Construct an error from a status code and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Timeouts and rejected connection attempts are worth retrying
    /// against the same session. Security failures and session-invalid
    /// statuses are not - the session has to be recreated.
    pub fn is_transient(&self) -> bool {
        matches!(self.status, StatusCode::BAD_TIMEOUT | StatusCode::BAD_CONNECTION_REJECTED)
    }
}

/// Convert a bare status code into an error with no extra context.
impl From<StatusCode> for ServiceError {
    fn from(status: StatusCode) -> Self {
        Self { status, message: String::new() }
    }
}
