use std::error::Error;
use std::fmt::{Display, Formatter};

use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FirestoreErrorCode {
    UnsupportedType,
    MalformedWireValue,
    InvalidFieldPath,
    InvalidArgument,
    Transport,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    PermissionDenied,
    Unauthenticated,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Contention,
    TransactionFailed,
    Internal,
}

impl FirestoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirestoreErrorCode::UnsupportedType => "firestore/unsupported-type",
            FirestoreErrorCode::MalformedWireValue => "firestore/malformed-wire-value",
            FirestoreErrorCode::InvalidFieldPath => "firestore/invalid-field-path",
            FirestoreErrorCode::InvalidArgument => "firestore/invalid-argument",
            FirestoreErrorCode::Transport => "firestore/transport",
            FirestoreErrorCode::NotFound => "firestore/not-found",
            FirestoreErrorCode::AlreadyExists => "firestore/already-exists",
            FirestoreErrorCode::FailedPrecondition => "firestore/failed-precondition",
            FirestoreErrorCode::PermissionDenied => "firestore/permission-denied",
            FirestoreErrorCode::Unauthenticated => "firestore/unauthenticated",
            FirestoreErrorCode::Unavailable => "firestore/unavailable",
            FirestoreErrorCode::DeadlineExceeded => "firestore/deadline-exceeded",
            FirestoreErrorCode::ResourceExhausted => "firestore/resource-exhausted",
            FirestoreErrorCode::Contention => "firestore/contention",
            FirestoreErrorCode::TransactionFailed => "firestore/transaction-failed",
            FirestoreErrorCode::Internal => "firestore/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FirestoreError {
    pub code: FirestoreErrorCode,
    message: String,
    http_status: Option<u16>,
    details: Option<JsonValue>,
}

impl FirestoreError {
    pub fn new(code: FirestoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: None,
            details: None,
        }
    }

    /// Attaches the HTTP status and parsed error body of the response that produced this error.
    pub fn with_response(mut self, status: u16, details: Option<JsonValue>) -> Self {
        self.http_status = Some(status);
        self.details = details;
        self
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the failed response, when the error came from the transport.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    /// Parsed JSON error body returned by the backend, if it sent one.
    pub fn details(&self) -> Option<&JsonValue> {
        self.details.as_ref()
    }

    pub fn is_transport(&self) -> bool {
        self.http_status.is_some()
    }

    /// True when the backend aborted the request because of conflicting writes.
    pub fn is_contention(&self) -> bool {
        self.code == FirestoreErrorCode::Contention
    }
}

impl Display for FirestoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{} ({}, HTTP {status})", self.message, self.code_str()),
            None => write!(f, "{} ({})", self.message, self.code_str()),
        }
    }
}

impl Error for FirestoreError {}

pub type FirestoreResult<T> = Result<T, FirestoreError>;

pub fn unsupported_type(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::UnsupportedType, message)
}

pub fn malformed_wire_value(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::MalformedWireValue, message)
}

pub fn invalid_field_path(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidFieldPath, message)
}

pub fn invalid_argument(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidArgument, message)
}

pub fn transport_error(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Transport, message)
}

pub fn internal_error(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::NotFound, message)
}

pub fn already_exists(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::AlreadyExists, message)
}

pub fn failed_precondition(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::FailedPrecondition, message)
}

pub fn permission_denied(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::PermissionDenied, message)
}

pub fn unauthenticated(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Unauthenticated, message)
}

pub fn unavailable(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Unavailable, message)
}

pub fn deadline_exceeded(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::DeadlineExceeded, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::ResourceExhausted, message)
}

pub fn contention(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Contention, message)
}

/// Wraps a non-retryable failure raised while a transaction attempt was talking to the backend.
///
/// The cause's HTTP status and error body are preserved.
pub fn transaction_failed(cause: FirestoreError) -> FirestoreError {
    FirestoreError {
        code: FirestoreErrorCode::TransactionFailed,
        message: format!("Transaction failed: {} ({})", cause.message, cause.code_str()),
        http_status: cause.http_status,
        details: cause.details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_includes_code_and_status() {
        let err = not_found("missing").with_response(404, Some(json!({"error": {}})));
        assert_eq!(err.to_string(), "missing (firestore/not-found, HTTP 404)");
        assert!(err.is_transport());
    }

    #[test]
    fn transaction_failed_keeps_response() {
        let cause = permission_denied("nope").with_response(403, Some(json!({"error": {"status": "PERMISSION_DENIED"}})));
        let err = transaction_failed(cause);
        assert_eq!(err.code, FirestoreErrorCode::TransactionFailed);
        assert_eq!(err.http_status(), Some(403));
        assert!(err.message().contains("firestore/permission-denied"));
    }
}
