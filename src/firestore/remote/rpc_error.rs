use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::firestore::error::{
    already_exists, contention, deadline_exceeded, failed_precondition, internal_error,
    invalid_argument, not_found, permission_denied, resource_exhausted, transport_error,
    unauthenticated, unavailable, FirestoreError,
};

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Maps a non-2xx response to a [`FirestoreError`].
///
/// The canonical `error.status` of the Google error payload wins over the HTTP
/// status. The returned error carries the status and the parsed body.
pub fn map_http_error(status: StatusCode, body: &str) -> FirestoreError {
    let details = serde_json::from_str::<JsonValue>(body).ok();
    let payload = extract_error_payload(body);
    let message = payload
        .as_ref()
        .and_then(|payload| payload.message.clone())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("HTTP error").to_string());

    let error = match payload.as_ref().and_then(|payload| payload.status.as_deref()) {
        Some(status_string) => map_status_code(status_string, message),
        None => map_status(status, message),
    };
    error.with_response(status.as_u16(), details)
}

fn map_status(status: StatusCode, message: String) -> FirestoreError {
    match status {
        StatusCode::BAD_REQUEST => invalid_argument(message),
        StatusCode::UNAUTHORIZED => unauthenticated(message),
        StatusCode::FORBIDDEN => permission_denied(message),
        StatusCode::NOT_FOUND => not_found(message),
        StatusCode::CONFLICT => contention(message),
        StatusCode::PRECONDITION_FAILED => failed_precondition(message),
        StatusCode::TOO_MANY_REQUESTS => resource_exhausted(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => deadline_exceeded(message),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => unavailable(message),
        StatusCode::INTERNAL_SERVER_ERROR => internal_error(message),
        status if status.is_client_error() => invalid_argument(message),
        status if status.is_server_error() => internal_error(message),
        _ => transport_error(message),
    }
}

fn map_status_code(status: &str, message: String) -> FirestoreError {
    match status {
        "INVALID_ARGUMENT" | "OUT_OF_RANGE" => invalid_argument(message),
        "FAILED_PRECONDITION" => failed_precondition(message),
        "UNAUTHENTICATED" => unauthenticated(message),
        "PERMISSION_DENIED" => permission_denied(message),
        "NOT_FOUND" => not_found(message),
        "ALREADY_EXISTS" => already_exists(message),
        "ABORTED" => contention(message),
        "RESOURCE_EXHAUSTED" => resource_exhausted(message),
        "UNAVAILABLE" => unavailable(message),
        "DEADLINE_EXCEEDED" => deadline_exceeded(message),
        "CANCELLED" | "DATA_LOSS" | "UNKNOWN" | "INTERNAL" => internal_error(message),
        other => transport_error(format!("{message} (unhandled status {other})")),
    }
}

fn extract_error_payload(body: &str) -> Option<GoogleError> {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreErrorCode;

    #[test]
    fn payload_status_wins_over_http_status() {
        let body = r#"{"error":{"code":409,"message":"Transaction lock timeout.","status":"ABORTED"}}"#;
        let err = map_http_error(StatusCode::CONFLICT, body);
        assert_eq!(err.code, FirestoreErrorCode::Contention);
        assert_eq!(err.message(), "Transaction lock timeout.");
        assert_eq!(err.http_status(), Some(409));
        assert_eq!(err.details().unwrap()["error"]["status"], "ABORTED");

        let body = r#"{"error":{"message":"exists","status":"ALREADY_EXISTS"}}"#;
        let err = map_http_error(StatusCode::CONFLICT, body);
        assert_eq!(err.code, FirestoreErrorCode::AlreadyExists);
    }

    #[test]
    fn falls_back_on_http_status() {
        let err = map_http_error(StatusCode::CONFLICT, "");
        assert_eq!(err.code, FirestoreErrorCode::Contention);
        assert_eq!(err.message(), "Conflict");
        assert!(err.details().is_none());

        let err = map_http_error(StatusCode::SERVICE_UNAVAILABLE, "<html>down</html>");
        assert_eq!(err.code, FirestoreErrorCode::Unavailable);
        assert!(err.is_transport());
    }
}
