//! Translation of backend RPC failures into the external error vocabulary.
//!
//! Backend failures arrive as a numeric gRPC status code plus a message.
//! The message often embeds a human-readable reformulation of the code
//! (`"6 ALREADY_EXISTS: Username taken"`); the translator strips that
//! prefix and keeps only the reason. A fixed table maps gRPC codes to
//! external HTTP statuses; unknown codes become 500 with the original
//! message preserved. Raw backend codes never leave the gateway.

use axum::http::StatusCode;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tonic::Status;

/// A backend RPC failure reduced to its stable parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFailure {
    /// gRPC status code as transmitted by the backend.
    pub code: i32,
    /// Human-readable message with any `<code> <NAME>:` prefix removed.
    pub message: String,
}

/// gRPC UNKNOWN, the fallback code for unparseable failures.
const CODE_UNKNOWN: i32 = 2;

impl RpcFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build a failure from a tonic status.
    ///
    /// Some backends double-encode the code into the message; the prefix
    /// is stripped here too so the external message stays clean.
    pub fn from_status(status: &Status) -> Self {
        let code = i32::from(status.code());
        match split_code_prefix(status.message()) {
            Some((_, reason)) => Self::new(code, reason),
            None => Self::new(code, status.message()),
        }
    }

    /// Parse a raw failure string of the form `"6 ALREADY_EXISTS: reason"`.
    ///
    /// A leading `"Error: "` is tolerated. Anything that does not match
    /// the format keeps the whole text as the message under UNKNOWN.
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.strip_prefix("Error:").map(str::trim).unwrap_or(raw);
        match split_code_prefix(cleaned) {
            Some((code, reason)) => Self::new(code, reason),
            None => Self::new(CODE_UNKNOWN, cleaned),
        }
    }

    /// Map the backend code to the external HTTP status.
    pub fn external_status(&self) -> StatusCode {
        match self.code {
            3 | 11 => StatusCode::BAD_REQUEST,          // INVALID_ARGUMENT, OUT_OF_RANGE
            4 => StatusCode::GATEWAY_TIMEOUT,           // DEADLINE_EXCEEDED
            5 => StatusCode::NOT_FOUND,                 // NOT_FOUND
            6 | 10 => StatusCode::CONFLICT,             // ALREADY_EXISTS, ABORTED
            7 => StatusCode::FORBIDDEN,                 // PERMISSION_DENIED
            8 => StatusCode::TOO_MANY_REQUESTS,         // RESOURCE_EXHAUSTED
            9 => StatusCode::PRECONDITION_FAILED,       // FAILED_PRECONDITION
            12 => StatusCode::NOT_IMPLEMENTED,          // UNIMPLEMENTED
            14 => StatusCode::SERVICE_UNAVAILABLE,      // UNAVAILABLE
            16 => StatusCode::UNAUTHORIZED,             // UNAUTHENTICATED
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Split `"6 ALREADY_EXISTS: reason"` into `(6, "reason")`.
fn split_code_prefix(msg: &str) -> Option<(i32, &str)> {
    let (digits, rest) = msg.split_once(' ')?;
    let code: i32 = digits.parse().ok()?;
    let (name, reason) = rest.split_once(':')?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        return None;
    }
    Some((code, reason.trim_start()))
}

/// External error response shape, identical for every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    pub path: String,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            message: message.into(),
            path: path.into(),
            timestamp: now_rfc3339(),
        }
    }
}

/// Current time as an RFC 3339 timestamp (UTC, second precision).
pub fn now_rfc3339() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let days_since_epoch = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = days_to_ymd(days_since_epoch as i64);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

/// Convert days since Unix epoch to year, month, day.
fn days_to_ymd(days: i64) -> (i32, u32, u32) {
    // Algorithm from http://howardhinnant.github.io/date_algorithms.html
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_already_exists() {
        let failure = RpcFailure::parse("6 ALREADY_EXISTS: Username taken");
        assert_eq!(failure.code, 6);
        assert_eq!(failure.message, "Username taken");
        assert_eq!(failure.external_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_parse_unauthenticated() {
        let failure = RpcFailure::parse("16 UNAUTHENTICATED: x");
        assert_eq!(failure.code, 16);
        assert_eq!(failure.message, "x");
        assert_eq!(failure.external_status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_parse_with_error_prefix() {
        let failure = RpcFailure::parse("Error: 14 UNAVAILABLE: connect refused");
        assert_eq!(failure.code, 14);
        assert_eq!(failure.message, "connect refused");
        assert_eq!(failure.external_status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unknown_code_maps_to_internal_with_message_preserved() {
        let failure = RpcFailure::parse("99 SOMETHING_NEW: strange failure");
        assert_eq!(failure.code, 99);
        assert_eq!(failure.message, "strange failure");
        assert_eq!(failure.external_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unparseable_message_kept_whole() {
        let failure = RpcFailure::parse("connection reset by peer");
        assert_eq!(failure.code, 2);
        assert_eq!(failure.message, "connection reset by peer");
        assert_eq!(failure.external_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_lowercase_name_is_not_a_prefix() {
        // "8 items: reason" must not be mistaken for a code prefix.
        let failure = RpcFailure::parse("8 items: missing");
        assert_eq!(failure.code, 2);
        assert_eq!(failure.message, "8 items: missing");
    }

    #[test]
    fn test_from_status_strips_embedded_prefix() {
        let status = Status::already_exists("6 ALREADY_EXISTS: Username taken");
        let failure = RpcFailure::from_status(&status);
        assert_eq!(failure.code, 6);
        assert_eq!(failure.message, "Username taken");
    }

    #[test]
    fn test_from_status_plain_message() {
        let status = Status::not_found("no such user");
        let failure = RpcFailure::from_status(&status);
        assert_eq!(failure.code, 5);
        assert_eq!(failure.message, "no such user");
        assert_eq!(failure.external_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_full_table() {
        let expect = [
            (1, StatusCode::INTERNAL_SERVER_ERROR),
            (2, StatusCode::INTERNAL_SERVER_ERROR),
            (3, StatusCode::BAD_REQUEST),
            (4, StatusCode::GATEWAY_TIMEOUT),
            (5, StatusCode::NOT_FOUND),
            (6, StatusCode::CONFLICT),
            (7, StatusCode::FORBIDDEN),
            (8, StatusCode::TOO_MANY_REQUESTS),
            (9, StatusCode::PRECONDITION_FAILED),
            (10, StatusCode::CONFLICT),
            (11, StatusCode::BAD_REQUEST),
            (12, StatusCode::NOT_IMPLEMENTED),
            (13, StatusCode::INTERNAL_SERVER_ERROR),
            (14, StatusCode::SERVICE_UNAVAILABLE),
            (15, StatusCode::INTERNAL_SERVER_ERROR),
            (16, StatusCode::UNAUTHORIZED),
        ];
        for (code, status) in expect {
            assert_eq!(RpcFailure::new(code, "m").external_status(), status);
        }
    }

    #[test]
    fn test_rfc3339_timestamp_shape() {
        let ts = now_rfc3339();
        assert_eq!(ts.len(), 20);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert!(ts.ends_with('Z'));
    }
}
