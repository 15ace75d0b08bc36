//! Error types for stream sessions.

use thiserror::Error;

/// Errors that terminate a stream session.
///
/// Only transport-level problems and invalid configuration live here.
/// Malformed frames and unparseable tool arguments are absorbed by the
/// pipeline and never become a `SessionError`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Body read error: {0}")]
    Body(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Build a status error from a non-success response body.
    ///
    /// Upstream producers usually answer with `{"error": {"message": ...}}` or
    /// `{"error": "..."}`; the message is pulled out when present, otherwise the
    /// raw body is kept.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .map(|e| match e {
                ErrorDetail::Message { message } => message,
                ErrorDetail::Plain(s) => s,
            })
            .unwrap_or_else(|| body.trim().to_string());

        SessionError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message { message: String },
    Plain(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_error_extracts_nested_message() {
        let err = SessionError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"rate limited","type":"requests"}}"#,
        );
        match err {
            SessionError::Status { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_error_plain_string_and_raw_body() {
        let err = SessionError::from_status(StatusCode::BAD_REQUEST, r#"{"error":"bad input"}"#);
        assert_eq!(err.to_string(), "HTTP 400: bad input");

        let err = SessionError::from_status(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.to_string(), "HTTP 502: upstream down");
    }
}
