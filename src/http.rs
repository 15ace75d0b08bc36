//! HTTP response handling for stream sessions.
//!
//! The caller builds, authenticates and sends the request. This module only
//! checks the response status and exposes the body as a byte stream.

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use tracing::warn;

use crate::error::SessionError;

/// Boxed body stream consumed by a session.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SessionError>> + Send>>;

/// Turn a response into a body stream, failing on a non-success status.
///
/// The error body is read and its message extracted, so callers get
/// `HTTP 429: rate limited` rather than a bare status code.
///
/// # Example
/// ```ignore
/// let response = client.post(url).json(&body).send().await?;
/// let body = body_stream(response).await?;
/// ```
pub async fn body_stream(response: reqwest::Response) -> Result<ByteStream, SessionError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "streaming request rejected");
        return Err(SessionError::from_status(status, &body));
    }

    Ok(Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SessionError::from)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_body_stream_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: [DONE]\n"),
            )
            .mount(&server)
            .await;

        let response = reqwest::Client::new()
            .post(format!("{}/v1/chat/completions", server.uri()))
            .send()
            .await
            .unwrap();

        let mut body = body_stream(response).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"data: [DONE]\n");
    }

    #[tokio::test]
    async fn test_body_stream_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(402).set_body_string(r#"{"error":"insufficient credits"}"#),
            )
            .mount(&server)
            .await;

        let response = reqwest::Client::new().post(server.uri()).send().await.unwrap();

        match body_stream(response).await {
            Err(SessionError::Status { status, message }) => {
                assert_eq!(status, 402);
                assert_eq!(message, "insufficient credits");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected a status error"),
        }
    }
}
