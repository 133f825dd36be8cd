//! Session tokens and the refresh exchange
//!
//! The refresh exchange is a single `POST /sessions/refresh-token` carrying
//! the refresh token. The server answers with a brand new pair; the old
//! refresh token must not be reused afterwards.

use serde::{Deserialize, Serialize};
use transport::{RequestDescriptor, Transport};

use crate::constants::REFRESH_TOKEN_PATH;
use crate::error::{Error, Result};

/// The access/refresh token pair for the signed-in user.
///
/// Field names match both the refresh endpoint's response body and the
/// on-disk token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Access token sent as `Authorization: Bearer <token>`
    pub token: String,
    /// Refresh token exchanged for a new pair
    pub refresh_token: String,
}

impl SessionTokens {
    pub fn new(token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// The refresh token, unless it is empty.
    pub fn refresh_token(&self) -> Option<&str> {
        Some(self.refresh_token.as_str()).filter(|t| !t.is_empty())
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct MessageBody {
    message: Option<String>,
}

/// Exchange a refresh token for a new token pair.
///
/// Any non-2xx status is a rejection. The caller decides what a rejection
/// means for the session; this function has no side effects beyond the
/// single request.
pub async fn refresh_session(
    transport: &dyn Transport,
    refresh_token: &str,
) -> Result<SessionTokens> {
    let body = serde_json::to_value(RefreshRequest { refresh_token })
        .map_err(|e| Error::InvalidResponse(format!("encoding refresh request: {e}")))?;
    let request = RequestDescriptor::post(REFRESH_TOKEN_PATH, body);

    let response = transport
        .execute(&request)
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    if !response.is_success() {
        let message = response
            .json::<MessageBody>()
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| response.text());
        return Err(Error::RefreshRejected {
            status: response.status,
            message,
        });
    }

    let tokens: SessionTokens = response
        .json()
        .map_err(|e| Error::InvalidResponse(e.to_string()))?;
    if tokens.token.is_empty() {
        return Err(Error::InvalidResponse("empty access token".into()));
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use transport::{Response, TransportError};

    /// Answers every request with the same result and records what it saw.
    struct FixedTransport {
        reply: transport::Result<Response>,
        seen: Mutex<Vec<RequestDescriptor>>,
    }

    impl FixedTransport {
        fn new(reply: transport::Result<Response>) -> Self {
            Self {
                reply,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for FixedTransport {
        fn execute<'a>(
            &'a self,
            request: &'a RequestDescriptor,
        ) -> Pin<Box<dyn Future<Output = transport::Result<Response>> + Send + 'a>> {
            self.seen.lock().unwrap().push(request.clone());
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    #[test]
    fn tokens_deserialize_from_wire_shape() {
        let json = r#"{"token":"T2","refresh_token":"R2"}"#;
        let tokens: SessionTokens = serde_json::from_str(json).unwrap();
        assert_eq!(tokens, SessionTokens::new("T2", "R2"));
    }

    #[test]
    fn empty_refresh_token_counts_as_absent() {
        assert_eq!(SessionTokens::new("T1", "").refresh_token(), None);
        assert_eq!(SessionTokens::new("T1", "R1").refresh_token(), Some("R1"));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token_to_endpoint() {
        let transport = FixedTransport::new(Ok(Response::json_body(
            200,
            &json!({"token": "T2", "refresh_token": "R2"}),
        )));

        let tokens = refresh_session(&transport, "R1").await.unwrap();
        assert_eq!(tokens, SessionTokens::new("T2", "R2"));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method.as_str(), "POST");
        assert_eq!(seen[0].path, "/sessions/refresh-token");
        assert_eq!(seen[0].body, Some(json!({"refresh_token": "R1"})));
    }

    #[tokio::test]
    async fn non_success_status_is_rejection_with_server_message() {
        let transport = FixedTransport::new(Ok(Response::json_body(
            401,
            &json!({"message": "refresh token expired"}),
        )));

        match refresh_session(&transport, "R1").await {
            Err(Error::RefreshRejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "refresh token expired");
            }
            other => panic!("expected RefreshRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejection_without_json_body_keeps_raw_text() {
        let transport = FixedTransport::new(Ok(Response::new(502, "bad gateway")));

        match refresh_session(&transport, "R1").await {
            Err(Error::RefreshRejected { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("expected RefreshRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_http_error() {
        let transport =
            FixedTransport::new(Err(TransportError::Connect("connection refused".into())));

        let err = refresh_session(&transport, "R1").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_success_body_is_invalid_response() {
        let transport = FixedTransport::new(Ok(Response::json_body(200, &json!({"ok": true}))));

        let err = refresh_session(&transport, "R1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_access_token_is_invalid_response() {
        let transport = FixedTransport::new(Ok(Response::json_body(
            200,
            &json!({"token": "", "refresh_token": "R2"}),
        )));

        let err = refresh_session(&transport, "R1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)), "got {err:?}");
    }
}
