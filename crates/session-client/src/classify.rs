//! Failure classification for API responses
//!
//! Decides whether a failed exchange is an auth failure the refresh path can
//! fix, an auth failure it can't, or an ordinary server/network failure.
//! Only 401 responses whose `message` is `token.expired` or `token.invalid`
//! are refreshable.

use serde::Deserialize;
use session_auth::{TOKEN_EXPIRED, TOKEN_INVALID};
use transport::Response;

use crate::error::Error;

/// Category of a failed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// 401 with `message: "token.expired"`
    AuthTokenExpired,
    /// 401 with `message: "token.invalid"`
    AuthTokenInvalid,
    /// Any other 401
    AuthOther,
    /// Non-401 failure, with the server's message when it sent one
    ServerError(Option<String>),
    /// No response at all
    NetworkError,
}

impl FailureKind {
    /// Whether a token refresh can fix this failure.
    pub fn is_refreshable(&self) -> bool {
        matches!(
            self,
            FailureKind::AuthTokenExpired | FailureKind::AuthTokenInvalid
        )
    }

    /// Whether this is any kind of 401.
    pub fn is_auth(&self) -> bool {
        self.is_refreshable() || matches!(self, FailureKind::AuthOther)
    }

    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::AuthTokenExpired => "auth_token_expired",
            FailureKind::AuthTokenInvalid => "auth_token_invalid",
            FailureKind::AuthOther => "auth_other",
            FailureKind::ServerError(_) => "server_error",
            FailureKind::NetworkError => "network_error",
        }
    }
}

#[derive(Deserialize)]
struct FailureBody {
    message: Option<String>,
}

/// The `message` field of a JSON failure body, if any.
pub fn server_message(response: &Response) -> Option<String> {
    response
        .json::<FailureBody>()
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
}

/// Classify a failed exchange. `None` means no response was received.
///
/// Must only be called for failures; a 2xx response is classified as a
/// server error without message.
pub fn classify(response: Option<&Response>) -> FailureKind {
    let Some(response) = response else {
        return FailureKind::NetworkError;
    };
    let message = server_message(response);
    if response.status == 401 {
        return match message.as_deref() {
            Some(TOKEN_EXPIRED) => FailureKind::AuthTokenExpired,
            Some(TOKEN_INVALID) => FailureKind::AuthTokenInvalid,
            _ => FailureKind::AuthOther,
        };
    }
    FailureKind::ServerError(message)
}

/// Turn a failure the client will not recover from into the caller's error.
///
/// `fallback` is the user-facing message used whenever the server supplied
/// none.
pub(crate) fn surface(kind: FailureKind, response: Option<&Response>, fallback: &str) -> Error {
    match kind {
        FailureKind::AuthTokenExpired => Error::Unauthorized(TOKEN_EXPIRED.into()),
        FailureKind::AuthTokenInvalid => Error::Unauthorized(TOKEN_INVALID.into()),
        FailureKind::AuthOther => Error::Unauthorized(
            response
                .and_then(server_message)
                .unwrap_or_else(|| fallback.to_string()),
        ),
        FailureKind::ServerError(message) => {
            Error::Server(message.unwrap_or_else(|| fallback.to_string()))
        }
        FailureKind::NetworkError => Error::Network(fallback.to_string()),
    }
}
