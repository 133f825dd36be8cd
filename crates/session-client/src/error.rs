//! Error types surfaced to callers of the authenticated client

/// Domain error returned by `AuthClient::send`.
///
/// Errors are `Clone` because a single refresh failure is delivered to every
/// caller that was waiting on that refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Non-auth HTTP failure; carries the server's message or the fallback
    #[error("{0}")]
    Server(String),

    /// No response was received; carries the fallback message
    #[error("{0}")]
    Network(String),

    /// The server rejected the session and it could not be refreshed
    #[error("session rejected: {0}")]
    Unauthorized(String),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("token store error: {0}")]
    TokenStore(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Short label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Server(_) => "server_error",
            Error::Network(_) => "network_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::NoRefreshToken => "no_refresh_token",
            Error::RefreshFailed(_) => "refresh_failed",
            Error::TokenStore(_) => "token_store",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
