//! Error types for session token operations

/// Errors from token storage and the refresh exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("refresh rejected ({status}): {message}")]
    RefreshRejected { status: u16, message: String },

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("token file parse error: {0}")]
    TokenParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session auth operations.
pub type Result<T> = std::result::Result<T, Error>;
