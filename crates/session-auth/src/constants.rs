//! Session API constants
//!
//! Paths and machine-readable reasons shared by the refresh exchange and the
//! error classifier.

/// Refresh endpoint, relative to the API base URL
pub const REFRESH_TOKEN_PATH: &str = "/sessions/refresh-token";

/// `message` value of a 401 body when the access token has expired
pub const TOKEN_EXPIRED: &str = "token.expired";

/// `message` value of a 401 body when the access token is not recognised
pub const TOKEN_INVALID: &str = "token.invalid";

