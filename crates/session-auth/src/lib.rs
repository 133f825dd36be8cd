//! Session token storage and the refresh exchange
//!
//! Provides the token pair type, the `TokenStore` collaborator interface with
//! in-memory and file-backed implementations, and the wire call that trades
//! a refresh token for a new pair. This crate knows nothing about request
//! interception or queueing; that lives in `session-client`.

pub mod constants;
pub mod error;
pub mod store;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{SessionTokens, refresh_session};
