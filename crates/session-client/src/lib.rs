//! Authenticated HTTP client with transparent token refresh
//!
//! Wraps a [`transport::Transport`] so that an expired or invalid access
//! token triggers one refresh exchange, no matter how many requests fail at
//! the same time. Requests that fail while the refresh is in flight wait in
//! a FIFO queue and are replayed with the new token; if the refresh fails
//! they all receive the same error and the session is ended exactly once.

pub mod authorization;
pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod queue;

#[cfg(test)]
mod end_to_end;
#[cfg(test)]
mod test_support;

pub use authorization::DefaultAuthorization;
pub use classify::{FailureKind, classify, server_message};
pub use client::{AuthClient, TokenManagerRegistration};
pub use coordinator::{CoordinatorOptions, RefreshCoordinator, RefreshState, SignOut};
pub use error::{Error, Result};
pub use queue::{PendingQueue, PendingRequest};

/// Message surfaced when a failure carries no server-supplied message.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Server error. Please try again later.";
