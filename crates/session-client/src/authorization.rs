//! Live default Authorization header
//!
//! Holds the access token attached to every outgoing request that doesn't
//! carry its own Authorization header. The refresh coordinator replaces it
//! after each successful refresh, so requests issued after the cycle use the
//! new token without going through the refresh path.

use std::sync::{PoisonError, RwLock};

use common::Secret;
use transport::RequestDescriptor;

use crate::error::{Error, Result};

#[derive(Default)]
pub struct DefaultAuthorization {
    token: RwLock<Option<Secret<String>>>,
}

impl DefaultAuthorization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, access_token: &str) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Secret::new(access_token.to_string()));
    }

    pub fn clear(&self) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    pub fn is_set(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The current access token (use sparingly).
    pub fn current(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.expose().clone())
    }

    /// Attach the default token unless the request already has its own
    /// Authorization header.
    pub fn apply(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        if request.authorization().is_some() {
            return Ok(request);
        }
        match self.current() {
            Some(token) => request.with_bearer(&token).map_err(|e| {
                Error::InvalidRequest(format!("access token is not a valid header value: {e}"))
            }),
            None => Ok(request),
        }
    }
}
