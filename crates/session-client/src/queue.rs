//! Requests blocked on an in-flight token refresh
//!
//! A `PendingRequest` owns the caller's original request and two
//! continuations. `resume` and `reject` consume the value, so exactly one
//! continuation can ever fire, exactly once. The queue is FIFO and is only
//! ever emptied as a whole by the refresh owner.

use std::collections::VecDeque;
use std::fmt;

use transport::RequestDescriptor;

use crate::error::Error;

/// Continuation invoked with the request rebuilt around the new access token.
pub type OnSuccess = Box<dyn FnOnce(RequestDescriptor) + Send>;

/// Continuation invoked with the refresh failure.
pub type OnFailure = Box<dyn FnOnce(Error) + Send>;

/// A caller waiting for the current refresh cycle to settle.
pub struct PendingRequest {
    request: RequestDescriptor,
    on_success: OnSuccess,
    on_failure: OnFailure,
}

impl PendingRequest {
    pub fn new(
        request: RequestDescriptor,
        on_success: impl FnOnce(RequestDescriptor) + Send + 'static,
        on_failure: impl FnOnce(Error) + Send + 'static,
    ) -> Self {
        Self {
            request,
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        }
    }

    /// The request as the caller originally issued it.
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    /// Fire the success continuation with the original request carrying
    /// `access_token` as its bearer token.
    ///
    /// A token that can't be encoded as a header value fires the failure
    /// continuation instead.
    pub fn resume(self, access_token: &str) {
        let Self {
            request,
            on_success,
            on_failure,
        } = self;
        match request.with_bearer(access_token) {
            Ok(replay) => on_success(replay),
            Err(e) => on_failure(Error::InvalidRequest(format!(
                "refreshed token is not a valid header value: {e}"
            ))),
        }
    }

    /// Fire the failure continuation.
    pub fn reject(self, error: Error) {
        (self.on_failure)(error)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .finish_non_exhaustive()
    }
}

/// FIFO of pending requests for one refresh cycle.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingRequest>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub fn enqueue(&mut self, pending: PendingRequest) {
        self.entries.push_back(pending);
    }

    /// Take every entry in arrival order, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<PendingRequest> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
