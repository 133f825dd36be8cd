//! Single-flight token refresh
//!
//! When a request fails because its access token expired or is unknown, the
//! coordinator makes sure exactly one refresh exchange runs at a time. The
//! first failing caller becomes the refresh owner; every caller that fails
//! while that refresh is in flight is parked in the pending queue and
//! resumed, in arrival order, when the refresh settles.
//!
//! State machine:
//! - Idle → Refreshing (first refreshable auth failure; the caller owns the cycle)
//! - Refreshing → Idle (refresh settled; queue drained in the same critical section)
//!
//! The refresh state and the queue share one mutex. It is held only for the
//! test-and-set, for enqueueing, and for the drain; never across an await.
//! The refresh exchange, the token save, and every replay run outside it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use session_auth::{SessionTokens, TokenStore};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use transport::{RequestDescriptor, Response, Transport};

use crate::authorization::DefaultAuthorization;
use crate::classify::{classify, surface};
use crate::error::{Error, Result};
use crate::metrics;
use crate::queue::{PendingQueue, PendingRequest};
use crate::{DEFAULT_FALLBACK_MESSAGE, FailureKind};

/// Terminates the user's session.
///
/// Called whenever the session can't be recovered. May be called more than
/// once across failures; implementations must tolerate repeats.
pub trait SignOut: Send + Sync {
    fn sign_out(&self);
}

impl<F> SignOut for F
where
    F: Fn() + Send + Sync,
{
    fn sign_out(&self) {
        self()
    }
}

/// Refresh cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Tunables for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Upper bound on the refresh exchange (including the token save).
    /// `None` waits indefinitely.
    pub refresh_timeout: Option<Duration>,
    /// User-facing message for failures that carry none
    pub fallback_message: String,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            refresh_timeout: None,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

struct Shared {
    state: RefreshState,
    queue: PendingQueue,
}

/// Outcome of the atomic test-and-set on the refresh state.
enum Role<'a> {
    Owner(RefreshCycle<'a>),
    Waiter(mpsc::UnboundedReceiver<Result<RequestDescriptor>>),
}

/// Coordinates token refresh for one client instance.
pub struct RefreshCoordinator {
    shared: Mutex<Shared>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    sign_out: Arc<dyn SignOut>,
    authorization: Arc<DefaultAuthorization>,
    options: CoordinatorOptions,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        sign_out: Arc<dyn SignOut>,
        authorization: Arc<DefaultAuthorization>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            shared: Mutex::new(Shared {
                state: RefreshState::Idle,
                queue: PendingQueue::new(),
            }),
            transport,
            store,
            sign_out,
            authorization,
            options,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.lock().state
    }

    /// Number of callers parked behind the in-flight refresh.
    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Invoke the sign-out collaborator.
    pub fn end_session(&self, reason: &'static str) {
        warn!(reason, "signing out");
        metrics::record_sign_out(reason);
        self.sign_out.sign_out();
    }

    /// Recover `request` from an auth failure of the given kind.
    ///
    /// Refreshable kinds go through the single-flight refresh and return the
    /// replayed request's outcome. Any other kind signs out immediately and
    /// surfaces the message carried by `response`, if any.
    pub async fn handle_auth_failure(
        &self,
        kind: FailureKind,
        response: Option<&Response>,
        request: RequestDescriptor,
    ) -> Result<Response> {
        if !kind.is_refreshable() {
            self.end_session("auth_rejected");
            return Err(surface(kind, response, &self.options.fallback_message));
        }

        let stored = self
            .store
            .get()
            .await
            .map_err(|e| Error::TokenStore(e.to_string()))?;
        let Some(refresh_token) = stored
            .as_ref()
            .and_then(SessionTokens::refresh_token)
            .map(str::to_owned)
        else {
            self.end_session("no_refresh_token");
            return Err(Error::NoRefreshToken);
        };

        match self.join_or_lead(&request) {
            Role::Waiter(mut outcome) => {
                let replay = outcome.recv().await.unwrap_or_else(|| {
                    Err(Error::RefreshFailed("refresh ended without a result".into()))
                })?;
                self.replay(replay).await
            }
            Role::Owner(cycle) => self.lead(cycle, &refresh_token, request).await,
        }
    }

    /// The single serialization point: observe Idle and claim the cycle, or
    /// observe Refreshing and join the queue.
    fn join_or_lead(&self, request: &RequestDescriptor) -> Role<'_> {
        let mut shared = self.lock();
        match shared.state {
            RefreshState::Refreshing => {
                let (tx, rx) = mpsc::unbounded_channel();
                let on_failure = tx.clone();
                shared.queue.enqueue(PendingRequest::new(
                    request.clone(),
                    move |replay| {
                        let _ = tx.send(Ok(replay));
                    },
                    move |error| {
                        let _ = on_failure.send(Err(error));
                    },
                ));
                metrics::record_queued();
                debug!(queued = shared.queue.len(), "refresh in flight, request queued");
                Role::Waiter(rx)
            }
            RefreshState::Idle => {
                shared.state = RefreshState::Refreshing;
                Role::Owner(RefreshCycle {
                    coordinator: self,
                    finished: false,
                })
            }
        }
    }

    /// Run the refresh as owner and settle every parked caller.
    async fn lead(
        &self,
        cycle: RefreshCycle<'_>,
        refresh_token: &str,
        request: RequestDescriptor,
    ) -> Result<Response> {
        info!("access token rejected, refreshing session");
        let outcome = self.exchange(refresh_token).await;
        let pending = cycle.finish();

        match outcome {
            Ok(tokens) => {
                metrics::record_refresh("success");
                info!(queued = pending.len(), "token refresh succeeded");
                for waiter in pending {
                    waiter.resume(&tokens.token);
                }
                let replay = request.with_bearer(&tokens.token).map_err(|e| {
                    Error::InvalidRequest(format!("refreshed token is not a valid header value: {e}"))
                })?;
                self.replay(replay).await
            }
            Err(error) => {
                metrics::record_refresh("failure");
                warn!(queued = pending.len(), error = %error, "token refresh failed");
                for waiter in pending {
                    waiter.reject(error.clone());
                }
                self.end_session("refresh_failed");
                Err(error)
            }
        }
    }

    /// Refresh exchange, token save, and default header update.
    async fn exchange(&self, refresh_token: &str) -> Result<SessionTokens> {
        let refresh = async {
            let tokens = session_auth::refresh_session(self.transport.as_ref(), refresh_token)
                .await
                .map_err(|e| Error::RefreshFailed(e.to_string()))?;
            self.store
                .save(&tokens)
                .await
                .map_err(|e| Error::RefreshFailed(format!("persisting refreshed tokens: {e}")))?;
            self.authorization.set(&tokens.token);
            Ok(tokens)
        };

        match self.options.refresh_timeout {
            Some(limit) => tokio::time::timeout(limit, refresh).await.unwrap_or_else(|_| {
                Err(Error::RefreshFailed(format!(
                    "refresh timed out after {}ms",
                    limit.as_millis()
                )))
            }),
            None => refresh.await,
        }
    }

    /// Send a request that already carries the refreshed token.
    ///
    /// A replay is never refreshed again: any 401 here ends the session.
    async fn replay(&self, request: RequestDescriptor) -> Result<Response> {
        let result = self.transport.execute(&request).await;
        let response = match result {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => Some(response),
            Err(e) => {
                warn!(error = %e, "replay got no response");
                None
            }
        };
        let kind = classify(response.as_ref());
        if kind.is_auth() {
            self.end_session("replay_rejected");
        }
        Err(surface(kind, response.as_ref(), &self.options.fallback_message))
    }

    /// Return to Idle and take the queue, atomically with respect to enqueue.
    fn end_cycle(&self) -> Vec<PendingRequest> {
        let mut shared = self.lock();
        shared.state = RefreshState::Idle;
        shared.queue.drain_all()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ownership of the current refresh cycle.
///
/// If the owner's future is dropped before the refresh settles, the cycle is
/// closed here: parked callers are rejected and the state returns to Idle.
struct RefreshCycle<'a> {
    coordinator: &'a RefreshCoordinator,
    finished: bool,
}

impl RefreshCycle<'_> {
    fn finish(mut self) -> Vec<PendingRequest> {
        self.finished = true;
        self.coordinator.end_cycle()
    }
}

impl Drop for RefreshCycle<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let pending = self.coordinator.end_cycle();
        warn!(queued = pending.len(), "refresh owner dropped mid-refresh");
        for waiter in pending {
            waiter.reject(Error::RefreshFailed("refresh abandoned".into()));
        }
    }
}
