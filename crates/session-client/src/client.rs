//! Authenticated API client
//!
//! `AuthClient` is what the rest of the application calls. It attaches the
//! live access token, sends through the transport, and routes failures:
//! refreshable 401s to the token manager's coordinator, other 401s to
//! sign-out, and everything else straight back to the caller as a domain
//! error. Successful responses pass through untouched.
//!
//! The token manager is registered separately, with the sign-out
//! collaborator, and can be ejected again. Until one is registered, 401s are
//! surfaced as `Unauthorized` without refresh or sign-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use session_auth::TokenStore;
use tracing::{debug, info, instrument, warn};
use transport::{RequestDescriptor, Response, Transport};

use crate::authorization::DefaultAuthorization;
use crate::classify::{classify, surface};
use crate::coordinator::{CoordinatorOptions, RefreshCoordinator, RefreshState, SignOut};
use crate::error::{Error, Result};
use crate::metrics;

struct Registered {
    id: u64,
    coordinator: Arc<RefreshCoordinator>,
}

/// HTTP client that keeps the session alive across access-token expiry.
pub struct AuthClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    authorization: Arc<DefaultAuthorization>,
    token_manager: RwLock<Option<Registered>>,
    next_registration: AtomicU64,
    options: CoordinatorOptions,
}

impl AuthClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            transport,
            store,
            authorization: Arc::new(DefaultAuthorization::new()),
            token_manager: RwLock::new(None),
            next_registration: AtomicU64::new(1),
            options,
        }
    }

    /// Install the stored access token as the default Authorization header.
    ///
    /// Returns `false` when no session is stored.
    pub async fn restore_session(&self) -> Result<bool> {
        let stored = self
            .store
            .get()
            .await
            .map_err(|e| Error::TokenStore(e.to_string()))?;
        match stored {
            Some(tokens) if !tokens.token.is_empty() => {
                self.authorization.set(&tokens.token);
                info!("restored stored session");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Replace the default access token (e.g. after sign-in).
    pub fn set_access_token(&self, access_token: &str) {
        self.authorization.set(access_token);
    }

    /// Drop the default access token (e.g. after sign-out).
    pub fn clear_access_token(&self) {
        self.authorization.clear();
    }

    pub fn has_access_token(&self) -> bool {
        self.authorization.is_set()
    }

    /// Enable transparent token refresh, signing out through `sign_out` when
    /// the session can't be recovered.
    ///
    /// Replaces any previously registered manager; the new one starts Idle
    /// with an empty queue.
    pub fn register_token_manager(
        self: &Arc<Self>,
        sign_out: Arc<dyn SignOut>,
    ) -> TokenManagerRegistration {
        let id = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let coordinator = Arc::new(RefreshCoordinator::new(
            self.transport.clone(),
            self.store.clone(),
            sign_out,
            self.authorization.clone(),
            self.options.clone(),
        ));
        let mut slot = self
            .token_manager
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.replace(Registered { id, coordinator }).is_some() {
            debug!(id, "replaced token manager");
        }
        TokenManagerRegistration {
            client: Arc::downgrade(self),
            id,
        }
    }

    /// Callers currently parked behind an in-flight refresh.
    pub fn pending_requests(&self) -> usize {
        self.coordinator().map_or(0, |c| c.pending_len())
    }

    /// Refresh state of the registered token manager (Idle when none).
    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator()
            .map_or(RefreshState::Idle, |c| c.state())
    }

    /// Send a request with the session's credentials.
    ///
    /// 401s are routed to the registered token manager, when there is one.
    #[instrument(skip_all, fields(request_id = %new_request_id(), method = %request.method, path = %request.path))]
    pub async fn send(&self, request: RequestDescriptor) -> Result<Response> {
        let outcome = self.dispatch(request).await;
        match &outcome {
            Ok(response) => {
                debug!(status = response.status, "request succeeded");
                metrics::record_request("success");
            }
            Err(e) => {
                debug!(error = %e, "request failed");
                metrics::record_request(e.label());
            }
        }
        outcome
    }

    async fn dispatch(&self, request: RequestDescriptor) -> Result<Response> {
        let outgoing = self.authorization.apply(request.clone())?;

        let response = match self.transport.execute(&outgoing).await {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => Some(response),
            Err(e) => {
                warn!(error = %e, "no response from server");
                None
            }
        };

        let kind = classify(response.as_ref());
        let fallback = &self.options.fallback_message;
        match self.coordinator() {
            Some(coordinator) if kind.is_auth() => {
                debug!(failure = kind.label(), "access token rejected");
                coordinator
                    .handle_auth_failure(kind, response.as_ref(), request)
                    .await
            }
            _ => Err(surface(kind, response.as_ref(), fallback)),
        }
    }

    fn coordinator(&self) -> Option<Arc<RefreshCoordinator>> {
        self.token_manager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.coordinator.clone())
    }

    fn eject(&self, id: u64) {
        let mut slot = self
            .token_manager
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|r| r.id == id) {
            *slot = None;
            debug!(id, "token manager ejected");
        }
    }
}

/// Handle for a registered token manager.
#[must_use = "dropping the registration keeps the token manager installed; call eject() to remove it"]
pub struct TokenManagerRegistration {
    client: Weak<AuthClient>,
    id: u64,
}

impl TokenManagerRegistration {
    /// Remove this token manager. No-op if it was already replaced or the
    /// client is gone.
    pub fn eject(self) {
        if let Some(client) = self.client.upgrade() {
            client.eject(self.id);
        }
    }
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}
