//! Scripted API shared by the coordinator and client tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::Semaphore;
use transport::{RequestDescriptor, Response, Transport};

/// 401 token.expired for any bearer other than the current token, 200
/// otherwise. The refresh endpoint waits on `gate` before answering with
/// `refresh_reply`.
pub(crate) struct ScriptedApi {
    pub(crate) current: Mutex<String>,
    gate: Semaphore,
    pub(crate) refresh_reply: Mutex<transport::Result<Response>>,
    refresh_calls: AtomicUsize,
    /// Successful requests, in the order they reached the API
    pub(crate) replays: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedApi {
    pub(crate) fn new(refresh_reply: transport::Result<Response>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new("T2".into()),
            gate: Semaphore::new(0),
            refresh_reply: Mutex::new(refresh_reply),
            refresh_calls: AtomicUsize::new(0),
            replays: Mutex::new(Vec::new()),
        })
    }

    /// Let one pending (or future) refresh call answer.
    pub(crate) fn open_gate(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn replayed_paths(&self) -> Vec<String> {
        self.replays
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.path.clone())
            .collect()
    }

    async fn handle(&self, request: &RequestDescriptor) -> transport::Result<Response> {
        if request.path == session_auth::REFRESH_TOKEN_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            return self.refresh_reply.lock().unwrap().clone();
        }
        let expected = format!("Bearer {}", self.current.lock().unwrap());
        if request.authorization() == Some(expected.as_str()) {
            self.replays.lock().unwrap().push(request.clone());
            Ok(Response::json_body(200, &json!({"path": request.path})))
        } else {
            Ok(Response::json_body(401, &json!({"message": "token.expired"})))
        }
    }
}

impl Transport for ScriptedApi {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = transport::Result<Response>> + Send + 'a>> {
        Box::pin(self.handle(request))
    }
}

/// Successful refresh reply handing out T2/R2.
pub(crate) fn refreshed() -> transport::Result<Response> {
    Ok(Response::json_body(
        200,
        &json!({"token": "T2", "refresh_token": "R2"}),
    ))
}
