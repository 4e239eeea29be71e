//! Recording transport shared by the API tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::transport::{HttpRequest, HttpResponse, Transport};
use super::{ApiClient, ApiError};
use crate::auth::{CredentialStore, MemoryStore, SessionManager};

type SendHook = Box<dyn Fn(&HttpRequest) + Send + Sync>;

/// Replays queued responses (200 `{}` once the queue is empty) and keeps
/// every request it was given.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
    hook: Mutex<Option<SendHook>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: HttpResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.responses.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    /// Run `hook` on each request while it is "in flight"
    pub fn on_send(&self, hook: impl Fn(&HttpRequest) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("no request was sent")
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(&request);
        }
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ApiError::Network(message)),
            None => Ok(HttpResponse::new(200, "{}")),
        }
    }
}

/// Client over a fresh in-memory session and the given transport
pub fn client_with(transport: FakeTransport) -> (ApiClient, Arc<FakeTransport>) {
    let transport = Arc::new(transport);
    let session = Arc::new(SessionManager::new(CredentialStore::new(Arc::new(MemoryStore::new()))));
    let client = ApiClient::with_transport("http://api.test/", session, transport.clone());
    (client, transport)
}
