//! API client for communicating with the AI Insight REST API.
//!
//! `ApiClient::request` is the single choke point for HTTP calls. The typed
//! helpers (`get`, `post`, `put`, `delete`) and the resource calls in
//! `resources.rs` all delegate to it.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::endpoints::EndpointRules;
use super::transport::{HttpRequest, Method, Transport};
use super::ApiError;
use crate::auth::{redact_token, SessionManager};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const CONTENT_TYPE_JSON: &str = "application/json";

/// Per-call options for `ApiClient::request`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the endpoint classification when set
    pub skip_auth: Option<bool>,
    /// Extra headers, sent before the Authorization header
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    /// Never attach a credential
    pub fn public() -> Self {
        Self {
            skip_auth: Some(true),
            ..Default::default()
        }
    }

    /// Attach the credential even if the endpoint is classified public
    pub fn authenticated() -> Self {
        Self {
            skip_auth: Some(false),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Add a JSON content type unless the caller set one
    fn with_json_content_type(mut self) -> Self {
        if !self.has_header("Content-Type") {
            self.headers
                .insert(0, ("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string()));
        }
        self
    }
}

/// API client for the AI Insight backend.
/// Clone is cheap - the transport and session are shared.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    rules: EndpointRules,
}

impl ApiClient {
    pub fn with_transport(
        base_url: impl Into<String>,
        session: Arc<SessionManager>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            session,
            rules: EndpointRules::default(),
        }
    }

    /// Replace the public endpoint rules
    pub fn with_rules(mut self, rules: EndpointRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send one request and normalise the outcome.
    ///
    /// - Public endpoints skip the credential unless `options.skip_auth`
    ///   says otherwise; the explicit option always wins.
    /// - A protected call without a token is still sent; the server decides.
    /// - 204 and empty 2xx bodies yield `{}`.
    /// - 401 yields `ApiError::Unauthorized`; the caller decides whether to log out.
    /// - Responses to credentialed calls that arrive after a login/logout are
    ///   discarded with `ApiError::SessionChanged`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let is_public = self.rules.is_public(url);
        let skip_auth = options.skip_auth.unwrap_or(is_public);
        let mut headers = options.headers;
        let mut credential_epoch = None;

        if !skip_auth {
            let (token, epoch) = self.session.token_with_epoch();
            match token {
                Some(token) => {
                    debug!(url = %url, token = %redact_token(&token), "Attaching bearer token");
                    headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
                    credential_epoch = Some(epoch);
                }
                None if !is_public => {
                    warn!(url = %url, "Auth required but no token found, sending without credential");
                }
                None => {}
            }
        }

        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let request = HttpRequest {
            method,
            url: self.url(url),
            headers,
            body,
        };

        debug!(method = method.as_str(), url = %request.url, is_public, skip_auth, "Sending request");
        let response = self.transport.send(request).await.map_err(|e| {
            warn!(url = %url, error = %e, "Request failed before a response arrived");
            e
        })?;
        debug!(url = %url, status = response.status, "Response received");

        if let Some(epoch) = credential_epoch {
            let current = self.session.epoch();
            if current != epoch {
                warn!(
                    url = %url,
                    request_epoch = epoch,
                    current_epoch = current,
                    "Discarding response issued under a previous session"
                );
                return Err(ApiError::SessionChanged);
            }
        }

        if response.is_success() {
            if response.status == 204 || response.body.trim().is_empty() {
                return Ok(Value::Object(Map::new()));
            }
            return serde_json::from_str(&response.body).map_err(|e| {
                ApiError::Decode(format!("Failed to parse JSON response from {}: {}", url, e))
            });
        }

        if response.status == 401 {
            error!(url = %url, "Bearer token rejected by the server (401 Unauthorized)");
            return Err(ApiError::Unauthorized);
        }

        let err = ApiError::from_status(response.status, &response.body);
        warn!(url = %url, status = response.status, error = %err, "API error response");
        Err(err)
    }

    fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value).map_err(|e| {
            ApiError::Decode(format!("Unexpected response shape from {}: {}", url, e))
        })
    }

    fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T, ApiError> {
        let value = self.request(Method::Get, url, None, options).await?;
        Self::decode(url, value)
    }

    pub async fn post<T, B>(&self, url: &str, body: &B, options: RequestOptions) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = Self::encode(body)?;
        let value = self
            .request(Method::Post, url, Some(&body), options.with_json_content_type())
            .await?;
        Self::decode(url, value)
    }

    pub async fn put<T, B>(&self, url: &str, body: &B, options: RequestOptions) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = Self::encode(body)?;
        let value = self
            .request(Method::Put, url, Some(&body), options.with_json_content_type())
            .await?;
        Self::decode(url, value)
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<(), ApiError> {
        self.request(Method::Delete, url, None, options).await.map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{client_with, FakeTransport};
    use crate::api::transport::HttpResponse;
    use crate::auth::{CredentialStore, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_public_endpoint_skips_token() {
        let (client, transport) = client_with(FakeTransport::new());
        client.session().login("tok", "alice", Vec::new());

        client
            .request(Method::Post, "/api/v1/ai/analyze", Some(&json!({"topic": "t"})), RequestOptions::default())
            .await
            .unwrap();

        let sent = transport.last_request();
        assert_eq!(sent.header("Authorization"), None);
        assert_eq!(sent.url, "http://api.test/api/v1/ai/analyze");
    }

    #[tokio::test]
    async fn test_protected_endpoint_gets_bearer_token() {
        let (client, transport) = client_with(FakeTransport::new());
        client.session().login("tok", "alice", Vec::new());

        client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(transport.last_request().header("Authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_explicit_skip_auth_overrides_classification() {
        let (client, transport) = client_with(FakeTransport::new());
        client.session().login("tok", "alice", Vec::new());

        client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::public())
            .await
            .unwrap();
        assert_eq!(transport.last_request().header("Authorization"), None);

        client
            .request(Method::Post, "/api/v1/ai/analyze", None, RequestOptions::authenticated())
            .await
            .unwrap();
        assert_eq!(transport.last_request().header("Authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_protected_call_without_token_is_still_sent() {
        let (client, transport) = client_with(FakeTransport::new());
        client.session().restore();

        client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.last_request().header("Authorization"), None);
    }

    #[tokio::test]
    async fn test_204_returns_empty_object() {
        let transport = FakeTransport::new().respond(HttpResponse::new(204, "this is not json"));
        let (client, _) = client_with(transport);

        let value = client
            .request(Method::Delete, "/api/v1/users/1", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!({}));
    }

    #[tokio::test]
    async fn test_success_decodes_json() {
        let transport = FakeTransport::new().respond(HttpResponse::new(200, r#"{"ok":true}"#));
        let (client, _) = client_with(transport);

        let value = client
            .request(Method::Get, "/api/v1/api/data", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_success_with_invalid_json_is_decode_error() {
        let transport = FakeTransport::new().respond(HttpResponse::new(200, "<html>"));
        let (client, _) = client_with(transport);

        let err = client
            .request(Method::Get, "/api/v1/api/data", None, RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_401_is_auth_error_without_retry() {
        let transport = FakeTransport::new().respond(HttpResponse::new(401, r#"{"message":"expired"}"#));
        let (client, transport) = client_with(transport);
        client.session().login("tok", "alice", Vec::new());

        let err = client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_auth_error());
        assert_eq!(err.status(), Some(401));
        assert_eq!(transport.request_count(), 1);
        // Logging out is the caller's decision
        assert!(client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_500_carries_server_message() {
        let transport =
            FakeTransport::new().respond(HttpResponse::new(500, r#"{"message":"Server Error"}"#));
        let (client, _) = client_with(transport);
        client.session().login("tok", "alice", Vec::new());

        let err = client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.message(), "Server Error");
        assert_eq!(err.status(), Some(500));
        assert!(!err.is_auth_error());
    }

    #[tokio::test]
    async fn test_network_failure_has_no_status() {
        let transport = FakeTransport::new().fail("connection refused");
        let (client, _) = client_with(transport);

        let err = client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_post_sets_json_content_type_and_body() {
        let transport = FakeTransport::new().respond(HttpResponse::new(200, r#"{"id":1}"#));
        let (client, transport) = client_with(transport);

        let value: Value = client
            .post("/api/v1/users", &json!({"username": "bob"}), RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value["id"], 1);

        let sent = transport.last_request();
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.header("Content-Type"), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(r#"{"username":"bob"}"#));
    }

    #[tokio::test]
    async fn test_caller_content_type_is_kept() {
        let (client, transport) = client_with(FakeTransport::new());

        let _: Value = client
            .post(
                "/api/v1/users",
                &json!({}),
                RequestOptions::default().header("content-type", "application/vnd.api+json"),
            )
            .await
            .unwrap();

        let sent = transport.last_request();
        let content_types: Vec<_> = sent
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(sent.header("Content-Type"), Some("application/vnd.api+json"));
    }

    #[tokio::test]
    async fn test_absolute_url_passes_through() {
        let (client, transport) = client_with(FakeTransport::new());
        client
            .request(Method::Get, "https://other.test/health", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.last_request().url, "https://other.test/health");
    }

    #[tokio::test]
    async fn test_response_after_logout_is_discarded() {
        let transport = FakeTransport::new().respond(HttpResponse::new(200, r#"{"secret":1}"#));
        let (client, transport) = client_with(transport);
        client.session().login("tok", "alice", Vec::new());

        let session = Arc::clone(client.session());
        transport.on_send(move |_| session.logout());

        let err = client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SessionChanged));
    }

    #[tokio::test]
    async fn test_public_response_unaffected_by_logout() {
        let transport = FakeTransport::new().respond(HttpResponse::new(200, r#"{"summary":"s"}"#));
        let (client, transport) = client_with(transport);
        client.session().login("tok", "alice", Vec::new());

        let session = Arc::clone(client.session());
        transport.on_send(move |_| session.logout());

        let value = client
            .request(Method::Post, "/api/v1/ai/analyze", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value["summary"], "s");
    }

    #[tokio::test]
    async fn test_login_scenario_attaches_new_token() {
        let (client, transport) = client_with(FakeTransport::new().respond(HttpResponse::new(200, "[]")));

        client.session().login("tok123", "alice", vec!["ROLE_ADMIN".to_string()]);
        let session = client.session().snapshot();
        assert!(session.is_authenticated());
        assert!(session.is_admin());
        assert_eq!(session.username(), Some("alice"));

        let users: Vec<Value> = client.get("/api/v1/users", RequestOptions::default()).await.unwrap();
        assert!(users.is_empty());
        assert_eq!(transport.last_request().header("Authorization"), Some("Bearer tok123"));
    }

    #[tokio::test]
    async fn test_concurrent_login_never_accepts_previous_token() {
        const LOGINS: u64 = 20_000;
        let (client, transport) = client_with(FakeTransport::new());
        let session = Arc::clone(client.session());

        // Authorization header and session epoch seen by the transport
        let sent: Arc<Mutex<Vec<(Option<String>, u64)>>> = Arc::default();
        {
            let sent = Arc::clone(&sent);
            let session = Arc::clone(&session);
            transport.on_send(move |request| {
                let header = request.header("Authorization").map(str::to_string);
                sent.lock().unwrap().push((header, session.epoch()));
            });
        }

        let writer = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                for k in 1..=LOGINS {
                    session.login(format!("tok{}", k), "alice", Vec::new());
                }
            })
        };

        while !writer.is_finished() {
            let result = client
                .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
                .await;
            let (header, epoch_at_send) = sent.lock().unwrap().last().cloned().unwrap();
            if let (Ok(_), Some(header)) = (&result, header) {
                assert_eq!(header, format!("Bearer tok{}", epoch_at_send));
            }
        }
        writer.join().unwrap();

        client
            .request(Method::Get, "/api/v1/users", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(
            transport.last_request().header("Authorization"),
            Some(format!("Bearer tok{}", LOGINS).as_str())
        );
    }

    /// Completes `/slow` after `/fast` and counts every call
    #[derive(Default)]
    struct OutOfOrderTransport {
        calls: AtomicUsize,
        completed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for OutOfOrderTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = if request.url.ends_with("/slow") { 50 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completed.lock().unwrap().push(request.url.clone());
            Ok(HttpResponse::new(200, json!({ "url": request.url }).to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_are_independent() {
        let transport = Arc::new(OutOfOrderTransport::default());
        let session = Arc::new(SessionManager::new(CredentialStore::new(Arc::new(MemoryStore::new()))));
        session.login("tok", "alice", Vec::new());
        let client = ApiClient::with_transport("http://api.test", session, transport.clone());

        let (slow, fast) = tokio::join!(
            client.request(Method::Get, "/api/v1/slow", None, RequestOptions::default()),
            client.request(Method::Get, "/api/v1/fast", None, RequestOptions::default()),
        );

        assert_eq!(slow.unwrap()["url"], "http://api.test/api/v1/slow");
        assert_eq!(fast.unwrap()["url"], "http://api.test/api/v1/fast");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *transport.completed.lock().unwrap(),
            vec!["http://api.test/api/v1/fast".to_string(), "http://api.test/api/v1/slow".to_string()]
        );
    }
}
