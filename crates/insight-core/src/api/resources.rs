//! Typed calls for the backend's resources: login, AI analysis, users.

use serde_json::Value;
use tracing::{debug, info};

use super::{ApiClient, ApiError, RequestOptions};
use crate::auth::Session;
use crate::models::{
    AnalysisRequest, AnalysisResponse, AuthRequest, AuthResponse, User, UserCreate, UserUpdate,
};

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const ANALYZE_PATH: &str = "/api/v1/ai/analyze";
pub const USERS_PATH: &str = "/api/v1/users";
pub const PROBE_PATH: &str = "/api/v1/api/data";

impl ApiClient {
    // ===== Authentication =====

    /// Exchange credentials for a token. Does not touch the session.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = AuthRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let mut auth: AuthResponse = self.post(LOGIN_PATH, &body, RequestOptions::public()).await?;

        if auth.token.as_deref().map_or(true, str::is_empty) {
            let reason = auth
                .error
                .take()
                .unwrap_or_else(|| "Token not received from server".to_string());
            return Err(ApiError::Decode(reason));
        }
        if auth.username.as_deref().map_or(true, str::is_empty) {
            auth.username = Some(username.to_string());
        }
        Ok(auth)
    }

    /// Authenticate and, on success, log the session in.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        if username.is_empty() || password.is_empty() {
            return Err(ApiError::InvalidInput("Username and password required".to_string()));
        }

        let auth = self.authenticate(username, password).await?;
        let token = auth.token.unwrap_or_default();
        let username = auth.username.unwrap_or_else(|| username.to_string());

        self.session().login(token, username, auth.roles);
        let session = self.session().snapshot();
        info!(username = ?session.username(), is_admin = session.is_admin(), "Signed in");
        Ok(session)
    }

    // ===== AI insights =====

    /// Analyze a topic. Always sent without credentials.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, ApiError> {
        debug!(topic = %request.topic, has_text = request.text.is_some(), "Requesting analysis");
        self.post(ANALYZE_PATH, request, RequestOptions::public()).await
    }

    // ===== Users =====

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.get(USERS_PATH, RequestOptions::default()).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User, ApiError> {
        self.get(&format!("{}/{}", USERS_PATH, id), RequestOptions::default()).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>, ApiError> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.get(&format!("{}/search?query={}", USERS_PATH, encoded), RequestOptions::default())
            .await
    }

    pub async fn create_user(&self, user: &UserCreate) -> Result<User, ApiError> {
        self.post(USERS_PATH, user, RequestOptions::default()).await
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<User, ApiError> {
        self.put(&format!("{}/{}", USERS_PATH, id), update, RequestOptions::default())
            .await
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("{}/{}", USERS_PATH, id), RequestOptions::default())
            .await
    }

    // ===== Connectivity =====

    /// Protected probe used to confirm the token is accepted
    pub async fn probe(&self) -> Result<Value, ApiError> {
        self.get(PROBE_PATH, RequestOptions::default()).await
    }
}
