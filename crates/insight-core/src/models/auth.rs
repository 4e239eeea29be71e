use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// Body returned by `POST /api/v1/auth/login`.
///
/// The backend omits null fields, so everything except `success` is optional
/// on the wire. A missing token on a 2xx response is treated as a failed login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub success: bool,
}
