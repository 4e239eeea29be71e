//! Application state for the AI Insight CLI.
//!
//! `App` owns the configuration, the session manager and the API client, and
//! runs one command per invocation. Every command passes the route guard for
//! its view before touching the API.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use insight_core::api::ApiError;
use insight_core::guard::guard_until_settled;
use insight_core::models::{AnalysisRequest, UserCreate, UserUpdate};
use insight_core::{ApiClient, Config, GuardVerdict, RequestOptions, Route, Session, SessionManager};

use crate::commands::{Command, UsersCommand};
use crate::format;

// ============================================================================
// Constants
// ============================================================================

/// Grace period between reporting a rejected token and logging out
const AUTH_ERROR_LOGOUT_DELAY_MS: u64 = 1500;

/// Endpoints exercised by `insight check`, with the access each one expects
const AUTH_CHECKS: &[(&str, &str, &str)] = &[
    ("Public health endpoint", "/actuator/health", "public"),
    ("User profile", "/api/v1/users/profile", "authenticated"),
    ("AI status", "/api/v1/ai/status", "admin"),
    ("All users list", "/api/v1/users", "admin"),
    ("Admin status", "/api/v1/admin/status", "admin"),
];

pub struct App {
    config: Config,
    session: Arc<SessionManager>,
    api: ApiClient,
}

impl App {
    /// Load configuration, open the credential store and restore the session
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        }
        .with_env();
        debug!(base_url = %config.base_url, storage = ?config.storage, "Config loaded");

        let session = Arc::new(SessionManager::new(config.credential_store()?));
        let api = config.api_client(Arc::clone(&session))?;

        let restored = session.restore();
        debug!(session = ?restored, "Session restored");

        Ok(Self::from_parts(config, session, api))
    }

    fn from_parts(config: Config, session: Arc<SessionManager>, api: ApiClient) -> Self {
        Self {
            config,
            session,
            api,
        }
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { username } => self.login(username).await,
            Command::Logout => {
                self.session.logout();
                println!("Logged out.");
                Ok(())
            }
            Command::WhoAmI => {
                self.whoami();
                Ok(())
            }
            Command::Analyze { topic, text } => {
                self.analyze(topic, Command::joined_text(&text)).await
            }
            Command::Users { cmd } => self.users(cmd.unwrap_or(UsersCommand::List)).await,
            Command::Probe => self.probe().await,
            Command::Check => self.check().await,
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    fn prompt_username(default: Option<&str>) -> Result<String> {
        match default {
            Some(last) => print!("Username [{}]: ", last),
            None => print!("Username: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();
        if input.is_empty() {
            default
                .map(str::to_string)
                .ok_or_else(|| anyhow!("Username and password required"))
        } else {
            Ok(input.to_string())
        }
    }

    fn prompt_password(prompt: &str) -> Result<String> {
        Ok(rpassword::prompt_password(prompt)?)
    }

    /// Ask twice for a new account's password
    fn prompt_new_password() -> Result<String> {
        let password = Self::prompt_password("New user's password: ")?;
        if password.is_empty() {
            bail!("Password must not be empty");
        }
        if Self::prompt_password("Confirm password: ")? != password {
            bail!("Passwords do not match");
        }
        Ok(password)
    }

    async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username.or_else(|| std::env::var("INSIGHT_USERNAME").ok()) {
            Some(name) => name,
            None => Self::prompt_username(self.config.last_username.as_deref())?,
        };
        let password = match std::env::var("INSIGHT_PASSWORD") {
            Ok(password) => password,
            Err(_) => Self::prompt_password("Password: ")?,
        };

        println!("Authenticating...");
        self.sign_in_and_confirm(&username, &password).await?;

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    /// Sign in, then make one protected call with the new token.
    ///
    /// A token the backend rejects straight away goes through the same
    /// logout path as any other auth error.
    async fn sign_in_and_confirm(&self, username: &str, password: &str) -> Result<Session> {
        let session = match self.api.sign_in(username, password).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Login failed");
                bail!(Self::login_failure_message(&e));
            }
        };
        println!("{}", format::session_summary(&session));

        match self.api.probe().await {
            Ok(_) => info!("Token accepted by protected endpoint"),
            Err(e) if e.is_auth_error() => {
                warn!("Fresh token rejected by protected endpoint");
                return Err(self
                    .api_failure(e)
                    .await
                    .context("The backend rejected the new token"));
            }
            Err(e) => debug!(error = %e, "Post-login check failed"),
        }
        Ok(session)
    }

    fn login_failure_message(e: &ApiError) -> String {
        match e {
            ApiError::Unauthorized => "Invalid username or password".to_string(),
            ApiError::Network(msg) if msg.to_lowercase().contains("timed out") => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::Network(_) => {
                "Unable to connect to server. Check that the backend is running.".to_string()
            }
            other => format!("Login failed: {}", other),
        }
    }

    fn whoami(&self) {
        let session = self.session.snapshot();
        println!("{}", format::session_summary(&session));
        println!("Backend: {}", self.api.base_url());
        println!();
        for route in Route::ALL {
            println!(
                "  {:<12} {:<11} {}",
                route.title(),
                route.to_path(),
                format::verdict_label(route.verdict(&session))
            );
        }
    }

    // =========================================================================
    // Guarding and error handling
    // =========================================================================

    /// Resolve the guard for `route` and turn anything but `Allowed` into an error
    async fn enter(&self, route: Route) -> Result<()> {
        let verdict = guard_until_settled(self.session.subscribe(), route).await;
        debug!(route = ?route, ?verdict, "Route guard evaluated");
        match verdict {
            GuardVerdict::Allowed => Ok(()),
            GuardVerdict::RedirectToLogin => {
                bail!("{} requires a login. Run `insight login` first.", route.title())
            }
            GuardVerdict::Denied => bail!("Access denied: {} requires the admin role.", route.title()),
            GuardVerdict::Loading => bail!("Session is still loading"),
        }
    }

    /// Report an API failure; a rejected token ends the session after a short grace period
    async fn api_failure(&self, e: ApiError) -> anyhow::Error {
        if e.is_auth_error() {
            eprintln!("Your session is no longer valid. Logging out...");
            let pending = self
                .session
                .schedule_logout(Duration::from_millis(AUTH_ERROR_LOGOUT_DELAY_MS));
            if pending.wait().await {
                eprintln!("Logged out. Run `insight login` to sign in again.");
            }
        } else if e.is_forbidden() {
            return anyhow!("Access denied by the server: {}", e);
        }
        anyhow!(e)
    }

    // =========================================================================
    // Views
    // =========================================================================

    async fn analyze(&self, topic: String, text: Option<String>) -> Result<()> {
        self.enter(Route::Insights).await?;

        let mut request = AnalysisRequest::topic(topic);
        request.text = text;

        println!("Analyzing...");
        match self.api.analyze(&request).await {
            Ok(resp) => {
                println!("{}", format::analysis(&resp));
                Ok(())
            }
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    async fn users(&self, command: UsersCommand) -> Result<()> {
        self.enter(Route::Users).await?;

        let result = match command {
            UsersCommand::List => self.api.list_users().await.map(|users| format::user_table(&users)),
            UsersCommand::Get { id } => self.api.get_user(id).await.map(|user| format::user_detail(&user)),
            UsersCommand::Search { query } => self
                .api
                .search_users(&query)
                .await
                .map(|users| format::user_table(&users)),
            UsersCommand::Create { username, email } => {
                let create = UserCreate {
                    username,
                    email,
                    password: Self::prompt_new_password()?,
                    first_name: None,
                    last_name: None,
                };
                self.api
                    .create_user(&create)
                    .await
                    .map(|user| format!("Created user\n{}", format::user_detail(&user)))
            }
            UsersCommand::Update { id, email } => {
                let update = UserUpdate {
                    email: Some(email),
                    ..Default::default()
                };
                self.api
                    .update_user(id, &update)
                    .await
                    .map(|user| format!("Updated user\n{}", format::user_detail(&user)))
            }
            UsersCommand::Delete { id } => self
                .api
                .delete_user(id)
                .await
                .map(|_| format!("Deleted user {}", id)),
        };

        match result {
            Ok(output) => {
                println!("{}", output);
                Ok(())
            }
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    async fn probe(&self) -> Result<()> {
        self.enter(Route::Dashboard).await?;
        match self.api.probe().await {
            Ok(value) => {
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    /// Hit every check endpoint concurrently and report each outcome
    async fn check(&self) -> Result<()> {
        self.enter(Route::AuthCheck).await?;
        println!("{}\n", format::session_summary(&self.session.snapshot()));

        let calls = AUTH_CHECKS.iter().map(|(name, path, expected)| async move {
            let outcome = self
                .api
                .get::<serde_json::Value>(path, RequestOptions::default())
                .await;
            (*name, *path, *expected, outcome)
        });
        let results = join_all(calls).await;

        let mut auth_error = None;
        for (name, path, expected, outcome) in results {
            match outcome {
                Ok(_) => println!("  SUCCESS      {:<24} {:<24} ({})", name, path, expected),
                Err(e) => {
                    let status = e
                        .status()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    println!(
                        "  ERROR ({:<3}) {:<24} {:<24} ({}) {}",
                        status,
                        name,
                        path,
                        expected,
                        format::truncate_string(&e.message(), 60)
                    );
                    if e.is_auth_error() && auth_error.is_none() {
                        auth_error = Some(e);
                    }
                }
            }
        }

        match auth_error {
            Some(e) => Err(self.api_failure(e).await),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use insight_core::api::{HttpRequest, HttpResponse, Transport};
    use insight_core::auth::{CredentialStore, MemoryStore};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn test_login_failure_messages() {
        assert_eq!(
            App::login_failure_message(&ApiError::Unauthorized),
            "Invalid username or password"
        );
        assert!(App::login_failure_message(&ApiError::Network("operation timed out".into()))
            .starts_with("Connection timed out"));
        assert!(App::login_failure_message(&ApiError::Network("refused".into()))
            .starts_with("Unable to connect"));
        assert_eq!(
            App::login_failure_message(&ApiError::from_status(400, r#"{"error":"Bad credentials"}"#)),
            "Login failed: Bad credentials"
        );
    }

    #[test]
    fn test_auth_checks_cover_public_and_admin() {
        let rules = insight_core::EndpointRules::default().with_public(["/actuator/health"]);
        assert!(rules.is_public(AUTH_CHECKS[0].1));
        assert!(AUTH_CHECKS.iter().skip(1).all(|(_, path, _)| !rules.is_public(path)));
    }

    /// Replays queued responses in order
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<HttpResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                urls: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.urls.lock().unwrap().push(request.url);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| HttpResponse::new(200, "{}")))
        }
    }

    fn app_with(transport: ScriptedTransport) -> (App, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let session = Arc::new(SessionManager::new(CredentialStore::new(Arc::new(MemoryStore::new()))));
        session.restore();
        let api = ApiClient::with_transport("http://api.test", Arc::clone(&session), transport.clone());
        (App::from_parts(Config::default(), session, api), transport)
    }

    const LOGIN_OK: &str = r#"{"token":"tok","username":"alice","roles":["ROLE_USER"],"success":true}"#;

    #[tokio::test(start_paused = true)]
    async fn test_rejected_token_after_login_logs_out() {
        let (app, transport) = app_with(ScriptedTransport::new(vec![
            HttpResponse::new(200, LOGIN_OK),
            HttpResponse::new(401, r#"{"message":"Invalid token"}"#),
        ]));

        let err = app.sign_in_and_confirm("alice", "pw").await.unwrap_err();

        assert!(format!("{:#}", err).contains("rejected the new token"));
        assert!(!app.session.is_authenticated());
        assert_eq!(transport.urls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_token_keeps_session() {
        let (app, transport) = app_with(ScriptedTransport::new(vec![
            HttpResponse::new(200, LOGIN_OK),
            HttpResponse::new(200, r#"{"data":[]}"#),
        ]));

        let session = app.sign_in_and_confirm("alice", "pw").await.unwrap();

        assert_eq!(session.username(), Some("alice"));
        assert!(app.session.is_authenticated());
        assert_eq!(
            *transport.urls.lock().unwrap(),
            vec![
                "http://api.test/api/v1/auth/login".to_string(),
                "http://api.test/api/v1/api/data".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_after_login_keeps_session() {
        let (app, _) = app_with(ScriptedTransport::new(vec![
            HttpResponse::new(200, LOGIN_OK),
            HttpResponse::new(500, r#"{"message":"boom"}"#),
        ]));

        assert!(app.sign_in_and_confirm("alice", "pw").await.is_ok());
        assert!(app.session.is_authenticated());
    }
}

