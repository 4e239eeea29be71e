use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::CredentialStore;

/// Role that grants access to admin-only views
pub const ADMIN_ROLE: &str = "ROLE_ADMIN";

/// Username used when a token is present but the stored profile is unusable
const FALLBACK_USERNAME: &str = "user";

/// Number of token characters kept when a token is logged
const TOKEN_LOG_PREFIX: usize = 8;

/// Shorten a token for logs and debug output
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_LOG_PREFIX).collect();
    if prefix.len() < token.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub roles: Vec<String>,
}

impl UserProfile {
    pub fn new(username: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            username: username.into(),
            roles,
        }
    }

    /// Profile used when the stored one is missing or corrupt
    pub fn fallback() -> Self {
        Self::new(FALLBACK_USERNAME, Vec::new())
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ADMIN_ROLE)
    }

    /// Parse a stored profile entry.
    ///
    /// A null or empty username becomes "user" and missing roles become
    /// empty; anything that is not a JSON object of that shape is an error.
    pub fn parse_stored(raw: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct StoredProfile {
            #[serde(default)]
            username: Option<String>,
            #[serde(default)]
            roles: Option<Vec<String>>,
        }

        let stored: StoredProfile = serde_json::from_str(raw)?;
        let username = stored
            .username
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_USERNAME.to_string());
        Ok(Self::new(username, stored.roles.unwrap_or_default()))
    }
}

/// Current authentication state.
///
/// Fields are private: a session is either loading, logged out, or
/// authenticated with a token and profile. `is_admin` is always derived
/// from the profile's roles.
///
/// `epoch` is assigned by `SessionManager` and counts login/logout
/// transitions; free-standing sessions start at 0.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    user: Option<UserProfile>,
    loading: bool,
    epoch: u64,
}

impl Session {
    /// State before the first restore completes
    pub fn loading() -> Self {
        Self {
            token: None,
            user: None,
            loading: true,
            epoch: 0,
        }
    }

    pub fn logged_out() -> Self {
        Self {
            token: None,
            user: None,
            loading: false,
            epoch: 0,
        }
    }

    pub fn authenticated(token: String, user: UserProfile) -> Self {
        Self {
            token: Some(token),
            user: Some(user),
            loading: false,
            epoch: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(UserProfile::is_admin).unwrap_or(false)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("is_authenticated", &self.is_authenticated())
            .field("token", &self.token.as_deref().map(redact_token))
            .field("user", &self.user)
            .field("is_admin", &self.is_admin())
            .field("loading", &self.loading)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Owner of the in-memory `Session` and its persisted credentials.
///
/// All transitions go through `restore`, `login` and `logout`. Each one
/// publishes the new session on a watch channel before returning, so
/// subscribers and `snapshot()` never observe a stale value afterwards.
///
/// The epoch counts login/logout transitions and travels inside the
/// published `Session`, so a token and the epoch it belongs to are always
/// read together. Work started under one epoch (an in-flight request, a
/// deferred logout) can detect that the session it belonged to is gone.
pub struct SessionManager {
    store: CredentialStore,
    state: watch::Sender<Session>,
}

impl SessionManager {
    pub fn new(store: CredentialStore) -> Self {
        let (state, _) = watch::channel(Session::loading());
        Self { store, state }
    }

    /// Rebuild the session from the credential store.
    ///
    /// Never fails: unreadable storage counts as "no token", and a token
    /// with an unusable profile gets the fallback profile.
    pub fn restore(&self) -> Session {
        let token = match self.store.token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token, treating as logged out");
                None
            }
        };

        let session = match token {
            None => {
                debug!("No stored token found");
                Session::logged_out()
            }
            Some(token) => {
                let profile = self.restore_profile();
                debug!(
                    token = %redact_token(&token),
                    username = %profile.username,
                    is_admin = profile.is_admin(),
                    "Session restored from storage"
                );
                Session::authenticated(token, profile)
            }
        };

        self.publish(session, false)
    }

    fn restore_profile(&self) -> UserProfile {
        let raw = match self.store.profile() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!("Token present without a stored profile, using fallback profile");
                return UserProfile::fallback();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored profile, using fallback profile");
                return UserProfile::fallback();
            }
        };

        match UserProfile::parse_stored(&raw) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Stored profile is malformed, using fallback profile");
                UserProfile::fallback()
            }
        }
    }

    /// Persist the credentials, then replace the session.
    pub fn login(&self, token: impl Into<String>, username: impl Into<String>, roles: Vec<String>) {
        let token = token.into();
        let profile = UserProfile::new(username, roles);

        match serde_json::to_string(&profile) {
            Ok(profile_json) => {
                if let Err(e) = self.store.store(&token, &profile_json) {
                    warn!(error = %e, "Failed to persist credentials");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize profile"),
        }

        info!(
            username = %profile.username,
            roles = ?profile.roles,
            is_admin = profile.is_admin(),
            "Logged in"
        );

        self.publish(Session::authenticated(token, profile), true);
    }

    /// Clear the credentials, then replace the session with the logged-out
    /// state. Safe to call when already logged out.
    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }

        let was_authenticated = self.state.borrow().is_authenticated();
        if was_authenticated {
            info!("Logged out");
        } else {
            debug!("Logout called without an active session");
        }

        self.publish(Session::logged_out(), true);
    }

    /// Log out after `delay`, unless the session changes first.
    ///
    /// A login or logout before the timer fires supersedes the pending
    /// logout; `PendingLogout::cancel` stops it explicitly.
    pub fn schedule_logout(self: &Arc<Self>, delay: Duration) -> PendingLogout {
        let manager = Arc::clone(self);
        let scheduled_epoch = self.epoch();
        debug!(delay_ms = delay.as_millis() as u64, epoch = scheduled_epoch, "Logout scheduled");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if manager.epoch() != scheduled_epoch {
                debug!(
                    scheduled_epoch,
                    current_epoch = manager.epoch(),
                    "Scheduled logout superseded by a newer session"
                );
                return false;
            }
            manager.logout();
            true
        });

        PendingLogout { handle }
    }

    /// Current session
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver notified after every transition
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token().map(str::to_string)
    }

    /// Current token together with the epoch it was issued under
    pub fn token_with_epoch(&self) -> (Option<String>, u64) {
        let session = self.state.borrow();
        (session.token().map(str::to_string), session.epoch())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch()
    }

    /// Replace the session under the channel's write lock, optionally
    /// starting a new epoch, and return what was published.
    fn publish(&self, mut session: Session, new_epoch: bool) -> Session {
        self.state.send_modify(|current| {
            session.epoch = if new_epoch { current.epoch + 1 } else { current.epoch };
            *current = session.clone();
        });
        session
    }
}

/// Handle to a logout scheduled with `SessionManager::schedule_logout`.
///
/// Dropping the handle leaves the timer running.
pub struct PendingLogout {
    handle: JoinHandle<bool>,
}

impl PendingLogout {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait for the timer. Returns whether the logout actually ran.
    pub async fn wait(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}
