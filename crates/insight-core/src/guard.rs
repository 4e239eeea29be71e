//! Route-level access control.
//!
//! A verdict is recomputed from the current `Session` every time it is
//! needed; nothing is cached between evaluations.

use tokio::sync::watch;

use crate::auth::Session;

/// What a route asks of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteRequirement {
    pub requires_auth: bool,
    pub requires_admin: bool,
}

impl RouteRequirement {
    pub const fn open() -> Self {
        Self {
            requires_auth: false,
            requires_admin: false,
        }
    }

    pub const fn authenticated() -> Self {
        Self {
            requires_auth: true,
            requires_admin: false,
        }
    }

    /// Admin routes always require authentication as well
    pub const fn admin() -> Self {
        Self {
            requires_auth: true,
            requires_admin: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Session restore still running; show a waiting indicator
    Loading,
    /// Not logged in; navigate to the login view instead
    RedirectToLogin,
    /// Logged in without the required role; show access denied in place
    Denied,
    Allowed,
}

impl GuardVerdict {
    /// Evaluate the rules in order; first match wins.
    pub fn evaluate(session: &Session, requirement: RouteRequirement) -> Self {
        if session.is_loading() {
            GuardVerdict::Loading
        } else if requirement.requires_auth && !session.is_authenticated() {
            GuardVerdict::RedirectToLogin
        } else if requirement.requires_admin && !session.is_admin() {
            GuardVerdict::Denied
        } else {
            GuardVerdict::Allowed
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardVerdict::Allowed)
    }
}

/// Views of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Insights,
    Dashboard,
    AuthCheck,
    Users,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Login,
        Route::Insights,
        Route::Dashboard,
        Route::AuthCheck,
        Route::Users,
    ];

    pub fn requirement(&self) -> RouteRequirement {
        match self {
            Route::Login | Route::Insights => RouteRequirement::open(),
            Route::Dashboard | Route::AuthCheck => RouteRequirement::authenticated(),
            Route::Users => RouteRequirement::admin(),
        }
    }

    pub fn to_path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Insights => "/",
            Route::Dashboard => "/dashboard",
            Route::AuthCheck => "/test-auth",
            Route::Users => "/users",
        }
    }

    /// Unknown paths resolve to the insights view
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let trimmed = path.trim_end_matches('/');
        Route::ALL
            .into_iter()
            .find(|route| route.to_path().trim_end_matches('/') == trimmed)
            .unwrap_or(Route::Insights)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Login => "Login",
            Route::Insights => "AI Insights",
            Route::Dashboard => "Dashboard",
            Route::AuthCheck => "Auth Check",
            Route::Users => "Users",
        }
    }

    pub fn verdict(&self, session: &Session) -> GuardVerdict {
        GuardVerdict::evaluate(session, self.requirement())
    }
}

/// Wait until the session is no longer loading, then evaluate `route`.
///
/// Returns `Loading` only if the session manager goes away while still loading.
pub async fn guard_until_settled(mut session: watch::Receiver<Session>, route: Route) -> GuardVerdict {
    let settled = match session.wait_for(|s| !s.is_loading()).await {
        Ok(settled) => Some(route.verdict(&settled)),
        Err(_) => None,
    };
    settled.unwrap_or_else(|| route.verdict(&session.borrow()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserProfile;
    use std::sync::Arc;

    fn member() -> Session {
        Session::authenticated("t".to_string(), UserProfile::new("bob", vec!["ROLE_USER".to_string()]))
    }

    fn admin() -> Session {
        Session::authenticated("t".to_string(), UserProfile::new("root", vec!["ROLE_ADMIN".to_string()]))
    }

    #[test]
    fn test_loading_wins_over_everything() {
        let loading = Session::loading();
        for route in Route::ALL {
            assert_eq!(route.verdict(&loading), GuardVerdict::Loading, "{:?}", route);
        }
        for requirement in [RouteRequirement::open(), RouteRequirement::authenticated(), RouteRequirement::admin()] {
            assert_eq!(GuardVerdict::evaluate(&loading, requirement), GuardVerdict::Loading);
        }
    }

    #[test]
    fn test_unauthenticated_redirects() {
        let session = Session::logged_out();
        assert_eq!(Route::Dashboard.verdict(&session), GuardVerdict::RedirectToLogin);
        // Authentication is checked before the admin role
        assert_eq!(Route::Users.verdict(&session), GuardVerdict::RedirectToLogin);
        assert_eq!(Route::Insights.verdict(&session), GuardVerdict::Allowed);
        assert_eq!(Route::Login.verdict(&session), GuardVerdict::Allowed);
    }

    #[test]
    fn test_non_admin_is_denied_not_redirected() {
        let session = member();
        assert_eq!(Route::Users.verdict(&session), GuardVerdict::Denied);
        assert_eq!(Route::Dashboard.verdict(&session), GuardVerdict::Allowed);
    }

    #[test]
    fn test_admin_allowed_everywhere() {
        let session = admin();
        for route in Route::ALL {
            assert!(route.verdict(&session).is_allowed(), "{:?}", route);
        }
    }

    #[test]
    fn test_admin_only_requirement_without_auth_flag() {
        let requirement = RouteRequirement {
            requires_auth: false,
            requires_admin: true,
        };
        assert_eq!(GuardVerdict::evaluate(&Session::logged_out(), requirement), GuardVerdict::Denied);
    }

    #[test]
    fn test_route_paths() {
        for route in Route::ALL {
            assert_eq!(Route::from_path(route.to_path()), route);
        }
        assert_eq!(Route::from_path("/users/"), Route::Users);
        assert_eq!(Route::from_path("/users?page=2"), Route::Users);
        assert_eq!(Route::from_path("/nowhere"), Route::Insights);
        assert_eq!(Route::from_path(""), Route::Insights);
    }

    #[tokio::test]
    async fn test_guard_until_settled_waits_for_restore() {
        use crate::auth::{CredentialStore, MemoryStore, SessionManager};

        let manager = Arc::new(SessionManager::new(CredentialStore::new(Arc::new(MemoryStore::new()))));
        let rx = manager.subscribe();
        assert_eq!(Route::Users.verdict(&rx.borrow()), GuardVerdict::Loading);

        let waiter = tokio::spawn(guard_until_settled(rx, Route::Users));
        manager.restore();

        assert_eq!(waiter.await.unwrap(), GuardVerdict::RedirectToLogin);
    }

    #[tokio::test]
    async fn test_verdict_follows_session_changes() {
        use crate::auth::{CredentialStore, MemoryStore, SessionManager};

        let manager = SessionManager::new(CredentialStore::new(Arc::new(MemoryStore::new())));
        manager.restore();
        let rx = manager.subscribe();

        manager.login("t", "bob", Vec::new());
        assert_eq!(Route::Users.verdict(&rx.borrow()), GuardVerdict::Denied);

        manager.login("t", "root", vec!["ROLE_ADMIN".to_string()]);
        assert_eq!(Route::Users.verdict(&rx.borrow()), GuardVerdict::Allowed);

        manager.logout();
        assert_eq!(Route::Users.verdict(&rx.borrow()), GuardVerdict::RedirectToLogin);
    }
}
