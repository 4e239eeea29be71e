//! Client core for the AI Insight dashboard.
//!
//! This crate holds everything the dashboard front ends share:
//! - `auth`: credential storage and the `SessionManager`
//! - `api`: the `ApiClient` gateway every HTTP call flows through
//! - `guard`: route-level access decisions derived from the session
//! - `models`: request/response types for the backend API
//! - `config`: persisted client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use api::{ApiClient, ApiError, EndpointRules, RequestOptions};
pub use auth::{CredentialStore, PendingLogout, Session, SessionManager, UserProfile};
pub use config::Config;
pub use guard::{GuardVerdict, Route, RouteRequirement};
