//! REST API gateway for the AI Insight backend.
//!
//! Every HTTP call goes through `ApiClient::request`, which decides whether
//! the endpoint is public, attaches the session's bearer token otherwise, and
//! turns non-2xx responses into an `ApiError`.
//!
//! The backend authenticates with `Authorization: Bearer <jwt>` headers
//! obtained from `POST /api/v1/auth/login`.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod resources;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, RequestOptions};
pub use endpoints::EndpointRules;
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
