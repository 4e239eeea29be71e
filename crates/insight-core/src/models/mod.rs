//! Data models for the AI Insight backend API.
//!
//! - `AuthRequest`, `AuthResponse`: login exchange
//! - `AnalysisRequest`, `AnalysisResponse`, `Recommendation`: AI insights
//! - `User`, `UserCreate`, `UserUpdate`: admin user management

pub mod auth;
pub mod insight;
pub mod user;

pub use auth::{AuthRequest, AuthResponse};
pub use insight::{AnalysisRequest, AnalysisResponse, Recommendation};
pub use user::{User, UserCreate, UserUpdate};
