//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `KeyValueStore` backends (`FileStore`, `KeyringStore`, `MemoryStore`)
//! - `CredentialStore`: the token and profile entries on top of a backend
//! - `SessionManager`: the single owner of the in-memory `Session`
//!
//! The token and the profile are persisted as two independent entries, so a
//! restore has to cope with either one being missing or unreadable.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::CredentialStore;
pub use session::{redact_token, PendingLogout, Session, SessionManager, UserProfile, ADMIN_ROLE};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
