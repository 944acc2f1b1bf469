//! Encrypted session cookies backed by a pluggable session store.
//!
//! A [`SessionManager`] turns the session cookie of an incoming request into a [`Session`]:
//! the cookie value is a token produced by a [`Crypter`] (AES-256-GCM, or AES-256-CTR with a
//! detached HMAC-SHA256), which is authenticated and decrypted to recover the session id. The id
//! is then looked up in a [`SessionStore`]. Handlers mutate the session in memory and call
//! [`Session::save`], which persists the record first and only then stamps a freshly encrypted
//! cookie on the response.
//!
//! A missing, forged, truncated or stale cookie is indistinguishable from a first visit and
//! yields a fresh session rather than an error, unless [`SessionConfig::with_strict`] is set.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use tower_sessions_sealed::{
//!     Crypter, Key, MemoryStore, Session, SessionConfig, SessionManagerLayer,
//! };
//!
//! async fn count(mut session: Session) -> String {
//!     let n: u64 = session.get("n").ok().flatten().unwrap_or(0);
//!     let _ = session.set("n", n + 1);
//!     let _ = session.save().await;
//!     format!("n={n}")
//! }
//!
//! # fn main() -> Result<(), tower_sessions_sealed::Error> {
//! let crypter = Crypter::gcm(&Key::generate())?;
//! let layer = SessionManagerLayer::with_store(MemoryStore::new(), crypter, SessionConfig::default())?;
//! let app: Router = Router::new().route("/", get(count)).layer(layer);
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//! Keys must come from a secret store and be stable across restarts: sessions issued under one
//! key cannot be resolved under another. Each token carries a fresh random nonce, so the same
//! key can safely encrypt any number of cookies.

mod config;
pub mod crypter;
mod error;
#[cfg(feature = "axum-core")]
mod extract;
mod id;
pub mod layer;
mod manager;
pub mod memory;
pub mod sealed;
mod session;
mod store;

pub mod format;

pub use tower_cookies::Key;

pub use crate::config::{
    CookieConfig, DEFAULT_COOKIE_NAME, Expiry, MAX_COOKIE_LIFETIME, SameSite, SessionConfig,
    StorePolicy, TokenMode,
};
pub use crate::crypter::Crypter;
pub use crate::error::{Error, Result};
pub use crate::id::SessionId;
pub use crate::layer::SessionManagerLayer;
pub use crate::manager::SessionManager;
pub use crate::memory::MemoryStore;
pub use crate::sealed::SealedCookies;
pub use crate::session::{Session, SessionState};
pub use crate::store::{SessionRecord, SessionStore};
