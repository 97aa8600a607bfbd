//! Provider credential subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher call:
//!     → SessionManager::ensure_authenticated()
//!         valid session      → return it
//!         refresh in flight  → join the shared refresh
//!         otherwise          → Authenticator::authenticate() once, shared by all waiters
//! ```
//!
//! # Design Decisions
//! - One `SessionManager` per provider product, nothing shared between them
//! - The refresh handle is a `Shared` future behind a mutex that is never held across an await
//! - Provider handshakes live beside each provider's client, behind the `Authenticator` trait

pub mod session;

pub use session::{Authenticator, Credential, Grant, Session, SessionManager};
