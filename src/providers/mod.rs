//! Upstream provider clients.
//!
//! # Responsibilities
//! - One client per provider product: VAHAN, NIC eWay, Whitebooks eWay, Whitebooks eInvoice
//! - Provider handshakes behind the `Authenticator` trait
//! - Decode heterogeneous provider envelopes into `ProviderResponse`
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → client.operation()          (single attempt)
//!         → SessionManager::ensure_authenticated()
//!         → EnvelopeCodec::seal()    (VAHAN, NIC)
//!         → transport.rs             (reqwest, error classification)
//!         → response.rs              (ResponseShape → ProviderResponse)
//! ```
//!
//! # Design Decisions
//! - Clients make exactly one attempt; retries and breakers belong to the dispatcher
//! - A 401 on an authorized call invalidates the cached session
//! - Response quirks are `ResponseShape` data, decoded by one generic function

pub mod clock;
pub mod envelope;
pub mod nic;
pub mod response;
pub mod transport;
pub mod vahan;
pub mod whitebooks;

pub use envelope::{EnvelopeCodec, PlainEnvelope, SealedEnvelope};
pub use nic::NicEwayClient;
pub use response::{ProviderResponse, ResponseShape};
pub use transport::{HttpReply, Transport};
pub use vahan::VahanClient;
pub use whitebooks::{WhitebooksClient, WhitebooksProduct};
