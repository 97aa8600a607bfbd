//! Idempotency subsystem.
//!
//! # Data Flow
//! ```text
//! POST with X-Idempotency-Key (or derived key):
//!     → middleware.rs: begin_pending(route#tenant, key)
//!         Started          → run handler → complete (2xx) or abandon
//!         Existing(done)   → replay stored response, X-Idempotency-Cached: true
//!         Existing(busy)   → 409 request already processing
//!         Bypassed         → run handler uncached (capacity reached)
//!
//! Background:
//!     → sweeper.rs: hourly removal of expired entries
//! ```
//!
//! # Design Decisions
//! - Keys are scoped by route path and tenant (mine id), so one client key never
//!   collides across operations or tenants
//! - MISS → PENDING happens under the map's entry lock
//! - Single-node only: the store is process memory

pub mod keys;
pub mod middleware;
pub mod store;
pub mod sweeper;

pub use middleware::{idempotency_middleware, IdempotencyLayerState, CACHED_HEADER, IDEMPOTENCY_HEADER};
pub use store::{BeginOutcome, CachedResponse, ExistingEntry, IdempotencyStats, IdempotencyStore, Lookup};
pub use sweeper::IdempotencySweeper;
