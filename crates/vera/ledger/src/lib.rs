//! Vera Ledger - append-only sequence of hash-chained entries per tenant.
//!
//! The ledger store is the leaf dependency of the governance layer: every
//! approval decision, binding transition, and bundle export lands here as
//! an immutable entry. Sequence assignment and hash chaining happen inside
//! the append operation itself, never precomputed by callers, so the chain
//! cannot race against sequence allocation.
//!
//! Design stance, mirrored from the rest of the platform:
//! - the in-memory adapter is the deterministic test reference;
//! - PostgreSQL (behind the `postgres` feature) is the transactional
//!   source of truth, with the append executing inside one transaction
//!   holding a per-tenant lock.

#![deny(unsafe_code)]

mod error;
mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::LedgerError;
pub use memory::InMemoryLedger;
pub use model::{AppendRequest, LedgerStatistics, TailExpectation};
pub use traits::LedgerStore;
