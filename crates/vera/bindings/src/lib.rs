//! Vera Bindings - the runtime binding lifecycle.
//!
//! A binding is the live activation of an approved policy instance against
//! a workspace or partner scope. Activation is gated on an approved
//! decision from the review layer; every lifecycle transition lands in the
//! ledger. Violations are counted monotonically and can trip an optional
//! auto-suspend threshold.

#![deny(unsafe_code)]

mod error;
mod manager;

pub use error::BindingError;
pub use manager::BindingManager;
