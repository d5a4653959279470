//! Error taxonomy for the reactive graph (§2 of SPEC_FULL.md, grounded on
//! `thiserror`, the dependency three other repos in the retrieval pack pull
//! in for the same job).
//!
//! `GraphError` covers conditions the spec calls invariant violations —
//! these are programmer errors in how the graph is used, not data the caller
//! should route around, so the public helpers that can hit them panic with
//! the `Display` message rather than returning a `Result`. `ScopeError`
//! covers the subset of scope misuse that a caller can reasonably recover
//! from and so is surfaced as `Result`.

use thiserror::Error;

/// Invariant violations in the dependency graph itself. These indicate a bug
/// in this crate (or in `unsafe`-adjacent misuse of raw keys) rather than
/// anything a caller provoked through normal API use.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cyclic dependency detected while propagating updates")]
    CyclicDependency,
}

/// Recoverable misuse of an [`crate::scope::EffectScope`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ScopeError {
    #[error("scope is already disposed")]
    ScopeDisposed,
}
