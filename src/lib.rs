//! The type-checking core of a dependently typed language.
//!
//! The crate is organised bottom-up:
//!
//! - [`core`] defines the term language: bindings, telescopes, the
//!   [`core::Expr`] sum type, universe sorts, definitions and compiled
//!   elimination trees, together with substitution and the evaluator.
//! - [`elaboration`] provides the services an elaborator calls into while
//!   walking surface syntax: the metavariable registry, the deferred
//!   equation and universe-level solver, and the pattern-match compiler.
//! - [`reporting`] holds the structured diagnostics both layers emit.
//!
//! Surface syntax, name resolution, pretty printing and the driver are
//! external collaborators: terms arrive fully scoped and diagnostics leave
//! as structured values.

pub mod core;
pub mod elaboration;
pub mod reporting;
pub mod source;
pub mod symbol;
