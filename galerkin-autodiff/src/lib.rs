//! Reverse-mode automatic differentiation for element-local Jacobians.
//!
//! A [`Tape`] is an explicit context object. Kernels tag their unknowns as independent variables
//! through a scoped [`Recording`], evaluate their residual with ordinary arithmetic on [`Var`]s,
//! and finally extract the dense Jacobian of the residual entries with respect to the unknowns.
//! Dropping the recording clears the tape, so every element starts from an empty trace.
//!
//! Code that should run both with and without derivative tracking is written against the
//! [`TapeScalar`] trait, which is implemented by both `f64` and [`Var`].

/// Numerical differentiation helpers for validating tape derivatives
pub mod calculus;
mod scalar;
mod tape;
mod var;

pub use scalar::TapeScalar;
pub use tape::{Recording, Tape, TapeError};
pub use var::Var;
