//! Element-local finite element assembly.
//!
//! The library assembles residuals and Jacobians of weak forms element by element. For every
//! element owned by the calling rank it maps the element's DOFs, evaluates the geometric map
//! and the field bases at the quadrature points, runs a [`WeakForm`](assembly::WeakForm)
//! kernel, accumulates boundary fluxes, and scatters the result into a global
//! [`LinearSystem`](assembly::LinearSystem).
//!
//! Jacobians are either provided analytically by the kernel, or extracted from a reverse-mode
//! differentiation tape (see the [`autodiff`] crate) on which the residual is recorded.

pub mod assembly;
pub mod boundary;
pub mod dof;
pub mod element;
pub mod error;
pub mod functional;
pub mod geometry;
pub mod kernels;
pub mod mesh;
pub mod quadrature;
pub mod shape;
pub mod solution;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use galerkin_autodiff as autodiff;

pub use assembly::{Assembler, AssemblyOptions, AssemblyReport};
pub use error::{AssemblyError, SystemError};
