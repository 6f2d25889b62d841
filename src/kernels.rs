//! Weak forms shipped with the library.

mod boussinesq;
mod poisson;

pub use boussinesq::{BoussinesqKernel, BoussinesqParameters};
pub use poisson::PoissonKernel;
