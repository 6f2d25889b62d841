//! Quadrature rules for finite element reference domains.
//!
//! Reference domains follow these conventions:
//!
//! - the interval, quadrilateral and hexahedron are `[-1, 1]^d`,
//! - the triangle is the unit simplex with vertices `(0, 0)`, `(1, 0)`, `(0, 1)`,
//! - the tetrahedron is the unit simplex with vertices at the origin and the unit vectors.
//!
//! Rules are returned as a pair of weights and points, in that order.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable => {
                write!(
                    f,
                    "There is no quadrature rule satisfying the requirements available"
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// The number of Gauss points per direction needed to integrate polynomials of degree
/// `strength` exactly.
pub fn gauss_points_for_strength(strength: usize) -> usize {
    strength / 2 + 1
}

/// Integrates the given function with the given quadrature rule.
///
/// # Panics
///
/// Panics if the number of weights and points differ.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl FnMut(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    assert_eq!(weights.len(), points.len(), "weights and points must have the same length");
    let mut f = f;
    weights
        .iter()
        .zip(points)
        .map(|(w, x)| w * f(x))
        .sum()
}
