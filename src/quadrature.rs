//! Quadrature rules keyed by element geometry.

use crate::element::GeometryType;
use galerkin_quadrature::simplex::{tetrahedron, triangle};
use galerkin_quadrature::tensor::{hexahedron_gauss, quadrilateral_gauss};
use galerkin_quadrature::univariate::gauss;
use galerkin_quadrature::{gauss_points_for_strength, Rule};

/// Errors returned by quadrature construction.
pub use galerkin_quadrature::Error as QuadratureError;

/// A quadrature rule on a reference element, with points padded to three components.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    weights: Vec<f64>,
    points: Vec<[f64; 3]>,
}

impl QuadratureRule {
    /// The rule for zero-dimensional faces: a single point with unit weight.
    pub fn point() -> Self {
        Self {
            weights: vec![1.0],
            points: vec![[0.0; 3]],
        }
    }

    pub fn from_rule<const D: usize>((weights, points): Rule<D>) -> Self {
        let points = points
            .into_iter()
            .map(|p| {
                let mut padded = [0.0; 3];
                padded[..D].copy_from_slice(&p);
                padded
            })
            .collect();
        Self { weights, points }
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64; 3])> {
        self.weights.iter().copied().zip(&self.points)
    }

    /// Approximates the integral of `f` over the reference element.
    pub fn integrate(&self, mut f: impl FnMut(&[f64; 3]) -> f64) -> f64 {
        self.iter().map(|(w, x)| w * f(x)).sum()
    }
}

const GEOMETRIES: [GeometryType; 5] = [
    GeometryType::Segment,
    GeometryType::Triangle,
    GeometryType::Quadrilateral,
    GeometryType::Tetrahedron,
    GeometryType::Hexahedron,
];

fn slot(geometry: GeometryType) -> usize {
    match geometry {
        GeometryType::Segment => 0,
        GeometryType::Triangle => 1,
        GeometryType::Quadrilateral => 2,
        GeometryType::Tetrahedron => 3,
        GeometryType::Hexahedron => 4,
    }
}

/// Volume and face quadrature rules for every supported geometry, all exact for polynomials
/// up to a common strength.
#[derive(Debug, Clone)]
pub struct QuadratureRegistry {
    strength: usize,
    rules: Vec<QuadratureRule>,
    point_rule: QuadratureRule,
}

impl QuadratureRegistry {
    pub fn with_strength(strength: usize) -> Result<Self, QuadratureError> {
        let n = gauss_points_for_strength(strength);
        let rules = GEOMETRIES
            .iter()
            .map(|geometry| {
                Ok(match geometry {
                    GeometryType::Segment => QuadratureRule::from_rule(gauss(n)),
                    GeometryType::Quadrilateral => QuadratureRule::from_rule(quadrilateral_gauss(n)),
                    GeometryType::Hexahedron => QuadratureRule::from_rule(hexahedron_gauss(n)),
                    GeometryType::Triangle => QuadratureRule::from_rule(triangle(strength)?),
                    GeometryType::Tetrahedron => QuadratureRule::from_rule(tetrahedron(strength)?),
                })
            })
            .collect::<Result<Vec<_>, QuadratureError>>()?;
        Ok(Self {
            strength,
            rules,
            point_rule: QuadratureRule::point(),
        })
    }

    pub fn strength(&self) -> usize {
        self.strength
    }

    pub fn volume_rule(&self, geometry: GeometryType) -> &QuadratureRule {
        &self.rules[slot(geometry)]
    }

    /// The rule used on each face of an element of the given geometry.
    pub fn face_rule(&self, geometry: GeometryType) -> &QuadratureRule {
        match geometry.face_geometry() {
            Some(face_geometry) => self.volume_rule(face_geometry),
            None => &self.point_rule,
        }
    }
}
