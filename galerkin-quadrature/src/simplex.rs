//! Quadrature rules for the unit triangle and tetrahedron.
//!
//! The rules are obtained by collapsing a tensor-product Gauss rule on the unit cube onto the
//! simplex (the Duffy transformation). They have positive weights and all points in the interior,
//! at the cost of more points than optimal symmetric rules.

use crate::univariate::gauss;
use crate::{Error, Rule};

/// Highest polynomial strength for which simplex rules are provided.
pub const MAX_SIMPLEX_STRENGTH: usize = 30;

/// Gauss rule mapped to `[0, 1]`.
fn unit_interval_gauss(num_points: usize) -> (Vec<f64>, Vec<f64>) {
    let (weights, points) = gauss(num_points);
    let points = points.iter().map(|[x]| 0.5 * (x + 1.0)).collect();
    let weights = weights.iter().map(|w| 0.5 * w).collect();
    (weights, points)
}

fn points_per_direction(strength: usize) -> Result<usize, Error> {
    if strength > MAX_SIMPLEX_STRENGTH {
        return Err(Error::NoRuleAvailable);
    }
    // The collapse adds up to two polynomial degrees in the collapsed directions
    Ok(strength / 2 + 2)
}

/// A quadrature rule for the unit triangle that integrates polynomials of total degree up to
/// `strength` exactly.
///
/// The weights sum to `1/2`, the area of the reference triangle.
pub fn triangle(strength: usize) -> Result<Rule<2>, Error> {
    let n = points_per_direction(strength)?;
    let (w1d, x1d) = unit_interval_gauss(n);
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (wv, v) in w1d.iter().zip(&x1d) {
        for (wu, u) in w1d.iter().zip(&x1d) {
            // (u, v) -> (u (1 - v), v) has Jacobian determinant (1 - v)
            points.push([u * (1.0 - v), *v]);
            weights.push(wu * wv * (1.0 - v));
        }
    }

    Ok((weights, points))
}

/// A quadrature rule for the unit tetrahedron that integrates polynomials of total degree up to
/// `strength` exactly.
///
/// The weights sum to `1/6`, the volume of the reference tetrahedron.
pub fn tetrahedron(strength: usize) -> Result<Rule<3>, Error> {
    let n = points_per_direction(strength)?;
    let (w1d, x1d) = unit_interval_gauss(n);
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    for (ww, w) in w1d.iter().zip(&x1d) {
        for (wv, v) in w1d.iter().zip(&x1d) {
            for (wu, u) in w1d.iter().zip(&x1d) {
                let xi = u * (1.0 - v) * (1.0 - w);
                let eta = v * (1.0 - w);
                let zeta = *w;
                let det = (1.0 - v) * (1.0 - w) * (1.0 - w);
                points.push([xi, eta, zeta]);
                weights.push(wu * wv * ww * det);
            }
        }
    }

    Ok((weights, points))
}
