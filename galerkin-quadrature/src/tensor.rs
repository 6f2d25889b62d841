//! 2D and 3D quadrature rules formed by tensor products of Gauss rules.

use crate::univariate::gauss;
use crate::Rule;

/// A Gauss quadrature rule for the reference quadrilateral `[-1, 1]^2`, with the given number of
/// points per dimension.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let (weights1d, points1d) = gauss(num_points_per_dim);
    let n = weights1d.len();
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (wy, [y]) in weights1d.iter().zip(&points1d) {
        for (wx, [x]) in weights1d.iter().zip(&points1d) {
            weights.push(wx * wy);
            points.push([*x, *y]);
        }
    }

    (weights, points)
}

/// A Gauss quadrature rule for the reference hexahedron `[-1, 1]^3`, with the given number of
/// points per dimension.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Rule<3> {
    let (weights1d, points1d) = gauss(num_points_per_dim);
    let n = weights1d.len();
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    for (wz, [z]) in weights1d.iter().zip(&points1d) {
        for (wy, [y]) in weights1d.iter().zip(&points1d) {
            for (wx, [x]) in weights1d.iter().zip(&points1d) {
                weights.push(wx * wy * wz);
                points.push([*x, *y, *z]);
            }
        }
    }

    (weights, points)
}
