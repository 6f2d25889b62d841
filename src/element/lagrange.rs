//! Tensor-product Lagrange bases on segments, quadrilaterals and hexahedra.

use super::{accumulate_separable, Factor, GeometryType, ReferenceBasis};

/// Linear factor attaining one at `c = ±1` and zero at `-c`.
fn linear_factor(c: f64, x: f64) -> Factor {
    Factor {
        f: 0.5 * (1.0 + c * x),
        df: 0.5 * c,
        ddf: 0.0,
    }
}

/// Quadratic factor attaining one at `c ∈ {-1, 0, 1}` and zero at the two other nodes.
fn quadratic_factor(c: f64, x: f64) -> Factor {
    if c < -0.5 {
        Factor {
            f: 0.5 * x * (x - 1.0),
            df: x - 0.5,
            ddf: 1.0,
        }
    } else if c > 0.5 {
        Factor {
            f: 0.5 * x * (x + 1.0),
            df: x + 0.5,
            ddf: 1.0,
        }
    } else {
        Factor {
            f: 1.0 - x * x,
            df: -2.0 * x,
            ddf: -2.0,
        }
    }
}

pub(super) fn evaluate(geometry: GeometryType, num_nodes: usize, xi: &[f64; 3], basis: &mut ReferenceBasis) {
    let dim = geometry.reference_dim();
    let is_linear = num_nodes == geometry.num_vertices();
    let nodes = &geometry.reference_nodes()[..num_nodes];

    let mut factors = [Factor { f: 0.0, df: 0.0, ddf: 0.0 }; 3];
    for (k, node) in nodes.iter().enumerate() {
        for d in 0..dim {
            factors[d] = if is_linear {
                linear_factor(node[d], xi[d])
            } else {
                quadratic_factor(node[d], xi[d])
            };
        }
        let mut value = 0.0;
        let mut gradient = [0.0; 3];
        let mut hessian = [[0.0; 3]; 3];
        accumulate_separable(1.0, &factors[..dim], &mut value, &mut gradient, &mut hessian);
        basis.set(k, value, &gradient, Some(&hessian));
    }
}
