//! Serendipity bases on quadrilaterals (8 nodes) and hexahedra (20 nodes).
//!
//! Corner node with coordinates `c`:
//! `2^-d prod_k (1 + c_k x_k) (sum_k c_k x_k - (d - 1))`.
//! Mid-edge node whose coordinate `m` vanishes:
//! `2^(1-d) (1 - x_m^2) prod_{k != m} (1 + c_k x_k)`.
//!
//! Both are written as sums of separable products so that derivatives follow from
//! the product rule.

use super::{accumulate_separable, Factor, GeometryType, ReferenceBasis};

fn affine(c: f64, x: f64) -> Factor {
    Factor {
        f: 1.0 + c * x,
        df: c,
        ddf: 0.0,
    }
}

pub(super) fn evaluate(geometry: GeometryType, num_nodes: usize, xi: &[f64; 3], basis: &mut ReferenceBasis) {
    let dim = geometry.reference_dim();
    let nodes = &geometry.reference_nodes()[..num_nodes];
    let scale = 0.5f64.powi(dim as i32);

    for (k, node) in nodes.iter().enumerate() {
        let mut value = 0.0;
        let mut gradient = [0.0; 3];
        let mut hessian = [[0.0; 3]; 3];
        let mut factors = [Factor { f: 0.0, df: 0.0, ddf: 0.0 }; 3];

        match (0..dim).find(|&d| node[d] == 0.0) {
            None => {
                for d in 0..dim {
                    factors[d] = affine(node[d], xi[d]);
                }
                // -(d - 1) prod_k (1 + c_k x_k)
                accumulate_separable(
                    -scale * (dim as f64 - 1.0),
                    &factors[..dim],
                    &mut value,
                    &mut gradient,
                    &mut hessian,
                );
                // c_m x_m (1 + c_m x_m) prod_{k != m} (1 + c_k x_k) = (c_m x_m + x_m^2) prod ...
                for m in 0..dim {
                    let (c, x) = (node[m], xi[m]);
                    let mut term = factors;
                    term[m] = Factor {
                        f: c * x + x * x,
                        df: c + 2.0 * x,
                        ddf: 2.0,
                    };
                    accumulate_separable(scale, &term[..dim], &mut value, &mut gradient, &mut hessian);
                }
            }
            Some(m) => {
                for d in 0..dim {
                    factors[d] = if d == m {
                        Factor {
                            f: 1.0 - xi[d] * xi[d],
                            df: -2.0 * xi[d],
                            ddf: -2.0,
                        }
                    } else {
                        affine(node[d], xi[d])
                    };
                }
                accumulate_separable(2.0 * scale, &factors[..dim], &mut value, &mut gradient, &mut hessian);
            }
        }

        basis.set(k, value, &gradient, Some(&hessian));
    }
}
