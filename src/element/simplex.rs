//! Lagrange bases on triangles and tetrahedra in barycentric coordinates.

use super::{GeometryType, ReferenceBasis};

pub(super) fn evaluate(geometry: GeometryType, num_nodes: usize, xi: &[f64; 3], basis: &mut ReferenceBasis) {
    let dim = geometry.reference_dim();
    let num_vertices = geometry.num_vertices();

    // lambda_0 = 1 - sum xi, lambda_i = xi_i
    let mut lambda = [0.0; 4];
    let mut grad_lambda = [[0.0; 3]; 4];
    lambda[0] = 1.0 - xi[..dim].iter().sum::<f64>();
    for d in 0..dim {
        lambda[d + 1] = xi[d];
        grad_lambda[0][d] = -1.0;
        grad_lambda[d + 1][d] = 1.0;
    }

    let outer = |a: &[f64; 3], b: &[f64; 3], scale: f64| {
        let mut h = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                h[i][j] = scale * a[i] * b[j];
            }
        }
        h
    };

    if num_nodes == num_vertices {
        for v in 0..num_vertices {
            basis.set(v, lambda[v], &grad_lambda[v], Some(&[[0.0; 3]; 3]));
        }
        return;
    }

    for v in 0..num_vertices {
        // lambda (2 lambda - 1)
        let value = lambda[v] * (2.0 * lambda[v] - 1.0);
        let gradient = grad_lambda[v].map(|g| (4.0 * lambda[v] - 1.0) * g);
        let hessian = outer(&grad_lambda[v], &grad_lambda[v], 4.0);
        basis.set(v, value, &gradient, Some(&hessian));
    }

    for (e, &[a, b]) in geometry.edges().iter().enumerate() {
        // 4 lambda_a lambda_b
        let value = 4.0 * lambda[a] * lambda[b];
        let mut gradient = [0.0; 3];
        for d in 0..3 {
            gradient[d] = 4.0 * (lambda[a] * grad_lambda[b][d] + lambda[b] * grad_lambda[a][d]);
        }
        let h_ab = outer(&grad_lambda[a], &grad_lambda[b], 4.0);
        let mut hessian = h_ab;
        for i in 0..3 {
            for j in 0..3 {
                hessian[i][j] += h_ab[j][i];
            }
        }
        basis.set(num_vertices + e, value, &gradient, Some(&hessian));
    }
}
