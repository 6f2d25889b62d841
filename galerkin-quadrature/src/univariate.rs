//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::Rule;
use std::f64::consts::PI;

/// Legendre polynomial `p_n` and its predecessor evaluated at a point in `(-1, 1)`.
#[derive(Debug, Clone, Copy)]
struct Legendre {
    n: usize,
    x: f64,
    p_n: f64,
    p_prev: f64,
}

impl Legendre {
    fn at(n: usize, x: f64) -> Self {
        // m P_m(x) = (2m - 1) x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let (mut p_n, mut p_prev) = (1.0, 0.0);
        for m in 1..=n {
            let m = m as f64;
            let p_next = ((2.0 * m - 1.0) * x * p_n - (m - 1.0) * p_prev) / m;
            p_prev = p_n;
            p_n = p_next;
        }
        Self { n, x, p_n, p_prev }
    }

    /// Derivative via `p_n'(x) = n (x p_n(x) - p_{n - 1}(x)) / (x^2 - 1)`, undefined at `|x| = 1`.
    fn derivative(&self) -> f64 {
        let n = self.n as f64;
        n * (self.x * self.p_n - self.p_prev) / (self.x * self.x - 1.0)
    }
}

/// Gauss-Legendre quadrature for the reference interval `[-1, 1]`.
///
/// With `n` points the rule integrates polynomials of degree up to `2n - 1` exactly.
/// Points are returned in ascending order.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let half = (n + 1) / 2;
    let mut lower = Vec::with_capacity(half);

    for i in 0..half {
        // Chebyshev-like initial guess for the i-th largest root
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut poly = Legendre::at(n, x);
        for _ in 0..100 {
            let dx = -poly.p_n / poly.derivative();
            x += dx;
            poly = Legendre::at(n, x);
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        let dp = poly.derivative();
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        // Roots are found from the right, mirror them into the left half
        lower.push((-x, w));
    }

    let mut weights = Vec::with_capacity(n);
    let mut points = Vec::with_capacity(n);
    for &(x, w) in &lower {
        points.push([x]);
        weights.push(w);
    }
    // For odd n the middle root is shared between both halves
    let skip = n % 2;
    for &(x, w) in lower.iter().rev().skip(skip) {
        points.push([-x]);
        weights.push(w);
    }

    debug_assert_eq!(points.len(), n);
    (weights, points)
}
