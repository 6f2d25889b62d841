use galerkin_quadrature::integrate;
use galerkin_quadrature::univariate::gauss;

use matrixcompare::assert_scalar_eq;

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=40 {
        let rule = gauss(n);
        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=(2 * n - 1) as i32 {
            let exact = (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0);
            let estimated = integrate(&rule, |x| x[0].powi(alpha));
            assert_scalar_eq!(estimated, exact, comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn gauss_points_are_sorted_and_symmetric() {
    for n in 1..=15 {
        let (weights, points) = gauss(n);
        assert!(points.windows(2).all(|pair| pair[0][0] < pair[1][0]));
        for i in 0..n {
            assert_scalar_eq!(points[i][0], -points[n - i - 1][0], comp = abs, tol = 1e-14);
            assert_scalar_eq!(weights[i], weights[n - i - 1], comp = abs, tol = 1e-14);
        }
    }
}

#[test]
#[should_panic]
fn gauss_rejects_zero_points() {
    gauss(0);
}
