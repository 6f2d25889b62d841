use galerkin_autodiff::calculus::{approximate_jacobian_fd, VectorFunctionBuilder};
use galerkin_autodiff::{Tape, TapeError, TapeScalar, Var};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;

/// A small nonlinear residual written once for both scalar types.
fn residual<T: TapeScalar>(x: &[T]) -> Vec<T> {
    let (a, b, c) = (x[0], x[1], x[2]);
    vec![
        a * b + c.sin() * 2.0,
        (a * a + b * b + 1.0).sqrt() - c / (b * b + 2.0),
        (a * c).exp() * 0.5 + b.powi(3) - a.abs(),
    ]
}

fn residual_f64(x: &[f64]) -> DVector<f64> {
    DVector::from_vec(residual(x))
}

fn tape_jacobian(tape: &Tape, x: &[f64]) -> DMatrix<f64> {
    let recording = tape.new_recording().unwrap();
    let independents: Vec<_> = x.iter().map(|&v| recording.independent(v)).collect();
    let dependents = residual(&independents);
    let mut jacobian = DMatrix::zeros(dependents.len(), independents.len());
    recording
        .jacobian_into(&dependents, &independents, &mut jacobian)
        .unwrap();
    jacobian
}

#[test]
fn jacobian_of_product_and_quotient() {
    let tape = Tape::new();
    let recording = tape.new_recording().unwrap();
    let x = recording.independent(3.0);
    let y = recording.independent(2.0);
    let f = x * y;
    let g = x / y - 1.0;

    let mut jacobian = DMatrix::zeros(2, 2);
    recording.jacobian_into(&[f, g], &[x, y], &mut jacobian).unwrap();

    assert_scalar_eq!(f.value(), 6.0);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2, &[
        2.0, 3.0,
        0.5, -0.75]);
    assert_matrix_eq!(jacobian, expected, comp = abs, tol = 1e-14);
}

#[test]
fn constant_dependents_give_zero_rows() {
    let tape = Tape::new();
    let recording = tape.new_recording().unwrap();
    let x = recording.independent(1.5);
    let constant = Var::constant(4.0) * 2.0;
    let mut jacobian = DMatrix::repeat(2, 1, 7.0);
    recording
        .jacobian_into(&[constant, x * 2.0], &[x], &mut jacobian)
        .unwrap();
    assert_eq!(jacobian, DMatrix::from_row_slice(2, 1, &[0.0, 2.0]));
}

#[test]
fn jacobian_dimension_mismatch_is_an_error() {
    let tape = Tape::new();
    let recording = tape.new_recording().unwrap();
    let x = recording.independent(1.0);
    let mut jacobian = DMatrix::zeros(2, 1);
    let err = recording
        .jacobian_into(&[x * x], &[x], &mut jacobian)
        .unwrap_err();
    assert_eq!(
        err,
        TapeError::DimensionMismatch {
            expected: (1, 1),
            actual: (2, 1)
        }
    );
}

#[test]
fn non_independent_or_repeated_variables_are_rejected() {
    let tape = Tape::new();
    let recording = tape.new_recording().unwrap();
    let x = recording.independent(1.0);
    let y = x * 2.0;
    let mut jacobian = DMatrix::zeros(1, 2);

    let err = recording.jacobian_into(&[y], &[x, y], &mut jacobian).unwrap_err();
    assert_eq!(err, TapeError::UnknownIndependent { position: 1 });

    let err = recording.jacobian_into(&[y], &[x, x], &mut jacobian).unwrap_err();
    assert_eq!(err, TapeError::UnknownIndependent { position: 1 });
}

#[test]
fn only_one_recording_at_a_time() {
    let tape = Tape::new();
    let recording = tape.new_recording().unwrap();
    assert_eq!(tape.new_recording().unwrap_err(), TapeError::AlreadyRecording);
    drop(recording);
    assert!(tape.new_recording().is_ok());
}

#[test]
fn dropping_a_recording_clears_the_tape() {
    let tape = Tape::new();
    {
        let recording = tape.new_recording().unwrap();
        let x = recording.independent(2.0);
        let _ = x * x + x.exp();
        assert!(tape.len() > 0);
    }
    assert!(tape.is_empty());
    assert!(tape.peak_len() >= 4);
}

#[test]
fn paused_tape_does_not_grow() {
    let tape = Tape::new();
    tape.pause_recording();
    let recording = tape.new_recording().unwrap();
    let x = recording.independent(2.0);
    let mut accumulated = x;
    for _ in 0..100 {
        accumulated = accumulated * x + 1.0;
    }
    assert!(accumulated.is_constant());
    assert_eq!(tape.len(), 0);

    let mut jacobian = DMatrix::zeros(1, 1);
    let err = recording
        .jacobian_into(&[accumulated], &[x], &mut jacobian)
        .unwrap_err();
    assert_eq!(err, TapeError::NotRecording);
}

#[test]
fn rerecording_reproduces_the_same_jacobian() {
    let tape = Tape::new();
    let x = [0.3, -1.2, 0.7];
    let first = tape_jacobian(&tape, &x);
    assert!(tape.is_empty());
    let second = tape_jacobian(&tape, &x);
    assert_eq!(first, second);
}

proptest! {
    #[test]
    fn tape_jacobian_matches_finite_differences(
        a in -2.0..2.0f64,
        b in -2.0..2.0f64,
        c in -2.0..2.0f64,
    ) {
        // Keep away from the kink of |a|
        prop_assume!(a.abs() > 1e-3);
        let tape = Tape::new();
        let x = [a, b, c];
        let jacobian = tape_jacobian(&tape, &x);

        let f = VectorFunctionBuilder::with_dimension(3)
            .with_function(|f, x| {
                let x: Vec<f64> = x.iter().copied().collect();
                f.copy_from(&residual_f64(&x));
            });
        let fd = approximate_jacobian_fd(f, &DVector::from_column_slice(&x), 1e-6);

        let scale = 1.0 + fd.amax();
        prop_assert!((jacobian - fd).amax() / scale < 1e-6);
    }
}
