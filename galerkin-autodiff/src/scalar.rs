use crate::var::Var;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Scalar type used by kernels that run both with plain floating-point numbers and with
/// tape-tracked variables.
///
/// Mixed arithmetic is available with `f64` on the right-hand side, so generic code writes
/// `x * 2.0` rather than `2.0 * x`.
pub trait TapeScalar:
    Copy
    + Debug
    + From<f64>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + AddAssign
    + SubAssign
    + AddAssign<f64>
    + SubAssign<f64>
    + MulAssign<f64>
{
    fn value(&self) -> f64;

    fn zero() -> Self {
        Self::from(0.0)
    }

    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn abs(self) -> Self;
}

impl TapeScalar for f64 {
    fn value(&self) -> f64 {
        *self
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }
}

impl TapeScalar for Var<'_> {
    fn value(&self) -> f64 {
        Var::value(self)
    }

    fn sqrt(self) -> Self {
        Var::sqrt(self)
    }

    fn exp(self) -> Self {
        Var::exp(self)
    }

    fn ln(self) -> Self {
        Var::ln(self)
    }

    fn sin(self) -> Self {
        Var::sin(self)
    }

    fn cos(self) -> Self {
        Var::cos(self)
    }

    fn powi(self, n: i32) -> Self {
        Var::powi(self, n)
    }

    fn abs(self) -> Self {
        Var::abs(self)
    }
}
