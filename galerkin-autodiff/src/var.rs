use crate::tape::Tape;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// A scalar whose operations are recorded on a [`Tape`].
///
/// Variables without a tape are constants: arithmetic between constants records nothing.
#[derive(Clone, Copy)]
pub struct Var<'t> {
    value: f64,
    index: Option<usize>,
    tape: Option<&'t Tape>,
}

impl fmt::Debug for Var<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("value", &self.value)
            .field("index", &self.index)
            .finish()
    }
}

impl<'t> Var<'t> {
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            index: None,
            tape: None,
        }
    }

    pub(crate) fn tracked(value: f64, index: usize, tape: &'t Tape) -> Self {
        Self {
            value,
            index: Some(index),
            tape: Some(tape),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Position of the variable on its tape, if it is tracked.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_constant(&self) -> bool {
        self.index.is_none()
    }

    fn unary(self, value: f64, derivative: f64) -> Self {
        match (self.index, self.tape) {
            (Some(index), Some(tape)) => match tape.push(&[(index, derivative)]) {
                Some(result) => Self::tracked(value, result, tape),
                None => Self::constant(value),
            },
            _ => Self::constant(value),
        }
    }

    fn binary(self, other: Self, value: f64, d_self: f64, d_other: f64) -> Self {
        let Some(tape) = self.tape.or(other.tape) else {
            return Self::constant(value);
        };
        let result = match (self.index, other.index) {
            (Some(a), Some(b)) => tape.push(&[(a, d_self), (b, d_other)]),
            (Some(a), None) => tape.push(&[(a, d_self)]),
            (None, Some(b)) => tape.push(&[(b, d_other)]),
            (None, None) => None,
        };
        match result {
            Some(index) => Self::tracked(value, index, tape),
            None => Self::constant(value),
        }
    }

    pub fn sqrt(self) -> Self {
        let value = self.value.sqrt();
        self.unary(value, 0.5 / value)
    }

    pub fn exp(self) -> Self {
        let value = self.value.exp();
        self.unary(value, value)
    }

    pub fn ln(self) -> Self {
        self.unary(self.value.ln(), 1.0 / self.value)
    }

    pub fn sin(self) -> Self {
        self.unary(self.value.sin(), self.value.cos())
    }

    pub fn cos(self) -> Self {
        self.unary(self.value.cos(), -self.value.sin())
    }

    pub fn powi(self, n: i32) -> Self {
        let derivative = if n == 0 {
            0.0
        } else {
            n as f64 * self.value.powi(n - 1)
        };
        self.unary(self.value.powi(n), derivative)
    }

    /// Absolute value, with derivative zero at the kink.
    pub fn abs(self) -> Self {
        let derivative = if self.value > 0.0 {
            1.0
        } else if self.value < 0.0 {
            -1.0
        } else {
            0.0
        };
        self.unary(self.value.abs(), derivative)
    }
}

impl From<f64> for Var<'_> {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl PartialEq for Var<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialOrd for Var<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<'t> Neg for Var<'t> {
    type Output = Var<'t>;

    fn neg(self) -> Self::Output {
        self.unary(-self.value, -1.0)
    }
}

impl<'t> Add for Var<'t> {
    type Output = Var<'t>;

    fn add(self, rhs: Self) -> Self::Output {
        self.binary(rhs, self.value + rhs.value, 1.0, 1.0)
    }
}

impl<'t> Sub for Var<'t> {
    type Output = Var<'t>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.binary(rhs, self.value - rhs.value, 1.0, -1.0)
    }
}

impl<'t> Mul for Var<'t> {
    type Output = Var<'t>;

    fn mul(self, rhs: Self) -> Self::Output {
        self.binary(rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl<'t> Div for Var<'t> {
    type Output = Var<'t>;

    fn div(self, rhs: Self) -> Self::Output {
        let value = self.value / rhs.value;
        self.binary(rhs, value, 1.0 / rhs.value, -value / rhs.value)
    }
}

impl<'t> Add<f64> for Var<'t> {
    type Output = Var<'t>;

    fn add(self, rhs: f64) -> Self::Output {
        self.unary(self.value + rhs, 1.0)
    }
}

impl<'t> Sub<f64> for Var<'t> {
    type Output = Var<'t>;

    fn sub(self, rhs: f64) -> Self::Output {
        self.unary(self.value - rhs, 1.0)
    }
}

impl<'t> Mul<f64> for Var<'t> {
    type Output = Var<'t>;

    fn mul(self, rhs: f64) -> Self::Output {
        self.unary(self.value * rhs, rhs)
    }
}

impl<'t> Div<f64> for Var<'t> {
    type Output = Var<'t>;

    fn div(self, rhs: f64) -> Self::Output {
        self.unary(self.value / rhs, 1.0 / rhs)
    }
}

impl<'t> Add<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn add(self, rhs: Var<'t>) -> Self::Output {
        rhs + self
    }
}

impl<'t> Sub<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn sub(self, rhs: Var<'t>) -> Self::Output {
        rhs.unary(self - rhs.value, -1.0)
    }
}

impl<'t> Mul<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn mul(self, rhs: Var<'t>) -> Self::Output {
        rhs * self
    }
}

impl<'t> Div<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn div(self, rhs: Var<'t>) -> Self::Output {
        let value = self / rhs.value;
        rhs.unary(value, -value / rhs.value)
    }
}

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<'t> $trait for Var<'t> {
            fn $method(&mut self, rhs: Self) {
                *self = *self $op rhs;
            }
        }

        impl<'t> $trait<f64> for Var<'t> {
            fn $method(&mut self, rhs: f64) {
                *self = *self $op rhs;
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, +);
impl_assign_op!(SubAssign, sub_assign, -);
impl_assign_op!(MulAssign, mul_assign, *);
impl_assign_op!(DivAssign, div_assign, /);
