//! Error types for element-local assembly and the global system.

use crate::assembly::CommunicationError;
use galerkin_autodiff::TapeError;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors raised while assembling a single element.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AssemblyError {
    /// The geometric map of an element is not invertible (or inverted) at a quadrature point.
    ///
    /// This indicates corrupt mesh geometry and aborts the assembly pass.
    DegenerateJacobian { element: usize, determinant: f64 },
    /// A field name was not found in the field layout.
    UnknownField(String),
    /// A field name appears more than once in a layout.
    DuplicateField(String),
    /// A buffer or index set does not have the size implied by the element's DOF layout.
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A kernel selected analytic Jacobians but does not provide them.
    MissingAnalyticJacobian,
    /// Geometry must be represented by a continuous discretization.
    DiscontinuousGeometry,
    /// Recording or extracting derivatives failed.
    Tape(TapeError),
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegenerateJacobian { element, determinant } => write!(
                f,
                "degenerate Jacobian (determinant {determinant:e}) in element {element}"
            ),
            Self::UnknownField(name) => write!(f, "unknown field \"{name}\""),
            Self::DuplicateField(name) => write!(f, "field \"{name}\" is defined more than once"),
            Self::DimensionMismatch {
                context,
                expected,
                actual,
            } => write!(f, "{context}: expected size {expected}, got {actual}"),
            Self::MissingAnalyticJacobian => {
                write!(f, "kernel requests analytic Jacobians but does not implement them")
            }
            Self::DiscontinuousGeometry => {
                write!(f, "geometry requires a continuous discretization")
            }
            Self::Tape(err) => write!(f, "automatic differentiation failed: {err}"),
        }
    }
}

impl std::error::Error for AssemblyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tape(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TapeError> for AssemblyError {
    fn from(err: TapeError) -> Self {
        Self::Tape(err)
    }
}

/// Which global object an operation refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SystemPart {
    Residual,
    Jacobian,
}

impl Display for SystemPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Residual => write!(f, "residual"),
            Self::Jacobian => write!(f, "Jacobian"),
        }
    }
}

/// Errors raised by the global linear system.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SystemError {
    /// The entry `(row, col)` is not part of the sparsity pattern.
    MissingEntry { row: usize, col: usize },
    /// A global index is outside the system.
    IndexOutOfBounds { index: usize, size: usize },
    /// The given part was accessed before it was closed.
    NotFinalized(SystemPart),
    /// The given part was closed twice or modified after closing.
    AlreadyFinalized(SystemPart),
    /// Local block dimensions do not match the index set.
    BlockDimensionMismatch { indices: usize, rows: usize, cols: usize },
    /// The sparsity pattern could not be built from the exchanged entries.
    InvalidPattern(String),
    /// A collective operation at a close barrier failed.
    Communication(CommunicationError),
}

impl Display for SystemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntry { row, col } => {
                write!(f, "entry ({row}, {col}) is not in the sparsity pattern")
            }
            Self::IndexOutOfBounds { index, size } => {
                write!(f, "global index {index} out of bounds for system of size {size}")
            }
            Self::NotFinalized(part) => write!(f, "{part} accessed before it was closed"),
            Self::AlreadyFinalized(part) => write!(f, "{part} is already closed"),
            Self::BlockDimensionMismatch { indices, rows, cols } => write!(
                f,
                "local block of size {rows}x{cols} does not match {indices} indices"
            ),
            Self::InvalidPattern(reason) => write!(f, "invalid sparsity pattern: {reason}"),
            Self::Communication(err) => write!(f, "communication failed: {err}"),
        }
    }
}

impl std::error::Error for SystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Communication(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommunicationError> for SystemError {
    fn from(err: CommunicationError) -> Self {
        Self::Communication(err)
    }
}
