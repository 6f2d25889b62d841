use crate::var::Var;
use log::trace;
use nalgebra::DMatrix;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors produced when recording or extracting derivatives.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TapeError {
    /// A recording was requested while another recording on the same tape is still alive.
    AlreadyRecording,
    /// Derivatives were requested while recording is paused.
    NotRecording,
    /// The output matrix does not have the shape `dependents x independents`.
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// The variable at the given position in the independent set was not registered as an
    /// independent variable, or appears more than once.
    UnknownIndependent { position: usize },
}

impl Display for TapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRecording => write!(f, "a recording is already active on this tape"),
            Self::NotRecording => write!(f, "derivatives requested while recording is paused"),
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "Jacobian has dimensions {}x{}, expected {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            Self::UnknownIndependent { position } => write!(
                f,
                "independent variable at position {position} is not a distinct registered independent"
            ),
        }
    }
}

impl std::error::Error for TapeError {}

/// One recorded operation: the indices of its (at most two) operands and the local partial
/// derivatives with respect to them. Independent variables have no operands.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
    operands: [(usize, f64); 2],
    arity: u8,
}

impl Node {
    fn operands(&self) -> &[(usize, f64)] {
        &self.operands[..self.arity as usize]
    }
}

/// A reverse-mode differentiation tape.
///
/// The tape is not thread safe and holds at most one [`Recording`] at a time.
#[derive(Debug)]
pub struct Tape {
    nodes: RefCell<Vec<Node>>,
    recording_enabled: Cell<bool>,
    active: Cell<bool>,
    peak_len: Cell<usize>,
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Tape {
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            recording_enabled: Cell::new(true),
            active: Cell::new(false),
            peak_len: Cell::new(0),
        }
    }

    /// Stops all recording. Independent variables created while paused are plain constants and
    /// no operation is recorded until [`continue_recording`](Self::continue_recording) is called.
    pub fn pause_recording(&self) {
        self.recording_enabled.set(false);
    }

    pub fn continue_recording(&self) {
        self.recording_enabled.set(true);
    }

    pub fn is_recording(&self) -> bool {
        self.recording_enabled.get()
    }

    /// Number of operations currently on the tape.
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The largest number of operations held by any recording since the last call to
    /// [`reset_peak_len`](Self::reset_peak_len).
    pub fn peak_len(&self) -> usize {
        self.peak_len.get()
    }

    pub fn reset_peak_len(&self) {
        self.peak_len.set(0);
    }

    /// Begins a new recording on an empty tape.
    ///
    /// The tape is cleared when the returned guard is dropped, including when the caller exits
    /// early through an error.
    pub fn new_recording(&self) -> Result<Recording<'_>, TapeError> {
        if self.active.get() {
            return Err(TapeError::AlreadyRecording);
        }
        self.active.set(true);
        self.clear();
        Ok(Recording { tape: self })
    }

    fn clear(&self) {
        let mut nodes = self.nodes.borrow_mut();
        let len = nodes.len();
        if len > self.peak_len.get() {
            self.peak_len.set(len);
        }
        nodes.clear();
    }

    /// Pushes a node and returns its index, or `None` if recording is paused.
    pub(crate) fn push(&self, operands: &[(usize, f64)]) -> Option<usize> {
        if !self.recording_enabled.get() {
            return None;
        }
        debug_assert!(operands.len() <= 2);
        let mut node = Node {
            operands: [(0, 0.0); 2],
            arity: operands.len() as u8,
        };
        node.operands[..operands.len()].copy_from_slice(operands);
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(node);
        Some(nodes.len() - 1)
    }
}

/// A scoped recording on a [`Tape`].
///
/// Variables created from a recording borrow it, so they cannot outlive the trace they refer to.
#[derive(Debug)]
pub struct Recording<'t> {
    tape: &'t Tape,
}

impl<'t> Recording<'t> {
    pub fn tape(&self) -> &'t Tape {
        self.tape
    }

    /// Registers `value` as an independent variable.
    ///
    /// If recording is paused the returned variable is an untracked constant.
    pub fn independent(&self, value: f64) -> Var<'_> {
        match self.tape.push(&[]) {
            Some(index) => Var::tracked(value, index, self.tape),
            None => Var::constant(value),
        }
    }

    /// Computes the Jacobian of `dependents` with respect to `independents` into `jacobian`.
    ///
    /// Row `i` holds the derivatives of `dependents[i]`, column `j` the derivatives with respect
    /// to `independents[j]`. Dependents that do not depend on any recorded operation give zero
    /// rows.
    pub fn jacobian_into(
        &self,
        dependents: &[Var<'_>],
        independents: &[Var<'_>],
        jacobian: &mut DMatrix<f64>,
    ) -> Result<(), TapeError> {
        if !self.tape.is_recording() {
            return Err(TapeError::NotRecording);
        }
        let expected = (dependents.len(), independents.len());
        let actual = jacobian.shape();
        if expected != actual {
            return Err(TapeError::DimensionMismatch { expected, actual });
        }

        let nodes = self.tape.nodes.borrow();

        // Map node index -> column
        let mut columns = vec![None; nodes.len()];
        for (position, var) in independents.iter().enumerate() {
            let index = var
                .index()
                .filter(|&idx| idx < nodes.len() && nodes[idx].arity == 0)
                .ok_or(TapeError::UnknownIndependent { position })?;
            if columns[index].replace(position).is_some() {
                return Err(TapeError::UnknownIndependent { position });
            }
        }

        jacobian.fill(0.0);
        let mut adjoints = vec![0.0; nodes.len()];
        for (row, dependent) in dependents.iter().enumerate() {
            let Some(root) = dependent.index() else {
                continue;
            };
            adjoints[..=root].fill(0.0);
            adjoints[root] = 1.0;
            for k in (0..=root).rev() {
                let adjoint = adjoints[k];
                if adjoint == 0.0 {
                    continue;
                }
                let node = &nodes[k];
                if node.arity == 0 {
                    if let Some(col) = columns[k] {
                        jacobian[(row, col)] = adjoint;
                    }
                }
                for &(operand, partial) in node.operands() {
                    adjoints[operand] += adjoint * partial;
                }
            }
        }

        trace!(
            "Extracted {}x{} Jacobian from {} recorded operations",
            expected.0,
            expected.1,
            nodes.len()
        );
        Ok(())
    }
}

impl Drop for Recording<'_> {
    fn drop(&mut self) {
        self.tape.clear();
        self.tape.active.set(false);
    }
}
