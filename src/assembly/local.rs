//! The element-local kernel abstraction.
//!
//! A [`WeakForm`] contributes to the element residual one quadrature point at a time. The
//! residual code is generic over [`TapeScalar`], so the same implementation runs with plain
//! `f64` values and, when a Jacobian is needed from the tape, with tracked variables.
//!
//! Sign convention: the residual is `R = source - operator` and the Jacobian is
//! `K = -dR/du`, so that `K du = R` is the Newton update.

use crate::dof::FieldLayout;
use crate::error::AssemblyError;
use crate::shape::FieldShape;
use galerkin_autodiff::TapeScalar;
use nalgebra::{DMatrix, DMatrixViewMut};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How the Jacobian of a kernel is obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JacobianStrategy {
    /// The kernel implements [`WeakForm::accumulate_jacobian`].
    #[default]
    Analytic,
    /// The Jacobian is extracted from a tape recording of the residual.
    Automatic,
}

/// Everything a kernel may use at a single quadrature point.
#[derive(Debug, Clone, Copy)]
pub struct QuadraturePoint<'a> {
    weight: f64,
    coordinates: &'a [f64],
    time: f64,
    shapes: &'a [FieldShape],
}

impl<'a> QuadraturePoint<'a> {
    pub fn new(weight: f64, coordinates: &'a [f64], time: f64, shapes: &'a [FieldShape]) -> Self {
        Self {
            weight,
            coordinates,
            time,
            shapes,
        }
    }

    /// The quadrature weight scaled by `|det J|`.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Physical coordinates of the point.
    pub fn coordinates(&self) -> &'a [f64] {
        self.coordinates
    }

    /// Spatial dimension.
    pub fn dimension(&self) -> usize {
        self.coordinates.len()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// The physical basis of a field at this point.
    pub fn shape(&self, field: usize) -> &'a FieldShape {
        &self.shapes[field]
    }

    pub fn num_fields(&self) -> usize {
        self.shapes.len()
    }
}

/// Read-only nodal values of all fields of an element, concatenated in field order.
#[derive(Debug, Clone, Copy)]
pub struct LocalFields<'a, T> {
    values: &'a [T],
    ranges: &'a [Range<usize>],
}

impl<'a, T: TapeScalar> LocalFields<'a, T> {
    pub fn new(values: &'a [T], ranges: &'a [Range<usize>]) -> Self {
        Self { values, ranges }
    }

    pub fn num_fields(&self) -> usize {
        self.ranges.len()
    }

    /// Nodal values of one field.
    pub fn field(&self, field: usize) -> &'a [T] {
        &self.values[self.ranges[field].clone()]
    }

    /// `sum_j u_j phi_j`.
    pub fn interpolate(&self, field: usize, shape: &FieldShape) -> T {
        let values = self.field(field);
        debug_assert_eq!(values.len(), shape.num_nodes());
        let mut u = T::zero();
        for (&u_j, &phi_j) in values.iter().zip(shape.values.iter()) {
            u += u_j * phi_j;
        }
        u
    }

    /// `sum_j u_j grad phi_j`, padded with zeros beyond the spatial dimension.
    pub fn interpolate_gradient(&self, field: usize, shape: &FieldShape) -> [T; 3] {
        let values = self.field(field);
        debug_assert_eq!(values.len(), shape.num_nodes());
        let mut gradient = [T::zero(); 3];
        for (j, &u_j) in values.iter().enumerate() {
            for (d, g) in gradient.iter_mut().enumerate().take(shape.gradients.nrows()) {
                *g += u_j * shape.gradients[(d, j)];
            }
        }
        gradient
    }
}

/// Mutable per-field blocks of an element residual.
#[derive(Debug)]
pub struct LocalFieldsMut<'a, T> {
    values: &'a mut [T],
    ranges: &'a [Range<usize>],
}

impl<'a, T: TapeScalar> LocalFieldsMut<'a, T> {
    pub fn new(values: &'a mut [T], ranges: &'a [Range<usize>]) -> Self {
        Self { values, ranges }
    }

    pub fn num_fields(&self) -> usize {
        self.ranges.len()
    }

    /// The residual block of one field, with exactly the field's local DOF count.
    pub fn field_mut(&mut self, field: usize) -> &mut [T] {
        &mut self.values[self.ranges[field].clone()]
    }
}

/// Mutable per-field-pair blocks of an element Jacobian.
#[derive(Debug)]
pub struct LocalJacobian<'a> {
    matrix: &'a mut DMatrix<f64>,
    ranges: &'a [Range<usize>],
}

impl<'a> LocalJacobian<'a> {
    pub fn new(matrix: &'a mut DMatrix<f64>, ranges: &'a [Range<usize>]) -> Self {
        Self { matrix, ranges }
    }

    /// The block coupling the test functions of `row_field` to the unknowns of `col_field`.
    pub fn block_mut(&mut self, row_field: usize, col_field: usize) -> DMatrixViewMut<'_, f64> {
        let rows = &self.ranges[row_field];
        let cols = &self.ranges[col_field];
        self.matrix
            .view_mut((rows.start, cols.start), (rows.len(), cols.len()))
    }
}

/// A weak form evaluated element by element.
pub trait WeakForm {
    fn jacobian_strategy(&self) -> JacobianStrategy;

    /// Whether the kernel reads basis Hessians from [`FieldShape::hessians`].
    fn requires_hessians(&self) -> bool {
        false
    }

    /// Checks that every field the kernel reads or writes exists in `layout`.
    #[allow(unused_variables)]
    fn check_layout(&self, layout: &FieldLayout) -> Result<(), AssemblyError> {
        Ok(())
    }

    /// Adds the contribution of one quadrature point to the residual.
    ///
    /// `previous` holds the nodal values of the previous time step; kernels of stationary
    /// problems ignore it.
    fn accumulate_residual<T: TapeScalar>(
        &self,
        point: &QuadraturePoint,
        current: &LocalFields<T>,
        previous: &LocalFields<f64>,
        residual: &mut LocalFieldsMut<T>,
    );

    /// Adds the contribution of one quadrature point to `K = -dR/du`.
    ///
    /// Required when [`jacobian_strategy`](Self::jacobian_strategy) is
    /// [`JacobianStrategy::Analytic`].
    #[allow(unused_variables)]
    fn accumulate_jacobian(
        &self,
        point: &QuadraturePoint,
        current: &LocalFields<f64>,
        previous: &LocalFields<f64>,
        jacobian: &mut LocalJacobian,
    ) -> Result<(), AssemblyError> {
        Err(AssemblyError::MissingAnalyticJacobian)
    }
}
