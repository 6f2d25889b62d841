//! Storage of the nodal values of all fields at the current and previous time step.

use crate::dof::FieldLayout;
use crate::mesh::MeshAccessor;
use nalgebra::{DMatrix, DVector};

/// Read access to the current and previous nodal values of a system.
///
/// `dof` is the index in the mesh numbering of the field's discretization.
pub trait SolutionStore {
    fn current(&self, field: usize, dof: usize) -> f64;
    fn previous(&self, field: usize, dof: usize) -> f64;
}

/// Solution vectors laid out like the global system.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSolution {
    offsets: Vec<usize>,
    current: DVector<f64>,
    previous: DVector<f64>,
}

impl SystemSolution {
    pub fn zeros(layout: &FieldLayout) -> Self {
        let n = layout.total_dofs();
        Self {
            offsets: (0..layout.num_fields()).map(|f| layout.offset(f)).collect(),
            current: DVector::zeros(n),
            previous: DVector::zeros(n),
        }
    }

    pub fn current_vector(&self) -> &DVector<f64> {
        &self.current
    }

    pub fn current_vector_mut(&mut self) -> &mut DVector<f64> {
        &mut self.current
    }

    pub fn previous_vector(&self) -> &DVector<f64> {
        &self.previous
    }

    pub fn previous_vector_mut(&mut self) -> &mut DVector<f64> {
        &mut self.previous
    }

    /// Makes the current values the previous time step's values.
    pub fn advance_time_step(&mut self) {
        self.previous.copy_from(&self.current);
    }

    /// Sets the current values of a field by evaluating `f` at its nodes.
    ///
    /// Discontinuous fields are set from the value at the element centroid; for
    /// [`DiscontinuousLinear`](crate::element::Discretization::DiscontinuousLinear) the slopes are
    /// set to zero.
    pub fn interpolate_field(
        &mut self,
        mesh: &impl MeshAccessor,
        layout: &FieldLayout,
        field: usize,
        f: impl Fn(&[f64]) -> f64,
    ) {
        let discretization = layout.field(field).discretization;
        let offset = layout.offset(field);
        let mut dofs = Vec::new();
        let mut coordinates = DMatrix::zeros(0, 0);
        for element in 0..mesh.num_elements() {
            mesh.populate_element_dofs(element, discretization, &mut dofs);
            mesh.populate_element_coordinates(element, discretization, &mut coordinates);
            for (j, &dof) in dofs.iter().enumerate() {
                let x: Vec<f64> = coordinates.column(j).iter().copied().collect();
                let value = if discretization.is_continuous() || j == 0 {
                    f(&x)
                } else {
                    0.0
                };
                self.current[offset + dof] = value;
            }
        }
    }
}

impl SolutionStore for SystemSolution {
    fn current(&self, field: usize, dof: usize) -> f64 {
        self.current[self.offsets[field] + dof]
    }

    fn previous(&self, field: usize, dof: usize) -> f64 {
        self.previous[self.offsets[field] + dof]
    }
}
