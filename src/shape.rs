//! Physical-space basis functions of a field at a quadrature point.

use crate::element::{evaluate_reference_basis, Discretization, GeometryType, ReferenceBasis};
use crate::geometry::JacobianState;
use nalgebra::{DMatrix, DVector, Matrix3};

/// Basis values and physical derivatives of one field at one point.
///
/// Gradients have one column per local node and one row per ambient dimension. Hessians are
/// padded to 3x3 and are only populated when requested.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub values: DVector<f64>,
    pub gradients: DMatrix<f64>,
    pub hessians: Vec<Matrix3<f64>>,
}

impl Default for FieldShape {
    fn default() -> Self {
        Self {
            values: DVector::zeros(0),
            gradients: DMatrix::zeros(0, 0),
            hessians: Vec::new(),
        }
    }
}

impl FieldShape {
    pub fn num_nodes(&self) -> usize {
        self.values.len()
    }
}

/// Maps reference bases to physical space.
#[derive(Debug, Clone, Default)]
pub struct ShapeEvaluator {
    reference: ReferenceBasis,
}

impl ShapeEvaluator {
    /// Evaluates the basis of `discretization` on `geometry` at the reference point `xi`, given the
    /// state of the geometric map at that point.
    ///
    /// Gradients are `J^-T grad_ref`. Hessians are `J^-T H_ref J^-1`, which neglects the second
    /// derivatives of the geometric map and is exact for affine elements.
    pub fn evaluate(
        &mut self,
        geometry: GeometryType,
        discretization: Discretization,
        xi: &[f64; 3],
        jacobian: &JacobianState,
        with_hessians: bool,
        shape: &mut FieldShape,
    ) {
        evaluate_reference_basis(geometry, discretization, xi, with_hessians, &mut self.reference);
        let n = self.reference.num_nodes();
        let ambient = jacobian.ambient_dim();
        let reference = geometry.reference_dim();

        shape.values.clone_from(&self.reference.values);
        shape.gradients.resize_mut(ambient, n, 0.0);
        jacobian
            .inverse
            .tr_mul_to(&self.reference.gradients, &mut shape.gradients);

        shape.hessians.clear();
        if with_hessians {
            let inverse = &jacobian.inverse;
            for h_ref in &self.reference.hessians {
                let h_ref = h_ref.view((0, 0), (reference, reference));
                let h = inverse.transpose() * h_ref * inverse;
                let mut padded = Matrix3::zeros();
                padded.view_mut((0, 0), (ambient, ambient)).copy_from(&h);
                shape.hessians.push(padded);
            }
        }
    }
}
