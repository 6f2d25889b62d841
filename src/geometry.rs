//! Evaluation of the reference-to-physical map of elements and faces.
//!
//! The map of an element with nodal coordinates `X` (one column per node) is
//! `x(xi) = X N(xi)`, with Jacobian `J = X G(xi)^T` where `G` holds the reference gradients of
//! the geometry basis. `J` has one row per ambient dimension and one column per reference
//! dimension. Faces use the same convention: the face map takes face reference coordinates to
//! the ambient space of the volume map, so its Jacobian has fewer columns than rows.

use crate::element::{evaluate_reference_basis, face_local_nodes, Discretization, GeometryType, ReferenceBasis};
use crate::error::AssemblyError;
use nalgebra::{DMatrix, DVector, Vector3};

/// Relative tolerance below which a Jacobian determinant counts as zero.
const DEGENERACY_TOLERANCE: f64 = 1e-12;

/// The state of the geometric map at a single reference point.
#[derive(Debug, Clone)]
pub struct JacobianState {
    /// Physical coordinates of the point.
    pub point: DVector<f64>,
    /// Forward Jacobian, ambient x reference.
    pub jacobian: DMatrix<f64>,
    /// Inverse (or pseudo-inverse for co-dimension maps), reference x ambient.
    pub inverse: DMatrix<f64>,
    /// Signed determinant for square maps, the metric `sqrt(det(J^T J))` otherwise.
    pub determinant: f64,
    /// Unit normal of co-dimension 1 maps. Empty for volume maps.
    pub normal: DVector<f64>,
}

impl Default for JacobianState {
    fn default() -> Self {
        Self {
            point: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
            inverse: DMatrix::zeros(0, 0),
            determinant: 0.0,
            normal: DVector::zeros(0),
        }
    }
}

impl JacobianState {
    pub fn ambient_dim(&self) -> usize {
        self.jacobian.nrows()
    }

    pub fn reference_dim(&self) -> usize {
        self.jacobian.ncols()
    }
}

/// The geometric description of one element (or one face of an element).
#[derive(Debug, Clone)]
pub struct ElementGeometry {
    element: usize,
    geometry: GeometryType,
    discretization: Discretization,
    coordinates: DMatrix<f64>,
    basis: ReferenceBasis,
}

impl ElementGeometry {
    pub fn new(element: usize, geometry: GeometryType, discretization: Discretization, coordinates: DMatrix<f64>) -> Self {
        Self {
            element,
            geometry,
            discretization,
            coordinates,
            basis: ReferenceBasis::default(),
        }
    }

    pub fn element(&self) -> usize {
        self.element
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry
    }

    pub fn discretization(&self) -> Discretization {
        self.discretization
    }

    /// Nodal coordinates, one column per node.
    pub fn coordinates(&self) -> &DMatrix<f64> {
        &self.coordinates
    }

    pub fn ambient_dim(&self) -> usize {
        self.coordinates.nrows()
    }

    /// Re-targets this geometry to another element, reusing internal storage.
    ///
    /// The caller fills the coordinate matrix afterwards through
    /// [`coordinates_mut`](Self::coordinates_mut).
    pub fn reset(&mut self, element: usize, geometry: GeometryType, discretization: Discretization) {
        self.element = element;
        self.geometry = geometry;
        self.discretization = discretization;
    }

    pub fn coordinates_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.coordinates
    }

    /// Average of the vertex coordinates.
    pub fn centroid(&self) -> DVector<f64> {
        let num_vertices = self.geometry.num_vertices();
        self.coordinates.columns(0, num_vertices).column_mean()
    }

    /// Writes the geometry of a face of this element into `face`.
    ///
    /// Returns `false` for elements whose faces are points; in that case only the coordinates
    /// of the face vertex are written.
    pub fn restrict_to_face(&self, face: usize, target: &mut ElementGeometry) -> bool {
        let nodes = face_local_nodes(self.geometry, self.discretization, face);
        let ambient = self.ambient_dim();
        let target_geometry = self.geometry.face_geometry();
        target.element = self.element;
        target.discretization = self.discretization;
        target.geometry = target_geometry.unwrap_or(GeometryType::Segment);
        target.coordinates.resize_mut(ambient, nodes.len(), 0.0);
        for (j, &node) in nodes.iter().enumerate() {
            target.coordinates.set_column(j, &self.coordinates.column(node));
        }
        target_geometry.is_some()
    }

    /// Evaluates the map at the reference point `xi`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate matrix does not have one column per node of the geometry
    /// discretization.
    pub fn evaluate(&mut self, xi: &[f64; 3], state: &mut JacobianState) -> Result<(), AssemblyError> {
        let ambient = self.ambient_dim();
        let reference = self.geometry.reference_dim();
        evaluate_reference_basis(self.geometry, self.discretization, xi, false, &mut self.basis);

        assert_eq!(
            self.coordinates.ncols(),
            self.basis.num_nodes(),
            "coordinate matrix must have one column per geometry node"
        );

        state.point.resize_vertically_mut(ambient, 0.0);
        self.coordinates.mul_to(&self.basis.values, &mut state.point);
        state.jacobian.resize_mut(ambient, reference, 0.0);
        self.coordinates
            .mul_to(&self.basis.gradients.transpose(), &mut state.jacobian);

        let degenerate = |determinant: f64| AssemblyError::DegenerateJacobian {
            element: self.element,
            determinant,
        };

        // Scale of the map, used for a relative degeneracy test
        let scale: f64 = state.jacobian.column_iter().map(|c| c.norm()).product();
        let threshold = DEGENERACY_TOLERANCE * scale;

        if ambient == reference {
            let determinant = state.jacobian.determinant();
            if !determinant.is_finite() || determinant <= threshold || scale == 0.0 {
                return Err(degenerate(determinant));
            }
            state.inverse = state
                .jacobian
                .clone()
                .try_inverse()
                .ok_or_else(|| degenerate(determinant))?;
            state.determinant = determinant;
            state.normal.resize_vertically_mut(0, 0.0);
        } else {
            let metric_tensor = state.jacobian.tr_mul(&state.jacobian);
            let metric = metric_tensor.determinant().max(0.0).sqrt();
            if !metric.is_finite() || metric <= threshold || scale == 0.0 {
                return Err(degenerate(metric));
            }
            let metric_inverse = metric_tensor.try_inverse().ok_or_else(|| degenerate(metric))?;
            state.inverse = metric_inverse * state.jacobian.transpose();
            state.determinant = metric;
            compute_normal(&state.jacobian, &mut state.normal);
        }
        Ok(())
    }
}

/// Unit normal of a co-dimension 1 map. Leaves `normal` empty for other co-dimensions.
fn compute_normal(jacobian: &DMatrix<f64>, normal: &mut DVector<f64>) {
    match (jacobian.nrows(), jacobian.ncols()) {
        (2, 1) => {
            let t = jacobian.column(0);
            *normal = DVector::from_column_slice(&[t[1], -t[0]]).normalize();
        }
        (3, 2) => {
            let t1 = Vector3::new(jacobian[(0, 0)], jacobian[(1, 0)], jacobian[(2, 0)]);
            let t2 = Vector3::new(jacobian[(0, 1)], jacobian[(1, 1)], jacobian[(2, 1)]);
            let n = t1.cross(&t2).normalize();
            *normal = DVector::from_column_slice(n.as_slice());
        }
        _ => normal.resize_vertically_mut(0, 0.0),
    }
}
