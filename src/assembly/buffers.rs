use crate::dof::{FieldLayout, LocalDofMap};
use crate::element::{Discretization, GeometryType, ReferenceBasis};
use crate::geometry::{ElementGeometry, JacobianState};
use crate::mesh::MeshAccessor;
use crate::shape::{FieldShape, ShapeEvaluator};
use crate::solution::SolutionStore;
use nalgebra::{DMatrix, DVector};
use std::ops::Range;

/// Current and previous nodal values of all fields of one element, concatenated in field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSnapshot {
    current: Vec<f64>,
    previous: Vec<f64>,
}

impl ElementSnapshot {
    /// Gathers the values of the element described by `dof_map`.
    pub fn gather(&mut self, solution: &(impl ?Sized + SolutionStore), dof_map: &LocalDofMap) {
        self.current.clear();
        self.previous.clear();
        for field in 0..dof_map.num_fields() {
            for &dof in dof_map.field_dofs(field) {
                self.current.push(solution.current(field, dof));
                self.previous.push(solution.previous(field, dof));
            }
        }
    }

    pub fn current(&self) -> &[f64] {
        &self.current
    }

    pub fn previous(&self) -> &[f64] {
        &self.previous
    }
}

/// Workspace for assembling one element at a time.
///
/// All storage is resized (not reallocated) per element, so a single instance serves an entire
/// assembly pass.
#[derive(Debug)]
pub struct ElementBuffers {
    pub(crate) dof_map: LocalDofMap,
    pub(crate) ranges: Vec<Range<usize>>,
    pub(crate) snapshot: ElementSnapshot,
    pub(crate) geometry: ElementGeometry,
    pub(crate) face_geometry: ElementGeometry,
    pub(crate) volume_state: JacobianState,
    pub(crate) face_state: JacobianState,
    pub(crate) shape_evaluator: ShapeEvaluator,
    pub(crate) shapes: Vec<FieldShape>,
    pub(crate) face_basis: ReferenceBasis,
    pub(crate) residual: DVector<f64>,
    pub(crate) load: DVector<f64>,
    pub(crate) jacobian: DMatrix<f64>,
}

impl Default for ElementBuffers {
    fn default() -> Self {
        let empty_geometry = || {
            ElementGeometry::new(0, GeometryType::Segment, Discretization::Linear, DMatrix::zeros(0, 0))
        };
        Self {
            dof_map: LocalDofMap::default(),
            ranges: Vec::new(),
            snapshot: ElementSnapshot::default(),
            geometry: empty_geometry(),
            face_geometry: empty_geometry(),
            volume_state: JacobianState::default(),
            face_state: JacobianState::default(),
            shape_evaluator: ShapeEvaluator::default(),
            shapes: Vec::new(),
            face_basis: ReferenceBasis::default(),
            residual: DVector::zeros(0),
            load: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
        }
    }
}

impl ElementBuffers {
    /// Populates DOF map, snapshot and geometry of `element`, and zeroes the local residual,
    /// load and Jacobian.
    pub fn prepare_element(
        &mut self,
        mesh: &impl MeshAccessor,
        layout: &FieldLayout,
        solution: &(impl ?Sized + SolutionStore),
        element: usize,
        geometry_discretization: Discretization,
        with_jacobian: bool,
    ) {
        self.dof_map.populate(mesh, layout, element);
        self.ranges.clear();
        self.ranges
            .extend((0..self.dof_map.num_fields()).map(|f| self.dof_map.field_range(f)));
        self.snapshot.gather(solution, &self.dof_map);

        self.geometry
            .reset(element, mesh.geometry_type(element), geometry_discretization);
        mesh.populate_element_coordinates(element, geometry_discretization, self.geometry.coordinates_mut());

        self.shapes.resize_with(layout.num_fields(), FieldShape::default);

        let n = self.dof_map.total();
        self.residual.resize_vertically_mut(n, 0.0);
        self.residual.fill(0.0);
        self.load.resize_vertically_mut(n, 0.0);
        self.load.fill(0.0);
        if with_jacobian {
            self.jacobian.resize_mut(n, n, 0.0);
            self.jacobian.fill(0.0);
        }
    }

    pub fn dof_map(&self) -> &LocalDofMap {
        &self.dof_map
    }

    pub fn snapshot(&self) -> &ElementSnapshot {
        &self.snapshot
    }

    pub fn geometry(&self) -> &ElementGeometry {
        &self.geometry
    }

    /// The local residual of the last assembled element, including boundary loads.
    pub fn residual(&self) -> &DVector<f64> {
        &self.residual
    }

    /// The boundary load of the last assembled element.
    pub fn load(&self) -> &DVector<f64> {
        &self.load
    }

    /// The local Jacobian of the last assembled element, if one was requested.
    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }
}
