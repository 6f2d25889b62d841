//! Boundary conditions.
//!
//! A [`BoundaryCondition`] is queried with the physical coordinates of a boundary face centroid,
//! the field name, the boundary region and the time. It answers with the kind of condition and
//! its value, or with `None` if it has no rule for that region. Faces without a rule are treated
//! as natural boundaries: not Dirichlet, zero flux.

use crate::assembly::{Communicator, CsrSystem};
use crate::dof::FieldLayout;
use crate::element::face_local_nodes;
use crate::error::SystemError;
use crate::mesh::MeshAccessor;
use itertools::izip;
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Kind and value of a boundary condition at a point.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundaryValue {
    /// Prescribed value of the unknown.
    Dirichlet(f64),
    /// Prescribed flux.
    Neumann(f64),
}

impl BoundaryValue {
    /// The natural boundary condition, used for faces without a rule.
    pub const NATURAL: Self = Self::Neumann(0.0);

    pub fn is_dirichlet(&self) -> bool {
        matches!(self, Self::Dirichlet(_))
    }

    pub fn value(&self) -> f64 {
        match *self {
            Self::Dirichlet(value) | Self::Neumann(value) => value,
        }
    }
}

pub trait BoundaryCondition {
    /// Evaluates the condition at `coords` for the given field, boundary region and time.
    ///
    /// Returns `None` if no rule covers the region.
    fn evaluate(&self, coords: &[f64], field: &str, region: usize, time: f64) -> Option<BoundaryValue>;
}

impl<F> BoundaryCondition for F
where
    F: Fn(&[f64], &str, usize, f64) -> Option<BoundaryValue>,
{
    fn evaluate(&self, coords: &[f64], field: &str, region: usize, time: f64) -> Option<BoundaryValue> {
        self(coords, field, region, time)
    }
}

type RegionFunction = Box<dyn Fn(&[f64], f64) -> BoundaryValue + Send + Sync>;

enum RegionRule {
    Constant(BoundaryValue),
    Function(RegionFunction),
}

impl std::fmt::Debug for RegionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Boundary conditions given per field and region.
#[derive(Debug, Default)]
pub struct RegionBoundaryConditions {
    rules: FxHashMap<(String, usize), RegionRule>,
}

impl RegionBoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dirichlet(mut self, field: &str, region: usize, value: f64) -> Self {
        self.rules
            .insert((field.to_string(), region), RegionRule::Constant(BoundaryValue::Dirichlet(value)));
        self
    }

    pub fn with_neumann(mut self, field: &str, region: usize, flux: f64) -> Self {
        self.rules
            .insert((field.to_string(), region), RegionRule::Constant(BoundaryValue::Neumann(flux)));
        self
    }

    /// A space- and time-dependent rule.
    pub fn with_function(
        mut self,
        field: &str,
        region: usize,
        function: impl Fn(&[f64], f64) -> BoundaryValue + Send + Sync + 'static,
    ) -> Self {
        self.rules
            .insert((field.to_string(), region), RegionRule::Function(Box::new(function)));
        self
    }
}

impl BoundaryCondition for RegionBoundaryConditions {
    fn evaluate(&self, coords: &[f64], field: &str, region: usize, time: f64) -> Option<BoundaryValue> {
        self.rules
            .get(&(field.to_string(), region))
            .map(|rule| match rule {
                RegionRule::Constant(value) => *value,
                RegionRule::Function(function) => function(coords, time),
            })
    }
}

/// Evaluates a boundary condition, falling back to [`BoundaryValue::NATURAL`] when no rule
/// exists. Each missing `(field, region)` pair is logged once per resolver.
#[derive(Debug, Default)]
pub(crate) struct BoundaryResolver {
    reported: RefCell<FxHashSet<(String, usize)>>,
}

impl BoundaryResolver {
    pub fn resolve(
        &self,
        condition: &dyn BoundaryCondition,
        coords: &[f64],
        field: &str,
        region: usize,
        time: f64,
    ) -> BoundaryValue {
        condition
            .evaluate(coords, field, region, time)
            .unwrap_or_else(|| {
                let key = (field.to_string(), region);
                if self.reported.borrow_mut().insert(key) {
                    debug!("No boundary rule for field \"{field}\" on region {region}, treating it as natural");
                }
                BoundaryValue::NATURAL
            })
    }
}

/// Prescribed values of Dirichlet DOFs, for use by the outer solver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirichletConstraints {
    /// Sorted by global DOF index, without duplicates
    dofs: Vec<usize>,
    values: Vec<f64>,
}

impl DirichletConstraints {
    /// Collects Dirichlet DOFs of all fields of a system.
    ///
    /// As in the boundary flux loop, the condition is evaluated once per boundary face at the face
    /// centroid, and a Dirichlet answer constrains every DOF of the field on that face.
    pub fn collect(mesh: &impl MeshAccessor, layout: &FieldLayout, condition: &dyn BoundaryCondition, time: f64) -> Self {
        let resolver = BoundaryResolver::default();
        let mut constrained = FxHashMap::default();
        let mut dofs = Vec::new();
        let mut coordinates = DMatrix::zeros(0, 0);

        for element in 0..mesh.num_elements() {
            let geometry = mesh.geometry_type(element);
            for face in 0..mesh.num_faces(element) {
                let Some(region) = mesh.face_adjacency(element, face).boundary_region() else {
                    continue;
                };
                for (f, field) in layout.fields().iter().enumerate() {
                    let nodes = face_local_nodes(geometry, field.discretization, face);
                    if nodes.is_empty() {
                        continue;
                    }
                    mesh.populate_element_coordinates(element, field.discretization, &mut coordinates);
                    let centroid = face_centroid(&coordinates, geometry.faces()[face]);
                    let value = resolver.resolve(condition, centroid.as_slice(), &field.name, region, time);
                    if let BoundaryValue::Dirichlet(value) = value {
                        mesh.populate_element_dofs(element, field.discretization, &mut dofs);
                        for &node in &nodes {
                            constrained.insert(layout.offset(f) + dofs[node], value);
                        }
                    }
                }
            }
        }

        let mut pairs: Vec<_> = constrained.into_iter().collect();
        pairs.sort_unstable_by_key(|&(dof, _)| dof);
        let (dofs, values) = pairs.into_iter().unzip();
        Self { dofs, values }
    }

    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    /// Applies the constraints to the owned rows of a closed system, see
    /// [`apply_to_rows`](Self::apply_to_rows).
    pub fn apply_to_system<C: Communicator>(
        &self,
        system: &mut CsrSystem<C>,
        current: &DVector<f64>,
    ) -> Result<(), SystemError> {
        let first_row = system.owned_rows().start;
        let (residual, jacobian) = system.finalized_mut()?;
        self.apply_to_rows(jacobian, residual, current, first_row);
        Ok(())
    }

    /// Replaces the constrained rows of a Newton system `K du = R` by `s du_i = s (g_i - u_i)`.
    ///
    /// `jacobian` and `residual` hold the rows `first_row .. first_row + nrows` of the global
    /// system, `current` is the full current solution. The scale `s` is the magnitude of the first
    /// non-zero diagonal entry, which keeps the conditioning of the matrix intact.
    pub fn apply_to_rows(
        &self,
        jacobian: &mut CsrMatrix<f64>,
        residual: &mut DVector<f64>,
        current: &DVector<f64>,
        first_row: usize,
    ) {
        let nrows = jacobian.nrows();
        let scale = (0..nrows)
            .filter_map(|i| jacobian.get_entry(i, first_row + i))
            .map(|entry| entry.into_value().abs())
            .find(|&x| x != 0.0)
            .unwrap_or(1.0);

        for (&dof, &value) in izip!(&self.dofs, &self.values) {
            if dof < first_row || dof >= first_row + nrows {
                continue;
            }
            let local_row = dof - first_row;
            let mut row = jacobian.row_mut(local_row);
            let (cols, values) = row.cols_and_values_mut();
            for (&col, entry) in cols.iter().zip(values) {
                *entry = if col == dof { scale } else { 0.0 };
            }
            residual[local_row] = scale * (value - current[dof]);
        }
    }
}

/// Average of the given element-local vertex columns.
pub(crate) fn face_centroid(coordinates: &DMatrix<f64>, vertices: &[usize]) -> DVector<f64> {
    let mut centroid = DVector::zeros(coordinates.nrows());
    for &v in vertices {
        centroid += coordinates.column(v);
    }
    centroid / vertices.len() as f64
}
