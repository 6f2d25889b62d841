//! Reference elements and their bases.
//!
//! Reference domains:
//!
//! - segments, quadrilaterals and hexahedra live on `[-1, 1]^d`,
//! - triangles and tetrahedra are unit simplices with the first vertex at the origin.
//!
//! Local nodes are numbered vertices first, then edge midpoints, then face centers (hexahedra
//! only) and finally the cell center. A lower-order discretization uses a prefix of this
//! numbering: linear elements use the vertices, serendipity elements the vertices and edges,
//! quadratic elements all nodes.
//!
//! Faces are listed with outward orientation: the normal computed from the face reference map
//! points out of the element.

use serde::{Deserialize, Serialize};
use std::fmt;

mod lagrange;
mod serendipity;
mod simplex;

use nalgebra::{DMatrix, DVector, Matrix3};

/// The shape of an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Segment,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The finite element family used for a field (or for the geometry).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Discretization {
    Linear,
    Quadratic,
    Serendipity,
    DiscontinuousConstant,
    DiscontinuousLinear,
}

impl Discretization {
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Linear | Self::Quadratic | Self::Serendipity)
    }

    /// Number of local nodes on an element of the given geometry.
    pub fn num_nodes(&self, geometry: GeometryType) -> usize {
        use Discretization::*;
        use GeometryType::*;
        match (self, geometry) {
            (DiscontinuousConstant, _) => 1,
            (DiscontinuousLinear, g) => g.reference_dim() + 1,
            (Linear, g) => g.num_vertices(),
            (Quadratic, Segment) | (Serendipity, Segment) => 3,
            (Quadratic, Triangle) | (Serendipity, Triangle) => 6,
            (Quadratic, Quadrilateral) => 9,
            (Serendipity, Quadrilateral) => 8,
            (Quadratic, Tetrahedron) | (Serendipity, Tetrahedron) => 10,
            (Quadratic, Hexahedron) => 27,
            (Serendipity, Hexahedron) => 20,
        }
    }
}

/// The topological entity a local node of a continuous element sits on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeEntity {
    Vertex(usize),
    Edge(usize),
    Face(usize),
    Cell,
}

#[rustfmt::skip]
const SEGMENT_NODES: [[f64; 3]; 3] = [
    [-1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0],
];

#[rustfmt::skip]
const TRIANGLE_NODES: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0],
    [0.5, 0.0, 0.0], [0.5, 0.5, 0.0], [0.0, 0.5, 0.0],
];

#[rustfmt::skip]
const QUADRILATERAL_NODES: [[f64; 3]; 9] = [
    [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0],
    [0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0],
];

#[rustfmt::skip]
const TETRAHEDRON_NODES: [[f64; 3]; 10] = [
    [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0],
    [0.5, 0.0, 0.0], [0.5, 0.5, 0.0], [0.0, 0.5, 0.0],
    [0.0, 0.0, 0.5], [0.5, 0.0, 0.5], [0.0, 0.5, 0.5],
];

#[rustfmt::skip]
const HEXAHEDRON_NODES: [[f64; 3]; 27] = [
    [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0],
    // Edges
    [0.0, -1.0, -1.0], [1.0, 0.0, -1.0], [0.0, 1.0, -1.0], [-1.0, 0.0, -1.0],
    [0.0, -1.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [-1.0, 0.0, 1.0],
    [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0],
    // Faces, in the order of `faces`
    [0.0, 0.0, -1.0], [0.0, -1.0, 0.0], [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0],
    [0.0, 0.0, 0.0],
];

const TRIANGLE_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const QUADRILATERAL_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const TETRAHEDRON_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
#[rustfmt::skip]
const HEXAHEDRON_EDGES: [[usize; 2]; 12] = [
    [0, 1], [1, 2], [2, 3], [3, 0],
    [4, 5], [5, 6], [6, 7], [7, 4],
    [0, 4], [1, 5], [2, 6], [3, 7],
];

const SEGMENT_FACES: [&[usize]; 2] = [&[0], &[1]];
const TRIANGLE_FACES: [&[usize]; 3] = [&[0, 1], &[1, 2], &[2, 0]];
const QUADRILATERAL_FACES: [&[usize]; 4] = [&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const TETRAHEDRON_FACES: [&[usize]; 4] = [&[0, 2, 1], &[0, 1, 3], &[0, 3, 2], &[1, 2, 3]];
#[rustfmt::skip]
const HEXAHEDRON_FACES: [&[usize]; 6] = [
    &[0, 3, 2, 1], &[0, 1, 5, 4], &[1, 2, 6, 5],
    &[2, 3, 7, 6], &[3, 0, 4, 7], &[4, 5, 6, 7],
];

impl GeometryType {
    pub fn reference_dim(&self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Segment => 2,
            Self::Triangle => 3,
            Self::Quadrilateral | Self::Tetrahedron => 4,
            Self::Hexahedron => 8,
        }
    }

    pub fn is_simplex(&self) -> bool {
        matches!(self, Self::Triangle | Self::Tetrahedron)
    }

    /// Reference coordinates of all nodes of the quadratic element, padded to three components.
    pub fn reference_nodes(&self) -> &'static [[f64; 3]] {
        match self {
            Self::Segment => &SEGMENT_NODES,
            Self::Triangle => &TRIANGLE_NODES,
            Self::Quadrilateral => &QUADRILATERAL_NODES,
            Self::Tetrahedron => &TETRAHEDRON_NODES,
            Self::Hexahedron => &HEXAHEDRON_NODES,
        }
    }

    /// Element edges as pairs of local vertices. Segments have no edge nodes: their interior
    /// node belongs to the cell.
    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Self::Segment => &[],
            Self::Triangle => &TRIANGLE_EDGES,
            Self::Quadrilateral => &QUADRILATERAL_EDGES,
            Self::Tetrahedron => &TETRAHEDRON_EDGES,
            Self::Hexahedron => &HEXAHEDRON_EDGES,
        }
    }

    /// Outward-oriented faces as lists of local vertices.
    pub fn faces(&self) -> &'static [&'static [usize]] {
        match self {
            Self::Segment => &SEGMENT_FACES,
            Self::Triangle => &TRIANGLE_FACES,
            Self::Quadrilateral => &QUADRILATERAL_FACES,
            Self::Tetrahedron => &TETRAHEDRON_FACES,
            Self::Hexahedron => &HEXAHEDRON_FACES,
        }
    }

    pub fn num_faces(&self) -> usize {
        self.faces().len()
    }

    /// The geometry of the faces, or `None` for segments, whose faces are points.
    pub fn face_geometry(&self) -> Option<GeometryType> {
        match self {
            Self::Segment => None,
            Self::Triangle | Self::Quadrilateral => Some(Self::Segment),
            Self::Tetrahedron => Some(Self::Triangle),
            Self::Hexahedron => Some(Self::Quadrilateral),
        }
    }

    /// Classifies a local node of the quadratic element.
    pub fn node_entity(&self, local_node: usize) -> NodeEntity {
        let nv = self.num_vertices();
        let ne = self.edges().len();
        let nf = match self {
            Self::Hexahedron => 6,
            _ => 0,
        };
        if local_node < nv {
            NodeEntity::Vertex(local_node)
        } else if local_node < nv + ne {
            NodeEntity::Edge(local_node - nv)
        } else if local_node < nv + ne + nf {
            NodeEntity::Face(local_node - nv - ne)
        } else {
            NodeEntity::Cell
        }
    }

    fn edge_node(&self, a: usize, b: usize) -> Option<usize> {
        self.edges()
            .iter()
            .position(|&[p, q]| (p, q) == (a, b) || (p, q) == (b, a))
            .map(|edge| self.num_vertices() + edge)
    }
}

/// Local nodes of an element lying on the given face, in the node order of the face's own
/// reference element.
///
/// Discontinuous discretizations have no face nodes and give an empty list.
///
/// # Panics
///
/// Panics if the face index is out of bounds.
pub fn face_local_nodes(geometry: GeometryType, discretization: Discretization, face: usize) -> Vec<usize> {
    let vertices = geometry.faces()[face];
    if !discretization.is_continuous() {
        return Vec::new();
    }
    let Some(face_geometry) = geometry.face_geometry() else {
        return vertices.to_vec();
    };

    let num_face_nodes = discretization.num_nodes(face_geometry);
    let mut nodes = vertices.to_vec();
    // A two-vertex face has a single edge, the wrap-around pair is the same edge reversed
    let num_edges = if vertices.len() == 2 { 1 } else { vertices.len() };
    let edges = vertices
        .iter()
        .zip(vertices.iter().cycle().skip(1))
        .take(num_edges)
        .filter_map(|(&a, &b)| geometry.edge_node(a, b));
    nodes.extend(edges);
    if geometry == GeometryType::Hexahedron {
        nodes.push(20 + face);
    }
    nodes.truncate(num_face_nodes);
    nodes
}

/// Basis functions of a reference element evaluated at a single reference point.
///
/// Gradients are stored column-wise, one column per basis function. Hessians are padded to
/// 3x3, with only the leading `reference_dim x reference_dim` block in use.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceBasis {
    pub values: DVector<f64>,
    pub gradients: DMatrix<f64>,
    pub hessians: Vec<Matrix3<f64>>,
}

impl Default for ReferenceBasis {
    fn default() -> Self {
        Self {
            values: DVector::zeros(0),
            gradients: DMatrix::zeros(0, 0),
            hessians: Vec::new(),
        }
    }
}

impl ReferenceBasis {
    pub fn num_nodes(&self) -> usize {
        self.values.len()
    }

    fn reset(&mut self, reference_dim: usize, num_nodes: usize, with_hessians: bool) {
        self.values.resize_vertically_mut(num_nodes, 0.0);
        self.values.fill(0.0);
        self.gradients.resize_mut(reference_dim, num_nodes, 0.0);
        self.gradients.fill(0.0);
        self.hessians.clear();
        if with_hessians {
            self.hessians.resize(num_nodes, Matrix3::zeros());
        }
    }

    pub(crate) fn set(&mut self, node: usize, value: f64, gradient: &[f64; 3], hessian: Option<&[[f64; 3]; 3]>) {
        let dim = self.gradients.nrows();
        self.values[node] = value;
        for i in 0..dim {
            self.gradients[(i, node)] = gradient[i];
        }
        if let (Some(h), Some(target)) = (hessian, self.hessians.get_mut(node)) {
            for i in 0..dim {
                for j in 0..dim {
                    target[(i, j)] = h[i][j];
                }
            }
        }
    }
}

/// Evaluates the reference basis of the given element and discretization at `xi`.
///
/// Only the first `reference_dim` components of `xi` are used.
pub fn evaluate_reference_basis(
    geometry: GeometryType,
    discretization: Discretization,
    xi: &[f64; 3],
    with_hessians: bool,
    basis: &mut ReferenceBasis,
) {
    let dim = geometry.reference_dim();
    let n = discretization.num_nodes(geometry);
    basis.reset(dim, n, with_hessians);

    match discretization {
        Discretization::DiscontinuousConstant => {
            basis.set(0, 1.0, &[0.0; 3], Some(&[[0.0; 3]; 3]));
        }
        Discretization::DiscontinuousLinear => {
            basis.set(0, 1.0, &[0.0; 3], Some(&[[0.0; 3]; 3]));
            for k in 0..dim {
                let mut gradient = [0.0; 3];
                gradient[k] = 1.0;
                basis.set(k + 1, xi[k], &gradient, Some(&[[0.0; 3]; 3]));
            }
        }
        _ if geometry.is_simplex() => simplex::evaluate(geometry, n, xi, basis),
        Discretization::Serendipity if geometry != GeometryType::Segment => {
            serendipity::evaluate(geometry, n, xi, basis)
        }
        _ => lagrange::evaluate(geometry, n, xi, basis),
    }
}

/// Value, first and second derivative of a univariate factor of a separable basis function.
#[derive(Debug, Copy, Clone)]
struct Factor {
    f: f64,
    df: f64,
    ddf: f64,
}

/// Accumulates `coefficient * prod_k factors[k](x_k)` and its derivatives.
fn accumulate_separable(
    coefficient: f64,
    factors: &[Factor],
    value: &mut f64,
    gradient: &mut [f64; 3],
    hessian: &mut [[f64; 3]; 3],
) {
    let dim = factors.len();
    let product_except = |skip: &[usize]| -> f64 {
        (0..dim)
            .filter(|k| !skip.contains(k))
            .map(|k| factors[k].f)
            .product()
    };

    *value += coefficient * product_except(&[]);
    for i in 0..dim {
        gradient[i] += coefficient * factors[i].df * product_except(&[i]);
        for j in 0..dim {
            hessian[i][j] += if i == j {
                coefficient * factors[i].ddf * product_except(&[i])
            } else {
                coefficient * factors[i].df * factors[j].df * product_except(&[i, j])
            };
        }
    }
}
