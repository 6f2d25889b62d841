//! Mesh access for assembly, and a small unstructured mesh implementing it.

use crate::element::{evaluate_reference_basis, Discretization, GeometryType, NodeEntity, ReferenceBasis};
use eyre::eyre;
use nalgebra::{DMatrix, Point3};
use rustc_hash::FxHashMap;

pub mod procedural;

/// Adjacency of an element face, decoded from the signed adjacency code.
///
/// The code convention is: a non-negative code is the index of the neighboring element, a
/// negative code `c` marks a face on the domain boundary in region `|c| - 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaceAdjacency {
    Interior(usize),
    Boundary(usize),
}

impl FaceAdjacency {
    pub fn decode(code: i64) -> Self {
        if code >= 0 {
            Self::Interior(code as usize)
        } else {
            Self::Boundary((code.unsigned_abs() - 1) as usize)
        }
    }

    pub fn encode(&self) -> i64 {
        match *self {
            Self::Interior(neighbor) => neighbor as i64,
            Self::Boundary(region) => -(region as i64 + 1),
        }
    }

    pub fn boundary_region(&self) -> Option<usize> {
        match *self {
            Self::Interior(_) => None,
            Self::Boundary(region) => Some(region),
        }
    }
}

/// Read-only access to a mesh, as needed by the assembly engine.
pub trait MeshAccessor {
    /// Ambient (and reference) dimension of the volume elements.
    fn dimension(&self) -> usize;

    fn num_elements(&self) -> usize;

    fn geometry_type(&self, element: usize) -> GeometryType;

    fn num_faces(&self, element: usize) -> usize {
        self.geometry_type(element).num_faces()
    }

    /// Signed adjacency code of a face, see [`FaceAdjacency`].
    fn face_adjacency_code(&self, element: usize, face: usize) -> i64;

    fn face_adjacency(&self, element: usize, face: usize) -> FaceAdjacency {
        FaceAdjacency::decode(self.face_adjacency_code(element, face))
    }

    /// Number of global DOFs of a scalar field with the given discretization.
    fn num_dofs(&self, discretization: Discretization) -> usize;

    fn element_dof_count(&self, element: usize, discretization: Discretization) -> usize {
        discretization.num_nodes(self.geometry_type(element))
    }

    /// Writes the global DOF indices of an element's local nodes, in local node order.
    fn populate_element_dofs(&self, element: usize, discretization: Discretization, dofs: &mut Vec<usize>);

    /// Writes the physical coordinates of an element's local nodes as the columns of `coordinates`.
    fn populate_element_coordinates(
        &self,
        element: usize,
        discretization: Discretization,
        coordinates: &mut DMatrix<f64>,
    );
}

/// An unstructured mesh of straight-sided elements.
///
/// Higher-order nodes are created on edges, on hexahedral faces and in cell interiors as needed by
/// quadratic discretizations. Global nodes are numbered vertices first, then edges, faces and
/// cells, so that every discretization uses a contiguous prefix of the numbering.
#[derive(Debug, Clone)]
pub struct Mesh {
    dimension: usize,
    vertices: Vec<Point3<f64>>,
    geometry: Vec<GeometryType>,
    connectivity: Vec<Vec<usize>>,
    /// Global node indices of the local nodes of the full quadratic element
    element_nodes: Vec<Vec<usize>>,
    face_codes: Vec<Vec<i64>>,
    num_edges: usize,
    num_face_nodes: usize,
    num_cell_nodes: usize,
}

impl Mesh {
    /// Builds a mesh from vertices (padded to three components) and cells given as geometry and
    /// vertex list.
    ///
    /// Faces that are not shared between two cells lie on the boundary. Their region is given by
    /// `boundary_region` evaluated at the face centroid.
    pub fn from_cells(
        dimension: usize,
        vertices: Vec<Point3<f64>>,
        cells: Vec<(GeometryType, Vec<usize>)>,
        boundary_region: impl Fn(&Point3<f64>) -> usize,
    ) -> eyre::Result<Self> {
        if !(1..=3).contains(&dimension) {
            return Err(eyre!("unsupported mesh dimension {dimension}"));
        }

        let mut geometry = Vec::with_capacity(cells.len());
        let mut connectivity = Vec::with_capacity(cells.len());
        for (index, (geometry_type, cell_vertices)) in cells.into_iter().enumerate() {
            if geometry_type.reference_dim() != dimension {
                return Err(eyre!(
                    "cell {index} is a {geometry_type}, which does not match mesh dimension {dimension}"
                ));
            }
            if cell_vertices.len() != geometry_type.num_vertices() {
                return Err(eyre!(
                    "cell {index} has {} vertices, a {geometry_type} needs {}",
                    cell_vertices.len(),
                    geometry_type.num_vertices()
                ));
            }
            if let Some(&v) = cell_vertices.iter().find(|&&v| v >= vertices.len()) {
                return Err(eyre!("cell {index} refers to vertex {v}, but there are only {} vertices", vertices.len()));
            }
            geometry.push(geometry_type);
            connectivity.push(cell_vertices);
        }

        let mut mesh = Self {
            dimension,
            vertices,
            geometry,
            connectivity,
            element_nodes: Vec::new(),
            face_codes: Vec::new(),
            num_edges: 0,
            num_face_nodes: 0,
            num_cell_nodes: 0,
        };
        mesh.number_nodes();
        mesh.connect_faces(boundary_region);
        Ok(mesh)
    }

    fn number_nodes(&mut self) {
        let mut edges = FxHashMap::default();
        let mut faces = FxHashMap::default();
        let mut num_cells = 0;

        // Entity-local numbering first, shifted to global offsets once all counts are known
        let mut entity_nodes = Vec::with_capacity(self.connectivity.len());
        for (geometry, vertices) in self.geometry.iter().zip(&self.connectivity) {
            let num_nodes = Discretization::Quadratic.num_nodes(*geometry);
            let nodes: Vec<_> = (0..num_nodes)
                .map(|local| match geometry.node_entity(local) {
                    NodeEntity::Vertex(v) => GlobalEntity::Vertex(vertices[v]),
                    NodeEntity::Edge(e) => {
                        let [a, b] = geometry.edges()[e];
                        let key = sorted_key(&[vertices[a], vertices[b]]);
                        let next = edges.len();
                        GlobalEntity::Edge(*edges.entry(key).or_insert(next))
                    }
                    NodeEntity::Face(f) => {
                        let face_vertices: Vec<_> = geometry.faces()[f].iter().map(|&v| vertices[v]).collect();
                        let key = sorted_key(&face_vertices);
                        let next = faces.len();
                        GlobalEntity::Face(*faces.entry(key).or_insert(next))
                    }
                    NodeEntity::Cell => {
                        num_cells += 1;
                        GlobalEntity::Cell(num_cells - 1)
                    }
                })
                .collect();
            entity_nodes.push(nodes);
        }

        let nv = self.vertices.len();
        let ne = edges.len();
        let nf = faces.len();
        self.element_nodes = entity_nodes
            .into_iter()
            .map(|nodes| {
                nodes
                    .into_iter()
                    .map(|entity| match entity {
                        GlobalEntity::Vertex(v) => v,
                        GlobalEntity::Edge(e) => nv + e,
                        GlobalEntity::Face(f) => nv + ne + f,
                        GlobalEntity::Cell(c) => nv + ne + nf + c,
                    })
                    .collect()
            })
            .collect();
        self.num_edges = ne;
        self.num_face_nodes = nf;
        self.num_cell_nodes = num_cells;
    }

    fn connect_faces(&mut self, boundary_region: impl Fn(&Point3<f64>) -> usize) {
        let mut unmatched: FxHashMap<Vec<usize>, (usize, usize)> = FxHashMap::default();
        self.face_codes = self
            .geometry
            .iter()
            .map(|geometry| vec![0; geometry.num_faces()])
            .collect();

        for (element, (geometry, vertices)) in self.geometry.iter().zip(&self.connectivity).enumerate() {
            for (face, face_vertices) in geometry.faces().iter().enumerate() {
                let global: Vec<_> = face_vertices.iter().map(|&v| vertices[v]).collect();
                let key = sorted_key(&global);
                match unmatched.remove(&key) {
                    Some((neighbor, neighbor_face)) => {
                        self.face_codes[element][face] = FaceAdjacency::Interior(neighbor).encode();
                        self.face_codes[neighbor][neighbor_face] = FaceAdjacency::Interior(element).encode();
                    }
                    None => {
                        unmatched.insert(key, (element, face));
                    }
                }
            }
        }

        for (key, (element, face)) in unmatched {
            let centroid = key
                .iter()
                .fold(Point3::origin(), |sum, &v| sum + self.vertices[v].coords)
                / key.len() as f64;
            let region = boundary_region(&centroid);
            self.face_codes[element][face] = FaceAdjacency::Boundary(region).encode();
        }
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Vertex indices of every cell.
    pub fn connectivity(&self) -> &[Vec<usize>] {
        &self.connectivity
    }

    /// Total number of nodes of the quadratic discretization.
    pub fn num_nodes(&self) -> usize {
        self.vertices.len() + self.num_edges + self.num_face_nodes + self.num_cell_nodes
    }

    /// Overrides the adjacency code of a face.
    ///
    /// Useful for test setups that need a particular boundary encoding.
    pub fn set_face_adjacency(&mut self, element: usize, face: usize, adjacency: FaceAdjacency) {
        self.face_codes[element][face] = adjacency.encode();
    }
}

/// A node's entity with its index among entities of the same kind.
#[derive(Debug, Copy, Clone)]
enum GlobalEntity {
    Vertex(usize),
    Edge(usize),
    Face(usize),
    Cell(usize),
}

fn sorted_key(vertices: &[usize]) -> Vec<usize> {
    let mut key = vertices.to_vec();
    key.sort_unstable();
    key
}

impl MeshAccessor for Mesh {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn num_elements(&self) -> usize {
        self.geometry.len()
    }

    fn geometry_type(&self, element: usize) -> GeometryType {
        self.geometry[element]
    }

    fn face_adjacency_code(&self, element: usize, face: usize) -> i64 {
        self.face_codes[element][face]
    }

    fn num_dofs(&self, discretization: Discretization) -> usize {
        let nv = self.vertices.len();
        match discretization {
            Discretization::Linear => nv,
            // Segments have no edges, their serendipity element is the quadratic one
            Discretization::Serendipity if self.dimension == 1 => self.num_nodes(),
            Discretization::Serendipity => nv + self.num_edges,
            Discretization::Quadratic => self.num_nodes(),
            Discretization::DiscontinuousConstant => self.num_elements(),
            Discretization::DiscontinuousLinear => self.num_elements() * (self.dimension + 1),
        }
    }

    fn populate_element_dofs(&self, element: usize, discretization: Discretization, dofs: &mut Vec<usize>) {
        let n = discretization.num_nodes(self.geometry[element]);
        dofs.clear();
        match discretization {
            Discretization::DiscontinuousConstant => dofs.push(element),
            Discretization::DiscontinuousLinear => dofs.extend((0..n).map(|i| element * n + i)),
            _ => dofs.extend_from_slice(&self.element_nodes[element][..n]),
        }
    }

    fn populate_element_coordinates(
        &self,
        element: usize,
        discretization: Discretization,
        coordinates: &mut DMatrix<f64>,
    ) {
        let geometry = self.geometry[element];
        let vertices = &self.connectivity[element];
        let n = discretization.num_nodes(geometry);
        coordinates.resize_mut(self.dimension, n, 0.0);

        // Straight-sided elements: every node is the multilinear (or affine) image of its
        // reference coordinates. Discontinuous fields have no nodes, their DOFs are attached to
        // the element centroid.
        let reference = geometry.reference_nodes();
        let mut linear = ReferenceBasis::default();
        for j in 0..n {
            let xi = if discretization.is_continuous() {
                reference[j]
            } else {
                centroid_reference(geometry)
            };
            evaluate_reference_basis(geometry, Discretization::Linear, &xi, false, &mut linear);
            for i in 0..self.dimension {
                coordinates[(i, j)] = vertices
                    .iter()
                    .zip(linear.values.iter())
                    .map(|(&v, &phi)| phi * self.vertices[v][i])
                    .sum();
            }
        }
    }
}

fn centroid_reference(geometry: GeometryType) -> [f64; 3] {
    let n = geometry.num_vertices();
    let mut xi = [0.0; 3];
    for vertex in &geometry.reference_nodes()[..n] {
        for d in 0..3 {
            xi[d] += vertex[d] / n as f64;
        }
    }
    xi
}
