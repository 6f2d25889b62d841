//! Basic procedural mesh generation routines.
//!
//! Boundary faces are tagged with 1-based regions:
//!
//! - intervals: [`interval_regions`],
//! - rectangles and boxes: [`box_regions`] (rectangles only use the first four).

use crate::element::GeometryType;
use crate::mesh::Mesh;
use eyre::eyre;
use nalgebra::Point3;

pub mod interval_regions {
    pub const LEFT: usize = 1;
    pub const RIGHT: usize = 2;
}

pub mod box_regions {
    /// `y = y_min`
    pub const BOTTOM: usize = 1;
    /// `x = x_max`
    pub const RIGHT: usize = 2;
    /// `y = y_max`
    pub const TOP: usize = 3;
    /// `x = x_min`
    pub const LEFT: usize = 4;
    /// `z = z_min`
    pub const BACK: usize = 5;
    /// `z = z_max`
    pub const FRONT: usize = 6;
}

/// Classifies points on the boundary of an axis-aligned box by the plane they lie on.
fn box_region_classifier(lower: [f64; 3], upper: [f64; 3], dim: usize) -> impl Fn(&Point3<f64>) -> usize {
    let extent = (0..dim).map(|d| upper[d] - lower[d]).fold(0.0, f64::max);
    let tol = 1e-9 * extent;
    move |x: &Point3<f64>| {
        let on = |value: f64, plane: f64| (value - plane).abs() <= tol;
        use box_regions::*;
        if dim == 1 {
            return if on(x[0], lower[0]) {
                interval_regions::LEFT
            } else {
                interval_regions::RIGHT
            };
        }
        if on(x[1], lower[1]) {
            BOTTOM
        } else if on(x[0], upper[0]) {
            RIGHT
        } else if on(x[1], upper[1]) {
            TOP
        } else if on(x[0], lower[0]) {
            LEFT
        } else if dim == 3 && on(x[2], lower[2]) {
            BACK
        } else {
            FRONT
        }
    }
}

fn check_cells(cells: &[usize]) -> eyre::Result<()> {
    if cells.iter().any(|&n| n == 0) {
        return Err(eyre!("number of cells must be positive in every direction, got {cells:?}"));
    }
    Ok(())
}

/// Uniform mesh of the interval `[a, b]` with the given number of segments.
pub fn create_uniform_interval_mesh_1d(a: f64, b: f64, cells: usize) -> eyre::Result<Mesh> {
    check_cells(&[cells])?;
    let h = (b - a) / cells as f64;
    let vertices = (0..=cells)
        .map(|i| Point3::new(a + i as f64 * h, 0.0, 0.0))
        .collect();
    let connectivity = (0..cells)
        .map(|i| (GeometryType::Segment, vec![i, i + 1]))
        .collect();
    Mesh::from_cells(1, vertices, connectivity, box_region_classifier([a, 0.0, 0.0], [b, 0.0, 0.0], 1))
}

fn grid_vertices_2d(lower: [f64; 2], upper: [f64; 2], [nx, ny]: [usize; 2]) -> Vec<Point3<f64>> {
    let hx = (upper[0] - lower[0]) / nx as f64;
    let hy = (upper[1] - lower[1]) / ny as f64;
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push(Point3::new(lower[0] + i as f64 * hx, lower[1] + j as f64 * hy, 0.0));
        }
    }
    vertices
}

/// Counter-clockwise vertex indices of the grid cell `(i, j)`.
fn grid_cell_2d(i: usize, j: usize, nx: usize) -> [usize; 4] {
    let v = |i: usize, j: usize| j * (nx + 1) + i;
    [v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)]
}

/// Uniform quadrilateral mesh of the rectangle `[lower, upper]` with `cells[d]` cells along
/// axis `d`.
pub fn create_rectangular_uniform_quad_mesh_2d(
    lower: [f64; 2],
    upper: [f64; 2],
    cells: [usize; 2],
) -> eyre::Result<Mesh> {
    check_cells(&cells)?;
    let [nx, ny] = cells;
    let vertices = grid_vertices_2d(lower, upper, cells);
    let mut connectivity = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            connectivity.push((GeometryType::Quadrilateral, grid_cell_2d(i, j, nx).to_vec()));
        }
    }
    let classifier = box_region_classifier([lower[0], lower[1], 0.0], [upper[0], upper[1], 0.0], 2);
    Mesh::from_cells(2, vertices, connectivity, classifier)
}

/// Uniform triangle mesh of the rectangle `[lower, upper]`, obtained by splitting every grid cell
/// along its diagonal from the lower left to the upper right corner.
pub fn create_rectangular_uniform_tri_mesh_2d(
    lower: [f64; 2],
    upper: [f64; 2],
    cells: [usize; 2],
) -> eyre::Result<Mesh> {
    check_cells(&cells)?;
    let [nx, ny] = cells;
    let vertices = grid_vertices_2d(lower, upper, cells);
    let mut connectivity = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let [a, b, c, d] = grid_cell_2d(i, j, nx);
            connectivity.push((GeometryType::Triangle, vec![a, b, c]));
            connectivity.push((GeometryType::Triangle, vec![a, c, d]));
        }
    }
    let classifier = box_region_classifier([lower[0], lower[1], 0.0], [upper[0], upper[1], 0.0], 2);
    Mesh::from_cells(2, vertices, connectivity, classifier)
}

pub fn create_unit_square_uniform_quad_mesh_2d(cells_per_dim: usize) -> eyre::Result<Mesh> {
    create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [1.0, 1.0], [cells_per_dim; 2])
}

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> eyre::Result<Mesh> {
    create_rectangular_uniform_tri_mesh_2d([0.0, 0.0], [1.0, 1.0], [cells_per_dim; 2])
}

/// Uniform hexahedral mesh of the box `[lower, upper]`.
pub fn create_box_uniform_hex_mesh_3d(lower: [f64; 3], upper: [f64; 3], cells: [usize; 3]) -> eyre::Result<Mesh> {
    check_cells(&cells)?;
    let [nx, ny, nz] = cells;
    let h = [0, 1, 2].map(|d| (upper[d] - lower[d]) / cells[d] as f64);

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push(Point3::new(
                    lower[0] + i as f64 * h[0],
                    lower[1] + j as f64 * h[1],
                    lower[2] + k as f64 * h[2],
                ));
            }
        }
    }

    let v = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;
    let mut connectivity = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                connectivity.push((
                    GeometryType::Hexahedron,
                    vec![
                        v(i, j, k),
                        v(i + 1, j, k),
                        v(i + 1, j + 1, k),
                        v(i, j + 1, k),
                        v(i, j, k + 1),
                        v(i + 1, j, k + 1),
                        v(i + 1, j + 1, k + 1),
                        v(i, j + 1, k + 1),
                    ],
                ));
            }
        }
    }

    Mesh::from_cells(3, vertices, connectivity, box_region_classifier(lower, upper, 3))
}

pub fn create_unit_box_uniform_hex_mesh_3d(cells_per_dim: usize) -> eyre::Result<Mesh> {
    create_box_uniform_hex_mesh_3d([0.0; 3], [1.0; 3], [cells_per_dim; 3])
}
