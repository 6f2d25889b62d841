use galerkin::assembly::{AssemblyOptions, Communicator, ElementPartition, SerialCommunicator, ThreadCommunicator};
use galerkin::dof::{FieldDescriptor, FieldLayout};
use galerkin::element::Discretization;
use galerkin::functional::{element_value, kinetic_energy, point_value};
use galerkin::mesh::procedural::{create_rectangular_uniform_quad_mesh_2d, create_rectangular_uniform_tri_mesh_2d};
use galerkin::mesh::{Mesh, MeshAccessor};
use galerkin::solution::SystemSolution;
use matrixcompare::assert_scalar_eq;
use nalgebra::DMatrix;

fn velocity_layout(mesh: &Mesh) -> FieldLayout {
    let fields = vec![
        FieldDescriptor::new("U", Discretization::Quadratic),
        FieldDescriptor::new("V", Discretization::Quadratic),
        FieldDescriptor::new("P", Discretization::Linear),
    ];
    FieldLayout::new(mesh, fields).unwrap()
}

fn uniform_flow(mesh: &Mesh, layout: &FieldLayout) -> SystemSolution {
    let mut solution = SystemSolution::zeros(layout);
    solution.interpolate_field(mesh, layout, 0, |_| 1.0);
    solution.interpolate_field(mesh, layout, 1, |_| 2.0);
    solution.interpolate_field(mesh, layout, 2, |x| 100.0 * x[0]);
    solution
}

#[test]
fn kinetic_energy_of_uniform_flow() {
    let meshes = [
        create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap(),
        create_rectangular_uniform_tri_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap(),
    ];
    for mesh in &meshes {
        let layout = velocity_layout(mesh);
        let solution = uniform_flow(mesh, &layout);
        let energy = kinetic_energy(
            mesh,
            &layout,
            &solution,
            &["U", "V"],
            0..mesh.num_elements(),
            &SerialCommunicator,
            &AssemblyOptions::default(),
        )
        .unwrap();
        // |v|^2 |Ω| = 5 * 2
        assert_scalar_eq!(energy, 10.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn kinetic_energy_of_shear_flow() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [1.0, 1.0], [2, 2]).unwrap();
    let layout = velocity_layout(&mesh);
    let mut solution = SystemSolution::zeros(&layout);
    solution.interpolate_field(&mesh, &layout, 0, |x| x[1]);
    let energy = kinetic_energy(
        &mesh,
        &layout,
        &solution,
        &["U", "V"],
        0..mesh.num_elements(),
        &SerialCommunicator,
        &AssemblyOptions::default(),
    )
    .unwrap();
    // ∫ y^2 over the unit square
    assert_scalar_eq!(energy, 1.0 / 3.0, comp = abs, tol = 1e-12);
}

#[test]
fn unknown_velocity_component_is_an_error() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [1.0, 1.0], [1, 1]).unwrap();
    let layout = velocity_layout(&mesh);
    let solution = SystemSolution::zeros(&layout);
    let result = kinetic_energy(
        &mesh,
        &layout,
        &solution,
        &["U", "W"],
        0..1,
        &SerialCommunicator,
        &AssemblyOptions::default(),
    );
    assert!(result.is_err());
}

#[test]
fn kinetic_energy_is_reduced_across_ranks() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap();
    let layout = velocity_layout(&mesh);
    let solution = uniform_flow(&mesh, &layout);
    let partition = ElementPartition::uniform(mesh.num_elements(), 4);
    let (mesh, layout, solution, partition) = (&mesh, &layout, &solution, &partition);

    let energies: Vec<f64> = std::thread::scope(|scope| {
        let handles: Vec<_> = ThreadCommunicator::group(4)
            .into_iter()
            .map(|communicator| {
                scope.spawn(move || {
                    let owned = partition.owned_range(communicator.rank());
                    kinetic_energy(
                        mesh,
                        layout,
                        solution,
                        &["U", "V"],
                        owned,
                        &communicator,
                        &AssemblyOptions::default(),
                    )
                    .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(energies.len(), 4);
    for energy in energies {
        assert_scalar_eq!(energy, 10.0, comp = abs, tol = 1e-12);
    }
}

fn linear_flow(mesh: &Mesh, layout: &FieldLayout) -> SystemSolution {
    let mut solution = SystemSolution::zeros(layout);
    solution.interpolate_field(mesh, layout, 0, |x| x[0] + 10.0 * x[1]);
    solution.interpolate_field(mesh, layout, 1, |x| -x[0]);
    solution.interpolate_field(mesh, layout, 2, |x| 100.0 * x[0]);
    solution
}

#[test]
fn point_value_samples_vertex_and_interior_nodes() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap();
    let layout = velocity_layout(&mesh);
    let solution = linear_flow(&mesh, &layout);
    let sample = |field: &str, point: &[f64]| {
        point_value(&mesh, &layout, &solution, field, point, 0..mesh.num_elements(), &SerialCommunicator)
    };

    let u = sample("U", &[2.0 / 3.0, 0.5]).unwrap().unwrap();
    assert_scalar_eq!(u, 2.0 / 3.0 + 5.0, comp = abs, tol = 1e-12);
    // Cell center of the lower left element, only a node of the quadratic fields
    let v = sample("V", &[1.0 / 3.0, 0.25]).unwrap().unwrap();
    assert_scalar_eq!(v, -1.0 / 3.0, comp = abs, tol = 1e-12);
    assert_eq!(sample("P", &[1.0 / 3.0, 0.25]).unwrap(), None);
    assert_eq!(sample("U", &[0.1, 0.1]).unwrap(), None);

    assert!(sample("W", &[0.0, 0.0]).is_err());
    assert!(sample("U", &[0.0, 0.0, 0.0]).is_err());
}

#[test]
fn point_value_of_discontinuous_field_is_an_error() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [1.0, 1.0], [1, 1]).unwrap();
    let layout = FieldLayout::new(&mesh, vec![FieldDescriptor::new("P", Discretization::DiscontinuousLinear)]).unwrap();
    let solution = SystemSolution::zeros(&layout);
    let result = point_value(&mesh, &layout, &solution, "P", &[0.0, 0.0], 0..1, &SerialCommunicator);
    assert!(result.is_err());
}

#[test]
fn point_value_is_shared_by_all_ranks() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap();
    let layout = velocity_layout(&mesh);
    let solution = linear_flow(&mesh, &layout);
    let partition = ElementPartition::uniform(mesh.num_elements(), 4);
    let (mesh, layout, solution, partition) = (&mesh, &layout, &solution, &partition);

    let values: Vec<(Option<f64>, Option<f64>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = ThreadCommunicator::group(4)
            .into_iter()
            .map(|communicator| {
                scope.spawn(move || {
                    let owned = partition.owned_range(communicator.rank());
                    let corner = point_value(mesh, layout, solution, "U", &[2.0, 1.0], owned.clone(), &communicator);
                    let outside = point_value(mesh, layout, solution, "U", &[3.0, 1.0], owned, &communicator);
                    (corner.unwrap(), outside.unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(values.len(), 4);
    for (corner, outside) in values {
        assert_scalar_eq!(corner.unwrap(), 12.0, comp = abs, tol = 1e-12);
        assert_eq!(outside, None);
    }
}

#[test]
fn element_value_interpolates_at_reference_coordinates() {
    let meshes = [
        create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap(),
        create_rectangular_uniform_tri_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap(),
    ];
    for mesh in &meshes {
        let layout = velocity_layout(mesh);
        let solution = linear_flow(mesh, &layout);
        let mut vertices = DMatrix::zeros(0, 0);
        for element in [0, mesh.num_elements() - 1] {
            mesh.populate_element_coordinates(element, Discretization::Linear, &mut vertices);
            let centroid = vertices.column_mean();
            // The first vertex sits at reference coordinates (-1, -1) on quadrilaterals
            let first_vertex = match vertices.ncols() {
                4 => [-1.0, -1.0, 0.0],
                _ => [0.0; 3],
            };
            let reference_centroid = match vertices.ncols() {
                4 => [0.0; 3],
                _ => [1.0 / 3.0, 1.0 / 3.0, 0.0],
            };

            let u = element_value(mesh, &layout, &solution, "U", element, &reference_centroid).unwrap();
            assert_scalar_eq!(u, centroid[0] + 10.0 * centroid[1], comp = abs, tol = 1e-12);
            let v = element_value(mesh, &layout, &solution, "V", element, &first_vertex).unwrap();
            assert_scalar_eq!(v, -vertices[(0, 0)], comp = abs, tol = 1e-12);
            let p = element_value(mesh, &layout, &solution, "P", element, &reference_centroid).unwrap();
            assert_scalar_eq!(p, 100.0 * centroid[0], comp = abs, tol = 1e-10);
        }

        let xi = [0.0; 3];
        assert!(element_value(mesh, &layout, &solution, "T", 0, &xi).is_err());
        assert!(element_value(mesh, &layout, &solution, "U", mesh.num_elements(), &xi).is_err());
    }
}
