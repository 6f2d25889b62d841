use crate::{boussinesq_layout, natural_boundary, scalar_layout, wiggle};
use galerkin::assembly::{
    Assembler, AssemblyOptions, CsrSystem, DofOwnership, ElementPartition, JacobianStrategy,
    LocalFields, LocalFieldsMut, LocalJacobian, QuadraturePoint, ThreadCommunicator, WeakForm,
};
use galerkin::autodiff::TapeScalar;
use galerkin::boundary::{BoundaryCondition, BoundaryValue, RegionBoundaryConditions};
use galerkin::dof::FieldLayout;
use galerkin::element::{Discretization, GeometryType};
use galerkin::error::{AssemblyError, SystemError, SystemPart};
use galerkin::kernels::{BoussinesqKernel, BoussinesqParameters, PoissonKernel};
use galerkin::mesh::procedural::{
    box_regions, create_rectangular_uniform_quad_mesh_2d, create_uniform_interval_mesh_1d,
    create_unit_box_uniform_hex_mesh_3d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d, interval_regions,
};
use galerkin::mesh::{Mesh, MeshAccessor};
use galerkin::solution::SystemSolution;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Point3};
use std::cell::{Cell, RefCell};

fn zero_source(_: &[f64]) -> f64 {
    0.0
}

fn poisson_assembler<'a, B: BoundaryCondition>(
    mesh: &'a Mesh,
    layout: &'a FieldLayout,
    boundary_condition: B,
) -> Assembler<'a, Mesh, PoissonKernel<fn(&[f64]) -> f64>, B> {
    let kernel = PoissonKernel::new(zero_source as fn(&[f64]) -> f64);
    Assembler::new(mesh, layout, kernel, boundary_condition, AssemblyOptions::default()).unwrap()
}

fn wiggly_solution(layout: &FieldLayout) -> SystemSolution {
    let mut solution = SystemSolution::zeros(layout);
    for (i, u) in solution.current_vector_mut().iter_mut().enumerate() {
        *u = wiggle(i, 0.0);
    }
    for (i, u) in solution.previous_vector_mut().iter_mut().enumerate() {
        *u = wiggle(i, 1.3);
    }
    solution
}

#[test]
fn two_node_segment_with_dirichlet_and_neumann_ends() {
    let mesh = create_uniform_interval_mesh_1d(0.0, 1.0, 1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let conditions = RegionBoundaryConditions::new()
        .with_dirichlet("u", interval_regions::LEFT, 0.0)
        .with_neumann("u", interval_regions::RIGHT, 2.0);
    let mut assembler = poisson_assembler(&mesh, &layout, conditions);
    let solution = SystemSolution::zeros(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();

    let report = assembler.assemble(&solution, &mut system, true).unwrap();
    assert_eq!(report.elements, 1);
    assert_eq!(report.peak_tape_length, 0);

    let residual = system.residual().unwrap();
    assert_matrix_eq!(residual, DVector::from_column_slice(&[0.0, 2.0]), comp = abs, tol = 1e-14);
    let stiffness = DMatrix::from(system.jacobian().unwrap());
    let expected = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
    assert_matrix_eq!(stiffness, expected, comp = abs, tol = 1e-14);
}

#[test]
fn time_dependent_flux_follows_assembler_time() {
    let mesh = create_uniform_interval_mesh_1d(0.0, 2.0, 2).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Quadratic);
    let conditions =
        RegionBoundaryConditions::new().with_function("u", interval_regions::RIGHT, |_, t| BoundaryValue::Neumann(t));
    let mut assembler = poisson_assembler(&mesh, &layout, conditions);
    let solution = SystemSolution::zeros(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();

    assembler.set_time(3.0);
    assembler.assemble(&solution, &mut system, false).unwrap();
    let residual = system.residual().unwrap();
    // The right end is vertex 2, and only the boundary flux contributes
    assert_eq!(residual[2], 3.0);
    assert_eq!(residual.sum(), 3.0);
}

#[test]
fn residual_only_pass_invalidates_previous_jacobian() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let mut assembler = poisson_assembler(&mesh, &layout, natural_boundary);
    let solution = wiggly_solution(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();

    assembler.assemble(&solution, &mut system, true).unwrap();
    let stiffness = DMatrix::from(system.jacobian().unwrap());

    assembler.assemble(&solution, &mut system, false).unwrap();
    assert!(system.residual().is_ok());
    assert_eq!(system.jacobian().unwrap_err(), SystemError::NotFinalized(SystemPart::Jacobian));
    assert_eq!(
        system.finalized_mut().unwrap_err(),
        SystemError::NotFinalized(SystemPart::Jacobian)
    );

    assembler.assemble(&solution, &mut system, true).unwrap();
    assert_eq!(DMatrix::from(system.jacobian().unwrap()), stiffness);
}

#[test]
fn residual_assembly_is_repeatable_bit_for_bit() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap();
    let layout = boussinesq_layout(&mesh);
    let kernel = BoussinesqKernel::from_layout(&layout, BoussinesqParameters::default()).unwrap();
    let mut assembler = Assembler::new(&mesh, &layout, kernel, natural_boundary, AssemblyOptions::default()).unwrap();
    let solution = wiggly_solution(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();

    assembler.assemble(&solution, &mut system, false).unwrap();
    let first = system.residual().unwrap().clone();
    assembler.assemble(&solution, &mut system, false).unwrap();
    let second = system.residual().unwrap().clone();
    assert_eq!(first, second);
    assert!(first.amax() > 0.0);
}

fn uniform_boundary_value(value: BoundaryValue) -> impl Fn(&[f64], &str, usize, f64) -> Option<BoundaryValue> {
    move |_, _, _, _| Some(value)
}

#[test]
fn dirichlet_faces_contribute_no_boundary_load() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Quadratic);
    let solution = SystemSolution::zeros(&layout);
    let load_with = |value| {
        let mut assembler = poisson_assembler(&mesh, &layout, uniform_boundary_value(value));
        let buffers = assembler.assemble_element(0, &solution, false).unwrap();
        buffers.load().clone()
    };

    let dirichlet = load_with(BoundaryValue::Dirichlet(5.0));
    let natural = load_with(BoundaryValue::Neumann(0.0));
    let neumann = load_with(BoundaryValue::Neumann(5.0));

    assert_eq!(dirichlet, natural);
    assert_eq!(dirichlet, DVector::zeros(9));
    assert_ne!(dirichlet, neumann);
    assert_scalar_eq!(neumann.sum(), 20.0, comp = abs, tol = 1e-13);
}

#[test]
fn unit_flux_on_hexahedron_faces_integrates_to_surface_area() {
    let mesh = create_unit_box_uniform_hex_mesh_3d(1).unwrap();
    for discretization in [Discretization::Linear, Discretization::Quadratic, Discretization::Serendipity] {
        let layout = scalar_layout(&mesh, discretization);
        let solution = SystemSolution::zeros(&layout);
        let mut assembler = poisson_assembler(&mesh, &layout, uniform_boundary_value(BoundaryValue::Neumann(1.0)));
        let buffers = assembler.assemble_element(0, &solution, false).unwrap();
        assert_eq!(buffers.load().len(), discretization.num_nodes(GeometryType::Hexahedron));
        assert_scalar_eq!(buffers.load().sum(), 6.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn unit_flux_on_tetrahedron_faces_integrates_to_surface_area() {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    let cells = vec![(GeometryType::Tetrahedron, vec![0, 1, 2, 3])];
    let mesh = Mesh::from_cells(3, vertices, cells, |_| 1).unwrap();
    // Three axis-aligned right triangles and the slanted face
    let area = 1.5 + 3.0f64.sqrt() / 2.0;
    for discretization in [Discretization::Linear, Discretization::Quadratic] {
        let layout = scalar_layout(&mesh, discretization);
        let solution = SystemSolution::zeros(&layout);
        let conditions = RegionBoundaryConditions::new().with_neumann("u", 1, 1.0);
        let mut assembler = poisson_assembler(&mesh, &layout, conditions);
        let buffers = assembler.assemble_element(0, &solution, false).unwrap();
        assert_scalar_eq!(buffers.load().sum(), area, comp = abs, tol = 1e-12);
    }
}

#[test]
fn neumann_flux_integrates_over_boundary_faces() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [1, 1]).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Quadratic);
    let conditions = RegionBoundaryConditions::new()
        .with_neumann("u", box_regions::BOTTOM, 1.0)
        .with_neumann("u", box_regions::RIGHT, 1.0)
        .with_neumann("u", box_regions::TOP, 1.0)
        .with_dirichlet("u", box_regions::LEFT, 0.0);
    let mut assembler = poisson_assembler(&mesh, &layout, conditions);
    let solution = SystemSolution::zeros(&layout);
    let buffers = assembler.assemble_element(0, &solution, false).unwrap();

    // Unit flux on three sides of a 2 x 1 rectangle, the left side is Dirichlet
    assert_scalar_eq!(buffers.load().sum(), 5.0, comp = abs, tol = 1e-13);
    // Simpson weights on the right edge: vertices 1 and 2, midpoint 5
    assert_scalar_eq!(buffers.load()[5], 1.0 * 4.0 / 6.0, comp = abs, tol = 1e-13);
    // Vertex 3 (top left) only receives the top edge contribution
    assert_scalar_eq!(buffers.load()[3], 2.0 / 6.0, comp = abs, tol = 1e-13);
    assert_eq!(buffers.residual(), buffers.load());
}

#[test]
fn faces_without_rules_are_natural() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let conditions = RegionBoundaryConditions::new().with_neumann("u", 42, 1.0);
    let mut assembler = poisson_assembler(&mesh, &layout, conditions);
    let solution = SystemSolution::zeros(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();
    assembler.assemble(&solution, &mut system, false).unwrap();
    assert_eq!(system.residual().unwrap(), &DVector::zeros(9));
}

#[test]
fn paused_tape_does_not_grow() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2).unwrap();
    let layout = boussinesq_layout(&mesh);
    let kernel = BoussinesqKernel::from_layout(&layout, BoussinesqParameters::default()).unwrap();
    let mut assembler = Assembler::new(&mesh, &layout, kernel, natural_boundary, AssemblyOptions::default()).unwrap();
    let solution = wiggly_solution(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();

    let report = assembler.assemble(&solution, &mut system, false).unwrap();
    assert!(!assembler.tape().is_recording());
    assert!(assembler.tape().is_empty());
    assert_eq!(report.peak_tape_length, 0);
    assert_eq!(report.elements, 4);

    let report = assembler.assemble(&solution, &mut system, true).unwrap();
    assert!(assembler.tape().is_recording());
    assert!(report.peak_tape_length > 0);
    // Every element recording is cleared when it ends
    assert!(assembler.tape().is_empty());

    let report = assembler.assemble(&solution, &mut system, false).unwrap();
    assert_eq!(report.peak_tape_length, 0);
}

#[test]
fn analytic_kernels_never_record() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Quadratic);
    let mut assembler = poisson_assembler(&mesh, &layout, natural_boundary);
    let solution = wiggly_solution(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();
    let report = assembler.assemble(&solution, &mut system, true).unwrap();
    assert!(!assembler.tape().is_recording());
    assert_eq!(report.peak_tape_length, 0);
}

#[test]
fn re_recording_an_element_gives_identical_jacobian() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2).unwrap();
    let layout = boussinesq_layout(&mesh);
    let kernel = BoussinesqKernel::from_layout(&layout, BoussinesqParameters::default()).unwrap();
    let mut assembler = Assembler::new(&mesh, &layout, kernel, natural_boundary, AssemblyOptions::default()).unwrap();
    let solution = wiggly_solution(&layout);

    let first = assembler.assemble_element(3, &solution, true).unwrap().jacobian().clone();
    assert!(assembler.tape().is_empty());
    // Record a different element in between
    assembler.assemble_element(0, &solution, true).unwrap();
    let second = assembler.assemble_element(3, &solution, true).unwrap().jacobian().clone();
    assert_eq!(first.shape(), (29, 29));
    assert_eq!(first, second);
    assert!(first.amax() > 0.0);
}

#[test]
fn poisson_tape_jacobian_equals_analytic_jacobian() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Quadratic);
    let solution = wiggly_solution(&layout);
    let source = |x: &[f64]| x[0] * x[1] + 1.0;

    let options = AssemblyOptions::default();
    let mut analytic = Assembler::new(&mesh, &layout, PoissonKernel::new(source), natural_boundary, options.clone()).unwrap();
    let automatic_kernel = PoissonKernel::new(source).with_strategy(JacobianStrategy::Automatic);
    let mut automatic = Assembler::new(&mesh, &layout, automatic_kernel, natural_boundary, options).unwrap();

    let mut analytic_system = CsrSystem::serial(&mesh, &layout).unwrap();
    let mut automatic_system = CsrSystem::serial(&mesh, &layout).unwrap();
    analytic.assemble(&solution, &mut analytic_system, true).unwrap();
    let report = automatic.assemble(&solution, &mut automatic_system, true).unwrap();
    assert!(report.peak_tape_length > 0);

    assert_matrix_eq!(
        analytic_system.residual().unwrap(),
        automatic_system.residual().unwrap(),
        comp = abs,
        tol = 1e-13
    );
    let k_analytic = DMatrix::from(analytic_system.jacobian().unwrap());
    let k_automatic = DMatrix::from(automatic_system.jacobian().unwrap());
    assert_matrix_eq!(k_analytic, k_automatic, comp = abs, tol = 1e-12);
}

#[test]
fn degenerate_geometry_aborts_assembly() {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(3.0, 0.0, 0.0),
    ];
    let mesh = Mesh::from_cells(2, vertices, vec![(GeometryType::Quadrilateral, vec![0, 1, 2, 3])], |_| 1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let mut assembler = poisson_assembler(&mesh, &layout, natural_boundary);
    let solution = SystemSolution::zeros(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();

    let err = assembler.assemble(&solution, &mut system, false).unwrap_err();
    let degenerate = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<AssemblyError>(),
            Some(AssemblyError::DegenerateJacobian { element: 0, .. })
        )
    });
    assert!(degenerate, "unexpected error: {err:?}");

    let err = assembler.assemble_element(0, &solution, false).unwrap_err();
    assert!(matches!(err, AssemblyError::DegenerateJacobian { element: 0, .. }));
}

#[test]
fn mismatched_system_and_partition_are_rejected() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let other_layout = scalar_layout(&mesh, Discretization::Quadratic);
    let mut assembler = poisson_assembler(&mesh, &layout, natural_boundary);
    let solution = SystemSolution::zeros(&layout);
    let mut system = CsrSystem::serial(&mesh, &other_layout).unwrap();

    let err = assembler.assemble(&solution, &mut system, false).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AssemblyError>(),
        Some(AssemblyError::DimensionMismatch { expected: 9, actual: 25, .. })
    ));

    let partition = ElementPartition::uniform(3, 2);
    assert!(assembler.with_partition(&partition, 0).is_err());
}

#[test]
fn discontinuous_geometry_is_rejected() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let options = AssemblyOptions {
        geometry_discretization: Discretization::DiscontinuousLinear,
        ..Default::default()
    };
    let Err(err) = Assembler::new(&mesh, &layout, PoissonKernel::new(zero_source), natural_boundary, options) else {
        panic!("discontinuous geometry must be rejected");
    };
    assert!(matches!(err.downcast_ref::<AssemblyError>(), Some(AssemblyError::DiscontinuousGeometry)));
}

#[test]
fn kernel_fields_outside_the_layout_are_rejected() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let kernel = PoissonKernel::new(zero_source).with_field(1);
    let Err(err) = Assembler::new(&mesh, &layout, kernel, natural_boundary, AssemblyOptions::default()) else {
        panic!("field 1 does not exist in a single field layout");
    };
    assert_eq!(err.downcast_ref::<AssemblyError>(), Some(&AssemblyError::UnknownField("#1".to_string())));

    let kernel = PoissonKernel::new(zero_source).with_field(0);
    assert!(Assembler::new(&mesh, &layout, kernel, natural_boundary, AssemblyOptions::default()).is_ok());
}

/// Claims analytic Jacobians without providing them.
struct ResidualOnly;

impl WeakForm for ResidualOnly {
    fn jacobian_strategy(&self) -> JacobianStrategy {
        JacobianStrategy::Analytic
    }

    fn accumulate_residual<T: TapeScalar>(
        &self,
        point: &QuadraturePoint,
        _current: &LocalFields<T>,
        _previous: &LocalFields<f64>,
        residual: &mut LocalFieldsMut<T>,
    ) {
        let phi = &point.shape(0).values;
        for (r, &phi_i) in residual.field_mut(0).iter_mut().zip(phi.iter()) {
            *r += point.weight() * phi_i;
        }
    }
}

#[test]
fn missing_analytic_jacobian_is_an_error() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let options = AssemblyOptions::default();
    let mut assembler = Assembler::new(&mesh, &layout, ResidualOnly, natural_boundary, options).unwrap();
    let solution = SystemSolution::zeros(&layout);
    let mut system = CsrSystem::serial(&mesh, &layout).unwrap();

    // Residuals alone are fine: the integral of the basis is the element area
    assembler.assemble(&solution, &mut system, false).unwrap();
    assert_scalar_eq!(system.residual().unwrap().sum(), 1.0, comp = abs, tol = 1e-14);

    let err = assembler.assemble(&solution, &mut system, true).unwrap_err();
    let missing = err
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<AssemblyError>(), Some(AssemblyError::MissingAnalyticJacobian)));
    assert!(missing, "unexpected error: {err:?}");
}

/// A Poisson kernel that logs the point of every residual and Jacobian evaluation.
struct PointRecorder {
    poisson: PoissonKernel<fn(&[f64]) -> f64>,
    residual_points: RefCell<Vec<(f64, Vec<f64>)>>,
    jacobian_points: RefCell<Vec<(f64, Vec<f64>)>>,
}

impl WeakForm for PointRecorder {
    fn jacobian_strategy(&self) -> JacobianStrategy {
        JacobianStrategy::Analytic
    }

    fn accumulate_residual<T: TapeScalar>(
        &self,
        point: &QuadraturePoint,
        current: &LocalFields<T>,
        previous: &LocalFields<f64>,
        residual: &mut LocalFieldsMut<T>,
    ) {
        let record = (point.weight(), point.coordinates().to_vec());
        self.residual_points.borrow_mut().push(record);
        self.poisson.accumulate_residual(point, current, previous, residual);
    }

    fn accumulate_jacobian(
        &self,
        point: &QuadraturePoint,
        current: &LocalFields<f64>,
        previous: &LocalFields<f64>,
        jacobian: &mut LocalJacobian,
    ) -> Result<(), AssemblyError> {
        let record = (point.weight(), point.coordinates().to_vec());
        self.jacobian_points.borrow_mut().push(record);
        self.poisson.accumulate_jacobian(point, current, previous, jacobian)
    }
}

#[test]
fn analytic_jacobian_shares_points_with_residual() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Quadratic);
    let kernel = PointRecorder {
        poisson: PoissonKernel::new(zero_source as fn(&[f64]) -> f64),
        residual_points: RefCell::new(Vec::new()),
        jacobian_points: RefCell::new(Vec::new()),
    };
    let mut assembler = Assembler::new(&mesh, &layout, kernel, natural_boundary, AssemblyOptions::default()).unwrap();
    let solution = wiggly_solution(&layout);

    let residual_only = assembler.assemble_element(1, &solution, false).unwrap().residual().clone();
    let num_points = assembler.kernel().residual_points.borrow().len();
    assert!(num_points > 0);
    assert!(assembler.kernel().jacobian_points.borrow().is_empty());
    assembler.kernel().residual_points.borrow_mut().clear();

    let buffers = assembler.assemble_element(1, &solution, true).unwrap();
    assert_eq!(buffers.residual(), &residual_only);
    assert!(buffers.jacobian().amax() > 0.0);
    let kernel = assembler.kernel();
    assert_eq!(kernel.residual_points.borrow().len(), num_points);
    assert_eq!(*kernel.residual_points.borrow(), *kernel.jacobian_points.borrow());
}

/// Records whether basis Hessians were available to the kernel.
struct HessianRecorder {
    saw_hessians: Cell<bool>,
}

impl WeakForm for HessianRecorder {
    fn jacobian_strategy(&self) -> JacobianStrategy {
        JacobianStrategy::Automatic
    }

    fn requires_hessians(&self) -> bool {
        true
    }

    fn accumulate_residual<T: TapeScalar>(
        &self,
        point: &QuadraturePoint,
        _current: &LocalFields<T>,
        _previous: &LocalFields<f64>,
        _residual: &mut LocalFieldsMut<T>,
    ) {
        let shape = point.shape(0);
        if shape.hessians.len() == shape.num_nodes() {
            self.saw_hessians.set(true);
        }
    }
}

#[test]
fn kernels_requiring_hessians_receive_them() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Quadratic);
    let kernel = HessianRecorder {
        saw_hessians: Cell::new(false),
    };
    let mut assembler = Assembler::new(&mesh, &layout, kernel, natural_boundary, AssemblyOptions::default()).unwrap();
    let solution = SystemSolution::zeros(&layout);
    assembler.assemble_element(0, &solution, false).unwrap();
    assert!(assembler.kernel().saw_hessians.get());
}

#[test]
fn multi_rank_assembly_equals_serial_assembly() {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [4, 3]).unwrap();
    let layout = boussinesq_layout(&mesh);
    let solution = wiggly_solution(&layout);
    let kernel = BoussinesqKernel::from_layout(&layout, BoussinesqParameters::default()).unwrap();

    let mut serial_system = CsrSystem::serial(&mesh, &layout).unwrap();
    let options = AssemblyOptions::default();
    let mut assembler = Assembler::new(&mesh, &layout, kernel.clone(), natural_boundary, options).unwrap();
    assembler.assemble(&solution, &mut serial_system, true).unwrap();
    let serial_residual = serial_system.gather_residual().unwrap();
    let serial_jacobian = DMatrix::from(&serial_system.gather_jacobian().unwrap());

    let num_ranks = 3;
    let partition = ElementPartition::uniform(mesh.num_elements(), num_ranks);
    let (mesh, layout, solution, partition, kernel) = (&mesh, &layout, &solution, &partition, &kernel);
    let results: Vec<(DVector<f64>, DMatrix<f64>, usize)> = std::thread::scope(|scope| {
        let handles: Vec<_> = ThreadCommunicator::group(num_ranks)
            .into_iter()
            .map(|communicator| {
                scope.spawn(move || {
                    let rank = galerkin::assembly::Communicator::rank(&communicator);
                    let ownership = DofOwnership::uniform(layout.total_dofs(), num_ranks);
                    let mut system = CsrSystem::new(communicator, mesh, layout, partition, ownership).unwrap();
                    let options = AssemblyOptions::default();
                    let mut assembler = Assembler::new(mesh, layout, kernel.clone(), natural_boundary, options)
                        .unwrap()
                        .with_partition(partition, rank)
                        .unwrap();
                    let report = assembler.assemble(solution, &mut system, true).unwrap();
                    let residual = system.gather_residual().unwrap();
                    let jacobian = DMatrix::from(&system.gather_jacobian().unwrap());
                    (residual, jacobian, report.elements)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let total_elements: usize = results.iter().map(|(_, _, elements)| elements).sum();
    assert_eq!(total_elements, 12);
    for (residual, jacobian, _) in &results {
        assert_matrix_eq!(residual, serial_residual, comp = abs, tol = 1e-12);
        assert_matrix_eq!(jacobian, serial_jacobian, comp = abs, tol = 1e-12);
    }
}
