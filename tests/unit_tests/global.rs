use crate::scalar_layout;
use galerkin::assembly::{
    Communicator, CsrSystem, DofOwnership, ElementPartition, LinearSystem, SerialCommunicator, ThreadCommunicator,
};
use galerkin::element::Discretization;
use galerkin::error::{SystemError, SystemPart};
use galerkin::mesh::procedural::create_uniform_interval_mesh_1d;
use galerkin::mesh::MeshAccessor;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};

fn segment_block() -> DMatrix<f64> {
    DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0])
}

fn expected_stiffness() -> DMatrix<f64> {
    DMatrix::from_row_slice(
        4,
        4,
        &[
            1.0, -1.0, 0.0, 0.0,
            -1.0, 2.0, -1.0, 0.0,
            0.0, -1.0, 2.0, -1.0,
            0.0, 0.0, -1.0, 1.0,
        ],
    )
}

fn three_segment_system() -> CsrSystem<SerialCommunicator> {
    let mesh = create_uniform_interval_mesh_1d(0.0, 3.0, 3).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    CsrSystem::serial(&mesh, &layout).unwrap()
}

#[test]
fn pattern_follows_element_connectivity() {
    let mut system = three_segment_system();
    system.zero_jacobian();
    system.close_jacobian().unwrap();
    let jacobian = system.jacobian().unwrap();
    assert_eq!(jacobian.nrows(), 4);
    assert_eq!(jacobian.nnz(), 10);
    assert_eq!(jacobian.row(0).col_indices(), &[0, 1]);
    assert_eq!(jacobian.row(2).col_indices(), &[1, 2, 3]);
}

#[test]
fn blocks_accumulate_into_closed_system() {
    let mut system = three_segment_system();
    assert_eq!(system.num_dofs(), 4);
    for element in 0..3 {
        let indices = [element, element + 1];
        system
            .add_residual_block(&indices, &DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap();
        system.add_jacobian_block(&indices, &segment_block()).unwrap();
    }
    system.close_residual().unwrap();
    system.close_jacobian().unwrap();

    assert_eq!(system.residual().unwrap(), &DVector::from_column_slice(&[1.0, 2.0, 2.0, 1.0]));
    assert_matrix_eq!(DMatrix::from(system.jacobian().unwrap()), expected_stiffness());
}

#[test]
fn blocks_with_unsorted_indices_are_scattered_correctly() {
    let mut system = three_segment_system();
    // Same element, local nodes in reverse order
    let block = DMatrix::from_row_slice(2, 2, &[3.0, -1.0, -2.0, 4.0]);
    system.add_jacobian_block(&[2, 1], &block).unwrap();
    system.close_jacobian().unwrap();
    let jacobian = DMatrix::from(system.jacobian().unwrap());
    assert_eq!(jacobian[(2, 2)], 3.0);
    assert_eq!(jacobian[(2, 1)], -1.0);
    assert_eq!(jacobian[(1, 2)], -2.0);
    assert_eq!(jacobian[(1, 1)], 4.0);
}

#[test]
fn reading_before_close_is_an_error() {
    let mut system = three_segment_system();
    assert_eq!(system.residual().unwrap_err(), SystemError::NotFinalized(SystemPart::Residual));
    assert_eq!(system.jacobian().unwrap_err(), SystemError::NotFinalized(SystemPart::Jacobian));

    system.close_residual().unwrap();
    assert!(system.residual().is_ok());
    assert_eq!(
        system.finalized_mut().unwrap_err(),
        SystemError::NotFinalized(SystemPart::Jacobian)
    );
}

#[test]
fn closed_parts_reject_modification_until_zeroed() {
    let mut system = three_segment_system();
    system.close_residual().unwrap();
    system.close_jacobian().unwrap();

    let values = DVector::from_column_slice(&[1.0, 1.0]);
    assert_eq!(
        system.add_residual_block(&[0, 1], &values).unwrap_err(),
        SystemError::AlreadyFinalized(SystemPart::Residual)
    );
    assert_eq!(
        system.add_jacobian_block(&[0, 1], &segment_block()).unwrap_err(),
        SystemError::AlreadyFinalized(SystemPart::Jacobian)
    );
    assert_eq!(
        system.close_residual().unwrap_err(),
        SystemError::AlreadyFinalized(SystemPart::Residual)
    );
    assert_eq!(
        system.close_jacobian().unwrap_err(),
        SystemError::AlreadyFinalized(SystemPart::Jacobian)
    );

    system.zero_residual();
    system.add_residual_block(&[0, 1], &values).unwrap();
    assert!(system.residual().is_err());
}

#[test]
fn invalid_blocks_are_rejected() {
    let mut system = three_segment_system();
    assert_eq!(
        system.add_jacobian_block(&[0, 3], &segment_block()).unwrap_err(),
        SystemError::MissingEntry { row: 0, col: 3 }
    );
    assert_eq!(
        system
            .add_residual_block(&[1, 7], &DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap_err(),
        SystemError::IndexOutOfBounds { index: 7, size: 4 }
    );
    assert_eq!(
        system.add_jacobian_block(&[1, 7], &segment_block()).unwrap_err(),
        SystemError::IndexOutOfBounds { index: 7, size: 4 }
    );
    assert_eq!(
        system
            .add_residual_block(&[0, 1, 2], &DVector::zeros(2))
            .unwrap_err(),
        SystemError::BlockDimensionMismatch {
            indices: 3,
            rows: 2,
            cols: 1
        }
    );
    assert_eq!(
        system.add_jacobian_block(&[0], &segment_block()).unwrap_err(),
        SystemError::BlockDimensionMismatch {
            indices: 1,
            rows: 2,
            cols: 2
        }
    );
}

#[test]
fn ownership_must_match_communicator() {
    let mesh = create_uniform_interval_mesh_1d(0.0, 3.0, 3).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let partition = ElementPartition::serial(3);
    let result = CsrSystem::new(SerialCommunicator, &mesh, &layout, &partition, DofOwnership::uniform(4, 2));
    assert!(matches!(result, Err(SystemError::InvalidPattern(_))));
}

#[test]
fn contributions_to_foreign_rows_are_exchanged_at_close() {
    let mesh = create_uniform_interval_mesh_1d(0.0, 3.0, 3).unwrap();
    let layout = scalar_layout(&mesh, Discretization::Linear);
    let partition = ElementPartition::uniform(mesh.num_elements(), 2);
    let (mesh, layout, partition) = (&mesh, &layout, &partition);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = ThreadCommunicator::group(2)
            .into_iter()
            .map(|communicator| {
                scope.spawn(move || {
                    let rank = communicator.rank();
                    let ownership = DofOwnership::uniform(4, 2);
                    let mut system = CsrSystem::new(communicator, mesh, layout, partition, ownership).unwrap();
                    assert_eq!(system.owned_rows(), 2 * rank..2 * rank + 2);

                    system.zero_residual();
                    system.zero_jacobian();
                    for element in partition.owned_range(rank) {
                        let indices = [element, element + 1];
                        system
                            .add_residual_block(&indices, &DVector::from_column_slice(&[1.0, 1.0]))
                            .unwrap();
                        system.add_jacobian_block(&indices, &segment_block()).unwrap();
                    }
                    system.close_residual().unwrap();
                    system.close_jacobian().unwrap();

                    let owned = system.residual().unwrap().clone();
                    let residual = system.gather_residual().unwrap();
                    let jacobian = DMatrix::from(&system.gather_jacobian().unwrap());
                    (rank, owned, residual, jacobian)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for (rank, owned, residual, jacobian) in results {
        let expected_owned = if rank == 0 { [1.0, 2.0] } else { [2.0, 1.0] };
        assert_eq!(owned, DVector::from_column_slice(&expected_owned));
        assert_eq!(residual, DVector::from_column_slice(&[1.0, 2.0, 2.0, 1.0]));
        assert_matrix_eq!(jacobian, expected_stiffness());
    }
}
