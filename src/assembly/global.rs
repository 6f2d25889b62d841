//! The global sparse system and the scatter of element contributions into it.

use crate::assembly::communicator::{Communicator, DofOwnership, ElementPartition, SerialCommunicator};
use crate::dof::{FieldLayout, LocalDofMap};
use crate::error::{SystemError, SystemPart};
use crate::mesh::MeshAccessor;
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::slice::ParallelSliceMut;
use std::ops::Range;

/// A global residual vector and Jacobian matrix, modified through additive block updates.
///
/// Updates become visible only after the corresponding close operation, which is collective
/// across all ranks sharing the system.
pub trait LinearSystem {
    /// Number of global DOFs (rows and columns of the full system).
    fn num_dofs(&self) -> usize;

    fn zero_residual(&mut self);

    fn zero_jacobian(&mut self);

    /// Marks the Jacobian as out of date without touching its values.
    ///
    /// Called by residual-only passes, so that a Jacobian of an earlier pass is not mistaken for
    /// one of the current state. The next [`zero_jacobian`](Self::zero_jacobian) reopens it.
    fn invalidate_jacobian(&mut self) {
        self.zero_jacobian();
    }

    fn add_residual_block(&mut self, indices: &[usize], values: &DVector<f64>) -> Result<(), SystemError>;

    fn add_jacobian_block(&mut self, indices: &[usize], block: &DMatrix<f64>) -> Result<(), SystemError>;

    fn close_residual(&mut self) -> Result<(), SystemError>;

    fn close_jacobian(&mut self) -> Result<(), SystemError>;
}

/// A row-distributed CSR system.
///
/// Each rank stores the rows in its owned range of a [`DofOwnership`]. Contributions to rows
/// of other ranks are staged locally and sent to their owners when the system is closed.
#[derive(Debug)]
pub struct CsrSystem<C> {
    communicator: C,
    ownership: DofOwnership,
    rows: Range<usize>,
    residual: DVector<f64>,
    jacobian: CsrMatrix<f64>,
    /// Off-rank residual entries, per destination rank
    staged_residual: Vec<Vec<(usize, f64)>>,
    /// Off-rank Jacobian entries, per destination rank
    staged_jacobian: Vec<Vec<(usize, usize, f64)>>,
    residual_closed: bool,
    jacobian_closed: bool,
    row_permutation: Vec<usize>,
}

impl CsrSystem<SerialCommunicator> {
    /// A system owned entirely by a single rank, with all elements of the mesh.
    pub fn serial(mesh: &impl MeshAccessor, layout: &FieldLayout) -> Result<Self, SystemError> {
        let partition = ElementPartition::serial(mesh.num_elements());
        let ownership = DofOwnership::serial(layout.total_dofs());
        Self::new(SerialCommunicator, mesh, layout, &partition, ownership)
    }
}

impl<C: Communicator> CsrSystem<C> {
    /// Builds the system for the rank of `communicator`.
    ///
    /// The sparsity pattern of the owned rows is assembled from the DOF maps of the elements
    /// owned by this rank, together with the entries that other ranks' elements contribute to
    /// the owned rows. This is a collective operation.
    pub fn new(
        communicator: C,
        mesh: &impl MeshAccessor,
        layout: &FieldLayout,
        partition: &ElementPartition,
        ownership: DofOwnership,
    ) -> Result<Self, SystemError> {
        let num_dofs = layout.total_dofs();
        if ownership.num_dofs() != num_dofs || ownership.num_ranks() != communicator.size() {
            return Err(SystemError::InvalidPattern(format!(
                "ownership of {} DOFs over {} ranks does not match a system of {} DOFs over {} ranks",
                ownership.num_dofs(),
                ownership.num_ranks(),
                num_dofs,
                communicator.size()
            )));
        }

        let rank = communicator.rank();
        let size = communicator.size();
        let rows = ownership.owned_range(rank);

        let mut owned_entries = Vec::new();
        let mut remote_entries = vec![Vec::new(); size];
        let mut dof_map = LocalDofMap::default();
        for element in partition.owned_range(rank) {
            dof_map.populate(mesh, layout, element);
            let indices = dof_map.global_indices();
            for &i in indices {
                let owner = ownership
                    .owner(i)
                    .ok_or(SystemError::IndexOutOfBounds { index: i, size: num_dofs })?;
                let target = if owner == rank {
                    &mut owned_entries
                } else {
                    &mut remote_entries[owner]
                };
                target.extend(indices.iter().map(|&j| (i, j)));
            }
        }

        for received in communicator.exchange(remote_entries)? {
            owned_entries.extend(received);
        }

        let pattern = assemble_pattern(rows.clone(), num_dofs, owned_entries)?;
        let nnz = pattern.nnz();
        let jacobian = CsrMatrix::try_from_pattern_and_values(pattern, vec![0.0; nnz])
            .map_err(|err| SystemError::InvalidPattern(err.to_string()))?;
        debug!(
            "Rank {rank}/{size}: system rows {}..{}, {nnz} stored Jacobian entries",
            rows.start, rows.end
        );

        Ok(Self {
            communicator,
            ownership,
            residual: DVector::zeros(rows.len()),
            rows,
            jacobian,
            staged_residual: vec![Vec::new(); size],
            staged_jacobian: vec![Vec::new(); size],
            residual_closed: false,
            jacobian_closed: false,
            row_permutation: Vec::new(),
        })
    }

    pub fn communicator(&self) -> &C {
        &self.communicator
    }

    pub fn ownership(&self) -> &DofOwnership {
        &self.ownership
    }

    /// The global indices of the rows stored on this rank.
    pub fn owned_rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// The owned part of the residual.
    pub fn residual(&self) -> Result<&DVector<f64>, SystemError> {
        if !self.residual_closed {
            return Err(SystemError::NotFinalized(SystemPart::Residual));
        }
        Ok(&self.residual)
    }

    /// The owned rows of the Jacobian. Columns use global indices.
    pub fn jacobian(&self) -> Result<&CsrMatrix<f64>, SystemError> {
        if !self.jacobian_closed {
            return Err(SystemError::NotFinalized(SystemPart::Jacobian));
        }
        Ok(&self.jacobian)
    }

    /// Mutable access to the closed residual and Jacobian, for example to apply constraints.
    pub fn finalized_mut(&mut self) -> Result<(&mut DVector<f64>, &mut CsrMatrix<f64>), SystemError> {
        if !self.residual_closed {
            return Err(SystemError::NotFinalized(SystemPart::Residual));
        }
        if !self.jacobian_closed {
            return Err(SystemError::NotFinalized(SystemPart::Jacobian));
        }
        Ok((&mut self.residual, &mut self.jacobian))
    }

    /// Collects the full residual on every rank. This is a collective operation.
    pub fn gather_residual(&self) -> Result<DVector<f64>, SystemError> {
        let residual = self.residual()?;
        let outgoing: Vec<Vec<_>> = (0..self.communicator.size())
            .map(|_| vec![(self.rows.start, residual.as_slice().to_vec())])
            .collect();
        let mut global = DVector::zeros(self.num_dofs());
        for (first_row, values) in self.communicator.exchange(outgoing)?.into_iter().flatten() {
            global
                .rows_mut(first_row, values.len())
                .copy_from_slice(&values);
        }
        Ok(global)
    }

    /// Collects the full Jacobian on every rank. This is a collective operation.
    pub fn gather_jacobian(&self) -> Result<CsrMatrix<f64>, SystemError> {
        let jacobian = self.jacobian()?;
        let first_row = self.rows.start;
        let triplets: Vec<_> = jacobian
            .triplet_iter()
            .map(|(i, j, &v)| (first_row + i, j, v))
            .collect();
        let outgoing: Vec<Vec<_>> = (0..self.communicator.size())
            .map(|_| triplets.clone())
            .collect();

        let n = self.num_dofs();
        let mut coo = CooMatrix::new(n, n);
        for (i, j, v) in self.communicator.exchange(outgoing)?.into_iter().flatten() {
            coo.push(i, j, v);
        }
        Ok(CsrMatrix::from(&coo))
    }

    fn check_index(&self, index: usize) -> Result<(), SystemError> {
        let size = self.num_dofs();
        if index >= size {
            return Err(SystemError::IndexOutOfBounds { index, size });
        }
        Ok(())
    }

    fn owner(&self, index: usize) -> Result<usize, SystemError> {
        self.ownership.owner(index).ok_or(SystemError::IndexOutOfBounds {
            index,
            size: self.num_dofs(),
        })
    }
}

impl<C: Communicator> LinearSystem for CsrSystem<C> {
    fn num_dofs(&self) -> usize {
        self.ownership.num_dofs()
    }

    fn zero_residual(&mut self) {
        self.residual.fill(0.0);
        self.staged_residual.iter_mut().for_each(Vec::clear);
        self.residual_closed = false;
    }

    fn zero_jacobian(&mut self) {
        self.jacobian.values_mut().fill(0.0);
        self.staged_jacobian.iter_mut().for_each(Vec::clear);
        self.jacobian_closed = false;
    }

    fn invalidate_jacobian(&mut self) {
        self.staged_jacobian.iter_mut().for_each(Vec::clear);
        self.jacobian_closed = false;
    }

    fn add_residual_block(&mut self, indices: &[usize], values: &DVector<f64>) -> Result<(), SystemError> {
        if self.residual_closed {
            return Err(SystemError::AlreadyFinalized(SystemPart::Residual));
        }
        if values.len() != indices.len() {
            return Err(SystemError::BlockDimensionMismatch {
                indices: indices.len(),
                rows: values.len(),
                cols: 1,
            });
        }
        for (&i, &v) in indices.iter().zip(values.iter()) {
            if self.rows.contains(&i) {
                self.residual[i - self.rows.start] += v;
            } else {
                let owner = self.owner(i)?;
                self.staged_residual[owner].push((i, v));
            }
        }
        Ok(())
    }

    fn add_jacobian_block(&mut self, indices: &[usize], block: &DMatrix<f64>) -> Result<(), SystemError> {
        if self.jacobian_closed {
            return Err(SystemError::AlreadyFinalized(SystemPart::Jacobian));
        }
        let n = indices.len();
        if block.nrows() != n || block.ncols() != n {
            return Err(SystemError::BlockDimensionMismatch {
                indices: n,
                rows: block.nrows(),
                cols: block.ncols(),
            });
        }
        for &j in indices {
            self.check_index(j)?;
        }

        self.row_permutation.clear();
        self.row_permutation.extend(0..n);
        self.row_permutation
            .sort_unstable_by_key(|&local| indices[local]);

        for (local_row, &i) in indices.iter().enumerate() {
            if self.rows.contains(&i) {
                let mut csr_row = self.jacobian.row_mut(i - self.rows.start);
                add_element_row_to_csr_row(&mut csr_row, i, indices, &self.row_permutation, block, local_row)?;
            } else {
                let owner = self.owner(i)?;
                let staged = &mut self.staged_jacobian[owner];
                staged.extend(
                    indices
                        .iter()
                        .enumerate()
                        .map(|(local_col, &j)| (i, j, block[(local_row, local_col)])),
                );
            }
        }
        Ok(())
    }

    fn close_residual(&mut self) -> Result<(), SystemError> {
        if self.residual_closed {
            return Err(SystemError::AlreadyFinalized(SystemPart::Residual));
        }
        let staged = std::mem::replace(&mut self.staged_residual, vec![Vec::new(); self.communicator.size()]);
        for (i, v) in self.communicator.exchange(staged)?.into_iter().flatten() {
            if !self.rows.contains(&i) {
                return Err(SystemError::IndexOutOfBounds {
                    index: i,
                    size: self.num_dofs(),
                });
            }
            self.residual[i - self.rows.start] += v;
        }
        self.residual_closed = true;
        Ok(())
    }

    fn close_jacobian(&mut self) -> Result<(), SystemError> {
        if self.jacobian_closed {
            return Err(SystemError::AlreadyFinalized(SystemPart::Jacobian));
        }
        let staged = std::mem::replace(&mut self.staged_jacobian, vec![Vec::new(); self.communicator.size()]);
        for (i, j, v) in self.communicator.exchange(staged)?.into_iter().flatten() {
            if !self.rows.contains(&i) {
                return Err(SystemError::IndexOutOfBounds {
                    index: i,
                    size: self.num_dofs(),
                });
            }
            let mut row = self.jacobian.row_mut(i - self.rows.start);
            let (cols, values) = row.cols_and_values_mut();
            let k = cols
                .binary_search(&j)
                .map_err(|_| SystemError::MissingEntry { row: i, col: j })?;
            values[k] += v;
        }
        self.jacobian_closed = true;
        Ok(())
    }
}

/// Builds the pattern of the rows `rows` of an `_ x num_cols` matrix from (possibly duplicate)
/// global `(row, col)` entries.
fn assemble_pattern(
    rows: Range<usize>,
    num_cols: usize,
    mut entries: Vec<(usize, usize)>,
) -> Result<SparsityPattern, SystemError> {
    entries.par_sort_unstable();
    entries.dedup();

    let num_rows = rows.len();
    let mut row_offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(entries.len());
    row_offsets.push(0);

    let mut current_row = 0;
    for (i, j) in entries {
        if !rows.contains(&i) || j >= num_cols {
            return Err(SystemError::IndexOutOfBounds { index: i.max(j), size: num_cols });
        }
        let local_row = i - rows.start;
        // Loop to correctly handle consecutive empty rows
        while local_row > current_row {
            row_offsets.push(column_indices.len());
            current_row += 1;
        }
        column_indices.push(j);
    }

    // Fill out offsets for remaining empty rows
    while row_offsets.len() < num_rows + 1 {
        row_offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_cols, row_offsets, column_indices)
        .map_err(|err| SystemError::InvalidPattern(err.to_string()))
}

/// Adds row `local_row` of an element block to the CSR row of global row `global_row`.
///
/// `sorted_permutation` lists the local indices ordered by their global index, so that the
/// CSR row is traversed only once.
fn add_element_row_to_csr_row(
    row: &mut CsrRowMut<f64>,
    global_row: usize,
    indices: &[usize],
    sorted_permutation: &[usize],
    block: &DMatrix<f64>,
    local_row: usize,
) -> Result<(), SystemError> {
    let (cols, values) = row.cols_and_values_mut();
    let mut cursor = 0;
    for &local_col in sorted_permutation {
        let global_col = indices[local_col];
        while cursor < cols.len() && cols[cursor] < global_col {
            cursor += 1;
        }
        if cursor == cols.len() || cols[cursor] != global_col {
            return Err(SystemError::MissingEntry {
                row: global_row,
                col: global_col,
            });
        }
        values[cursor] += block[(local_row, local_col)];
    }
    Ok(())
}
