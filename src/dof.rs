//! Fields and the mapping from element-local to global degrees of freedom.
//!
//! A system is described by an ordered list of [`FieldDescriptor`]s. Global system DOFs are laid
//! out field by field: the DOFs of field `f` occupy `offset(f) .. offset(f) + num_field_dofs(f)`,
//! and within that range they follow the mesh numbering for the field's discretization.

use crate::element::Discretization;
use crate::error::AssemblyError;
use crate::mesh::MeshAccessor;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A scalar unknown field of the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub discretization: Discretization,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, discretization: Discretization) -> Self {
        Self {
            name: name.into(),
            discretization,
        }
    }
}

/// Global layout of all fields of a system on a particular mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    fields: Vec<FieldDescriptor>,
    /// Prefix sum of field DOF counts, one entry longer than `fields`
    offsets: Vec<usize>,
}

impl FieldLayout {
    pub fn new(mesh: &impl MeshAccessor, fields: Vec<FieldDescriptor>) -> Result<Self, AssemblyError> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|other| other.name == field.name) {
                return Err(AssemblyError::DuplicateField(field.name.clone()));
            }
        }
        let mut offsets = Vec::with_capacity(fields.len() + 1);
        offsets.push(0);
        for field in &fields {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + mesh.num_dofs(field.discretization));
        }
        Ok(Self { fields, offsets })
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &FieldDescriptor {
        &self.fields[index]
    }

    /// Fails with [`AssemblyError::UnknownField`] if `index` is not a field of the layout.
    pub fn check_field_index(&self, index: usize) -> Result<(), AssemblyError> {
        if index < self.num_fields() {
            Ok(())
        } else {
            Err(AssemblyError::UnknownField(format!("#{index}")))
        }
    }

    pub fn field_index(&self, name: &str) -> Result<usize, AssemblyError> {
        self.fields
            .iter()
            .position(|field| field.name == name)
            .ok_or_else(|| AssemblyError::UnknownField(name.to_string()))
    }

    /// Global index of the first DOF of the field.
    pub fn offset(&self, field: usize) -> usize {
        self.offsets[field]
    }

    pub fn num_field_dofs(&self, field: usize) -> usize {
        self.offsets[field + 1] - self.offsets[field]
    }

    pub fn field_range(&self, field: usize) -> Range<usize> {
        self.offsets[field]..self.offsets[field + 1]
    }

    pub fn total_dofs(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }
}

/// Local-to-global DOF map of a single element, for all fields.
///
/// Local DOFs are concatenated in field order. The map is rebuilt for every element; its storage
/// is reused.
#[derive(Debug, Clone, Default)]
pub struct LocalDofMap {
    element: usize,
    ranges: Vec<Range<usize>>,
    /// Per-field DOF indices in the mesh numbering of the field's discretization
    field_dofs: Vec<Vec<usize>>,
    /// Global system indices, concatenated over all fields
    global: Vec<usize>,
}

impl LocalDofMap {
    pub fn populate(&mut self, mesh: &impl MeshAccessor, layout: &FieldLayout, element: usize) {
        let num_fields = layout.num_fields();
        self.element = element;
        self.ranges.clear();
        self.field_dofs.resize_with(num_fields, Vec::new);
        self.global.clear();

        for (f, field) in layout.fields().iter().enumerate() {
            let dofs = &mut self.field_dofs[f];
            mesh.populate_element_dofs(element, field.discretization, dofs);
            debug_assert_eq!(dofs.len(), mesh.element_dof_count(element, field.discretization));
            let start = self.global.len();
            let offset = layout.offset(f);
            self.global.extend(dofs.iter().map(|dof| offset + dof));
            self.ranges.push(start..self.global.len());
        }
    }

    pub fn element(&self) -> usize {
        self.element
    }

    pub fn num_fields(&self) -> usize {
        self.ranges.len()
    }

    /// Range of the field's entries in the concatenated local numbering.
    pub fn field_range(&self, field: usize) -> Range<usize> {
        self.ranges[field].clone()
    }

    pub fn field_count(&self, field: usize) -> usize {
        self.ranges[field].len()
    }

    /// The field's DOF indices in the mesh numbering for its discretization.
    pub fn field_dofs(&self, field: usize) -> &[usize] {
        &self.field_dofs[field]
    }

    /// Global system indices of all local DOFs.
    pub fn global_indices(&self) -> &[usize] {
        &self.global
    }

    pub fn total(&self) -> usize {
        self.global.len()
    }
}
