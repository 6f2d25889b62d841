//! Integral and pointwise quantities of a solution.

use crate::assembly::{AssemblyOptions, Communicator, ElementBuffers, LocalFields};
use crate::dof::FieldLayout;
use crate::element::{evaluate_reference_basis, ReferenceBasis};
use crate::error::AssemblyError;
use crate::mesh::MeshAccessor;
use crate::quadrature::QuadratureRegistry;
use crate::solution::SolutionStore;
use eyre::{eyre, WrapErr};
use log::debug;
use nalgebra::DMatrix;
use std::ops::Range;

/// Nodes closer than this (in every coordinate) to a sampled point are considered to coincide.
pub const NODE_TOLERANCE: f64 = 1e-6;

/// Computes `∫ |v|² dΩ` of the velocity with the given component fields.
///
/// Each rank integrates over `owned_elements`, and the partial integrals are summed across the
/// ranks of `communicator`, so every rank receives the integral over the whole mesh. This is a
/// collective operation. Quadrature strength and geometry discretization are taken from
/// `options`.
pub fn kinetic_energy<C: Communicator>(
    mesh: &impl MeshAccessor,
    layout: &FieldLayout,
    solution: &(impl ?Sized + SolutionStore),
    velocity: &[&str],
    owned_elements: Range<usize>,
    communicator: &C,
    options: &AssemblyOptions,
) -> eyre::Result<f64> {
    let components = velocity
        .iter()
        .map(|name| layout.field_index(name))
        .collect::<Result<Vec<_>, _>>()?;
    let quadrature = QuadratureRegistry::with_strength(options.quadrature_strength)
        .wrap_err("failed to construct quadrature rules")?;

    let mut buffers = ElementBuffers::default();
    let mut local = 0.0;
    for element in owned_elements {
        buffers.prepare_element(mesh, layout, solution, element, options.geometry_discretization, false);
        let ElementBuffers {
            ranges,
            snapshot,
            geometry,
            volume_state,
            shape_evaluator,
            shapes,
            ..
        } = &mut buffers;
        let ranges: &[Range<usize>] = ranges;
        let fields = LocalFields::new(snapshot.current(), ranges);
        let geometry_type = geometry.geometry_type();

        for (w, xi) in quadrature.volume_rule(geometry_type).iter() {
            geometry
                .evaluate(xi, volume_state)
                .wrap_err_with(|| format!("failed to integrate over element {element}"))?;
            let weight = w * volume_state.determinant.abs();
            for &field in &components {
                let shape = &mut shapes[field];
                shape_evaluator.evaluate(
                    geometry_type,
                    layout.field(field).discretization,
                    xi,
                    volume_state,
                    false,
                    shape,
                );
                let v = fields.interpolate(field, shape);
                local += v * v * weight;
            }
        }
    }

    let total = communicator.all_reduce_sum(local)?;
    debug!(
        "Kinetic energy on rank {}: {local} (local), {total} (global)",
        communicator.rank()
    );
    Ok(total)
}

/// Evaluates a field at the reference coordinates `xi` of an element.
///
/// Only the first `reference_dim` components of `xi` are used. The element need not be owned by
/// the calling rank, since every rank can read the solution store.
pub fn element_value(
    mesh: &impl MeshAccessor,
    layout: &FieldLayout,
    solution: &(impl ?Sized + SolutionStore),
    field: &str,
    element: usize,
    xi: &[f64; 3],
) -> eyre::Result<f64> {
    let field_index = layout.field_index(field)?;
    if element >= mesh.num_elements() {
        return Err(eyre!(
            "element {element} is out of bounds for a mesh with {} elements",
            mesh.num_elements()
        ));
    }
    let discretization = layout.field(field_index).discretization;
    let mut dofs = Vec::new();
    mesh.populate_element_dofs(element, discretization, &mut dofs);
    let mut basis = ReferenceBasis::default();
    evaluate_reference_basis(mesh.geometry_type(element), discretization, xi, false, &mut basis);
    if basis.num_nodes() != dofs.len() {
        return Err(AssemblyError::DimensionMismatch {
            context: "element basis",
            expected: dofs.len(),
            actual: basis.num_nodes(),
        }
        .into());
    }

    Ok(dofs
        .iter()
        .zip(basis.values.iter())
        .map(|(&dof, &phi)| solution.current(field_index, dof) * phi)
        .sum())
}

/// Samples a continuous field at the node located at `point`.
///
/// Each rank searches the nodes of its `owned_elements`. The value found by the lowest rank is
/// returned on every rank, or `None` if no rank has a node at `point`. Nodes match when every
/// coordinate lies within [`NODE_TOLERANCE`]. This is a collective operation.
pub fn point_value<C: Communicator>(
    mesh: &impl MeshAccessor,
    layout: &FieldLayout,
    solution: &(impl ?Sized + SolutionStore),
    field: &str,
    point: &[f64],
    owned_elements: Range<usize>,
    communicator: &C,
) -> eyre::Result<Option<f64>> {
    let field_index = layout.field_index(field)?;
    let discretization = layout.field(field_index).discretization;
    if !discretization.is_continuous() {
        return Err(eyre!("field \"{field}\" is discontinuous and has no values at nodes"));
    }
    if point.len() != mesh.dimension() {
        return Err(AssemblyError::DimensionMismatch {
            context: "sampled point",
            expected: mesh.dimension(),
            actual: point.len(),
        }
        .into());
    }

    let mut dofs = Vec::new();
    let mut coordinates = DMatrix::zeros(0, 0);
    let mut local = None;
    'elements: for element in owned_elements {
        mesh.populate_element_dofs(element, discretization, &mut dofs);
        mesh.populate_element_coordinates(element, discretization, &mut coordinates);
        for (j, &dof) in dofs.iter().enumerate() {
            let coincides = coordinates
                .column(j)
                .iter()
                .zip(point)
                .all(|(x, p)| (x - p).abs() < NODE_TOLERANCE);
            if coincides {
                local = Some(solution.current(field_index, dof));
                break 'elements;
            }
        }
    }

    let outgoing: Vec<Vec<Option<f64>>> = (0..communicator.size()).map(|_| vec![local]).collect();
    let value = communicator
        .exchange(outgoing)?
        .into_iter()
        .flatten()
        .flatten()
        .next();
    debug!(
        "Value of {field} at {point:?} on rank {}: {local:?} (local), {value:?} (global)",
        communicator.rank()
    );
    Ok(value)
}
