//! Element-by-element assembly of residuals and Jacobians into a global system.
//!
//! An assembly pass visits the elements owned by the calling rank one at a time. For each
//! element it builds the local DOF map, gathers the nodal values, accumulates boundary fluxes,
//! runs the kernel at every volume quadrature point and finally scatters the local residual
//! (and Jacobian, if requested) into the global system. Once all owned elements are done, the
//! residual and Jacobian are closed. Closing is collective across ranks.

use crate::boundary::{BoundaryCondition, BoundaryResolver};
use crate::dof::FieldLayout;
use crate::element::Discretization;
use crate::error::AssemblyError;
use crate::geometry::{ElementGeometry, JacobianState};
use crate::mesh::MeshAccessor;
use crate::quadrature::{QuadratureRegistry, QuadratureRule};
use crate::shape::{FieldShape, ShapeEvaluator};
use crate::solution::SolutionStore;
use eyre::WrapErr;
use galerkin_autodiff::{Tape, TapeScalar, Var};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::ops::Range;

mod boundary;
pub mod buffers;
pub mod communicator;
pub mod global;
pub mod local;

pub use buffers::{ElementBuffers, ElementSnapshot};
pub use communicator::{
    CommunicationError, Communicator, DofOwnership, ElementPartition, SerialCommunicator, ThreadCommunicator,
};
pub use global::{CsrSystem, LinearSystem};
pub use local::{JacobianStrategy, LocalFields, LocalFieldsMut, LocalJacobian, QuadraturePoint, WeakForm};

/// Configuration of an [`Assembler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// Polynomial degree integrated exactly by the volume and face rules.
    pub quadrature_strength: usize,
    /// Time passed to boundary conditions and kernels.
    pub time: f64,
    /// Discretization of the geometric map. Must be continuous.
    pub geometry_discretization: Discretization,
    /// Evaluate basis Hessians even if the kernel does not require them.
    pub hessians: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            quadrature_strength: 7,
            time: 0.0,
            geometry_discretization: Discretization::Linear,
            hessians: false,
        }
    }
}

/// Statistics of one assembly pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub elements: usize,
    pub quadrature_points: usize,
    /// The largest number of tape nodes recorded for a single element.
    pub peak_tape_length: usize,
}

/// Assembles a [`WeakForm`] over the elements owned by one rank.
///
/// The assembler owns the differentiation tape of its rank. Since the tape is not thread-safe,
/// neither is the assembler; every rank creates its own.
#[derive(Debug)]
pub struct Assembler<'a, M, K, B> {
    mesh: &'a M,
    layout: &'a FieldLayout,
    kernel: K,
    boundary_condition: B,
    options: AssemblyOptions,
    quadrature: QuadratureRegistry,
    owned_elements: Range<usize>,
    tape: Tape,
    resolver: BoundaryResolver,
    buffers: ElementBuffers,
}

impl<'a, M, K, B> Assembler<'a, M, K, B>
where
    M: MeshAccessor,
    K: WeakForm,
    B: BoundaryCondition,
{
    /// Creates an assembler owning all elements of the mesh.
    pub fn new(
        mesh: &'a M,
        layout: &'a FieldLayout,
        kernel: K,
        boundary_condition: B,
        options: AssemblyOptions,
    ) -> eyre::Result<Self> {
        if !options.geometry_discretization.is_continuous() {
            return Err(AssemblyError::DiscontinuousGeometry.into());
        }
        kernel.check_layout(layout)?;
        let quadrature = QuadratureRegistry::with_strength(options.quadrature_strength)
            .wrap_err("failed to construct quadrature rules")?;
        Ok(Self {
            mesh,
            layout,
            kernel,
            boundary_condition,
            options,
            quadrature,
            owned_elements: 0..mesh.num_elements(),
            tape: Tape::new(),
            resolver: BoundaryResolver::default(),
            buffers: ElementBuffers::default(),
        })
    }

    /// Restricts assembly to the elements that `partition` assigns to `rank`.
    pub fn with_partition(mut self, partition: &ElementPartition, rank: usize) -> eyre::Result<Self> {
        if partition.num_elements() != self.mesh.num_elements() {
            return Err(AssemblyError::DimensionMismatch {
                context: "element partition",
                expected: self.mesh.num_elements(),
                actual: partition.num_elements(),
            }
            .into());
        }
        self.owned_elements = partition.owned_range(rank);
        if self.owned_elements.is_empty() {
            warn!("Rank {rank} owns no elements");
        }
        Ok(self)
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    /// Sets the time passed to boundary conditions and kernels in subsequent passes.
    pub fn set_time(&mut self, time: f64) {
        self.options.time = time;
    }

    pub fn owned_elements(&self) -> Range<usize> {
        self.owned_elements.clone()
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Assembles the residual, and the Jacobian if `request_jacobian` is set, into `system`.
    ///
    /// The system is zeroed first. A residual-only pass leaves the Jacobian not finalized. Tape
    /// recording is enabled only while a Jacobian is requested from a kernel with
    /// [`JacobianStrategy::Automatic`]; otherwise the tape is paused and does not grow.
    pub fn assemble<S>(
        &mut self,
        solution: &(impl ?Sized + SolutionStore),
        system: &mut S,
        request_jacobian: bool,
    ) -> eyre::Result<AssemblyReport>
    where
        S: ?Sized + LinearSystem,
    {
        if system.num_dofs() != self.layout.total_dofs() {
            return Err(AssemblyError::DimensionMismatch {
                context: "global system",
                expected: self.layout.total_dofs(),
                actual: system.num_dofs(),
            }
            .into());
        }

        system.zero_residual();
        if request_jacobian {
            system.zero_jacobian();
        } else {
            system.invalidate_jacobian();
        }
        if request_jacobian && self.kernel.jacobian_strategy() == JacobianStrategy::Automatic {
            self.tape.continue_recording();
        } else {
            self.tape.pause_recording();
        }
        self.tape.reset_peak_len();

        let mut report = AssemblyReport::default();
        for element in self.owned_elements.clone() {
            report.quadrature_points += self
                .assemble_element_into_buffers(element, solution, request_jacobian)
                .wrap_err_with(|| format!("failed to assemble element {element}"))?;
            report.elements += 1;

            let indices = self.buffers.dof_map.global_indices();
            system.add_residual_block(indices, &self.buffers.residual)?;
            if request_jacobian {
                system.add_jacobian_block(indices, &self.buffers.jacobian)?;
            }
        }

        system.close_residual().wrap_err("failed to close residual")?;
        if request_jacobian {
            system.close_jacobian().wrap_err("failed to close Jacobian")?;
        }

        report.peak_tape_length = self.tape.peak_len();
        debug!(
            "Assembled {} elements ({} quadrature points), Jacobian: {}, peak tape length: {}",
            report.elements, report.quadrature_points, request_jacobian, report.peak_tape_length
        );
        Ok(report)
    }

    /// Assembles a single element and returns its local buffers.
    ///
    /// This performs the element part of [`assemble`](Self::assemble) without touching any
    /// global system. The tape is left in its current pause state, so a Jacobian from an
    /// [`Automatic`](JacobianStrategy::Automatic) kernel requires recording to be enabled.
    pub fn assemble_element(
        &mut self,
        element: usize,
        solution: &(impl ?Sized + SolutionStore),
        with_jacobian: bool,
    ) -> Result<&ElementBuffers, AssemblyError> {
        self.assemble_element_into_buffers(element, solution, with_jacobian)?;
        Ok(&self.buffers)
    }

    /// Returns the number of volume quadrature points visited.
    fn assemble_element_into_buffers(
        &mut self,
        element: usize,
        solution: &(impl ?Sized + SolutionStore),
        with_jacobian: bool,
    ) -> Result<usize, AssemblyError> {
        self.buffers.prepare_element(
            self.mesh,
            self.layout,
            solution,
            element,
            self.options.geometry_discretization,
            with_jacobian,
        );

        boundary::accumulate_boundary_load(
            self.mesh,
            self.layout,
            &self.boundary_condition,
            &self.resolver,
            &self.quadrature,
            self.options.time,
            &mut self.buffers,
        )?;

        let rule = self.quadrature.volume_rule(self.mesh.geometry_type(element));
        let volume = VolumeContext {
            layout: self.layout,
            rule,
            time: self.options.time,
            hessians: self.options.hessians || self.kernel.requires_hessians(),
        };

        let automatic = with_jacobian && self.kernel.jacobian_strategy() == JacobianStrategy::Automatic;
        if automatic {
            volume.residual_and_tape_jacobian(&self.kernel, &self.tape, &mut self.buffers)?;
        } else {
            volume.residual_and_analytic_jacobian(&self.kernel, &mut self.buffers, with_jacobian)?;
        }

        let buffers = &mut self.buffers;
        buffers.residual += &buffers.load;
        Ok(rule.num_points())
    }
}

/// Volume quadrature loop of one element.
struct VolumeContext<'a> {
    layout: &'a FieldLayout,
    rule: &'a QuadratureRule,
    time: f64,
    hessians: bool,
}

impl VolumeContext<'_> {
    /// Evaluates geometry and field shapes at `xi` and returns the scaled quadrature weight.
    fn evaluate_point(
        &self,
        w: f64,
        xi: &[f64; 3],
        geometry: &mut ElementGeometry,
        state: &mut JacobianState,
        shape_evaluator: &mut ShapeEvaluator,
        shapes: &mut [FieldShape],
    ) -> Result<f64, AssemblyError> {
        geometry.evaluate(xi, state)?;
        let geometry_type = geometry.geometry_type();
        for (field, shape) in self.layout.fields().iter().zip(shapes.iter_mut()) {
            shape_evaluator.evaluate(geometry_type, field.discretization, xi, state, self.hessians, shape);
        }
        Ok(w * state.determinant.abs())
    }

    /// Adds the residual, and the analytic Jacobian if `with_jacobian` is set, evaluating the
    /// geometry and field shapes once per point for both.
    fn residual_and_analytic_jacobian<K: WeakForm>(
        &self,
        kernel: &K,
        buffers: &mut ElementBuffers,
        with_jacobian: bool,
    ) -> Result<(), AssemblyError> {
        let ElementBuffers {
            ranges,
            snapshot,
            geometry,
            volume_state,
            shape_evaluator,
            shapes,
            residual,
            jacobian,
            ..
        } = buffers;
        let ranges: &[Range<usize>] = ranges;
        let current = LocalFields::new(snapshot.current(), ranges);
        let previous = LocalFields::new(snapshot.previous(), ranges);

        for (w, xi) in self.rule.iter() {
            let weight = self.evaluate_point(w, xi, geometry, volume_state, shape_evaluator, shapes)?;
            let point = QuadraturePoint::new(weight, volume_state.point.as_slice(), self.time, shapes);
            let mut output = LocalFieldsMut::new(residual.as_mut_slice(), ranges);
            kernel.accumulate_residual(&point, &current, &previous, &mut output);
            if with_jacobian {
                let mut output = LocalJacobian::new(jacobian, ranges);
                kernel.accumulate_jacobian(&point, &current, &previous, &mut output)?;
            }
        }
        Ok(())
    }

    /// Records the residual on the tape and extracts `K = -dR/du` from it.
    fn residual_and_tape_jacobian<K: WeakForm>(
        &self,
        kernel: &K,
        tape: &Tape,
        buffers: &mut ElementBuffers,
    ) -> Result<(), AssemblyError> {
        let ElementBuffers {
            ranges,
            snapshot,
            geometry,
            volume_state,
            shape_evaluator,
            shapes,
            residual,
            jacobian,
            ..
        } = buffers;
        let ranges: &[Range<usize>] = ranges;

        let recording = tape.new_recording()?;
        let unknowns: Vec<Var> = snapshot
            .current()
            .iter()
            .map(|&u| recording.independent(u))
            .collect();
        let mut residual_vars = vec![<Var as TapeScalar>::zero(); unknowns.len()];

        let current = LocalFields::new(&unknowns, ranges);
        let previous = LocalFields::new(snapshot.previous(), ranges);
        for (w, xi) in self.rule.iter() {
            let weight = self.evaluate_point(w, xi, geometry, volume_state, shape_evaluator, shapes)?;
            let point = QuadraturePoint::new(weight, volume_state.point.as_slice(), self.time, shapes);
            let mut output = LocalFieldsMut::new(&mut residual_vars, ranges);
            kernel.accumulate_residual(&point, &current, &previous, &mut output);
        }

        recording.jacobian_into(&residual_vars, &unknowns, jacobian)?;
        jacobian.neg_mut();
        for (r, var) in residual.iter_mut().zip(&residual_vars) {
            *r = var.value();
        }
        Ok(())
    }
}
