use crate::assembly::{JacobianStrategy, LocalFields, LocalFieldsMut, QuadraturePoint, WeakForm};
use crate::dof::FieldLayout;
use crate::error::AssemblyError;
use galerkin_autodiff::TapeScalar;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Physical and time stepping parameters of the Boussinesq system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoussinesqParameters {
    pub prandtl: f64,
    pub rayleigh: f64,
    /// Scales the thermal diffusivity.
    pub alpha: f64,
    /// Scales the buoyancy force.
    pub beta: f64,
    /// Time step size.
    pub dt: f64,
}

impl Default for BoussinesqParameters {
    fn default() -> Self {
        Self {
            prandtl: 0.015,
            rayleigh: 3000.0,
            alpha: 1.0,
            beta: 1.0,
            dt: 0.2,
        }
    }
}

impl BoussinesqParameters {
    /// Thermal diffusivity `α / √(Ra Pr)`.
    pub fn diffusivity(&self) -> f64 {
        self.alpha / (self.rayleigh * self.prandtl).sqrt()
    }

    /// Kinematic viscosity `√(Pr / Ra)`.
    pub fn viscosity(&self) -> f64 {
        (self.prandtl / self.rayleigh).sqrt()
    }
}

/// Incompressible Navier-Stokes flow coupled to heat transport through a buoyancy force.
///
/// The unknowns are the temperature `T`, the velocity components `U`, `V` (and `W` in 3D) and the
/// pressure `P`, looked up by name in the field layout. The second velocity component is the
/// vertical one, along which buoyancy acts. Time is discretized with the trapezoidal rule: the
/// fluxes of the current and the previous step are averaged.
///
/// The residual is only available in generic form, so the Jacobian always comes from the tape.
#[derive(Debug, Clone, PartialEq)]
pub struct BoussinesqKernel {
    parameters: BoussinesqParameters,
    temperature: usize,
    velocity: Vec<usize>,
    pressure: usize,
}

impl BoussinesqKernel {
    pub fn from_layout(layout: &FieldLayout, parameters: BoussinesqParameters) -> Result<Self, AssemblyError> {
        let temperature = layout.field_index("T")?;
        let mut velocity = vec![layout.field_index("U")?, layout.field_index("V")?];
        if layout.fields().iter().any(|field| field.name == "W") {
            velocity.push(layout.field_index("W")?);
        }
        let pressure = layout.field_index("P")?;
        Ok(Self {
            parameters,
            temperature,
            velocity,
            pressure,
        })
    }

    pub fn parameters(&self) -> &BoussinesqParameters {
        &self.parameters
    }

    /// Number of velocity components.
    pub fn dimension(&self) -> usize {
        self.velocity.len()
    }

    /// Field indices of temperature, velocity components and pressure.
    pub fn fields(&self) -> (usize, &[usize], usize) {
        (self.temperature, &self.velocity, self.pressure)
    }

    /// `κ ∇T·∇φ_i + (v·∇T) φ_i`
    fn heat_flux<S: TapeScalar>(&self, state: &FlowState<S>, phi: f64, gradients: &DMatrix<f64>, i: usize) -> S {
        let kappa = self.parameters.diffusivity();
        let mut diffusion = S::zero();
        let mut advection = S::zero();
        for j in 0..self.dimension() {
            diffusion += state.temperature_gradient[j] * gradients[(j, i)];
            advection += state.velocity[j] * state.temperature_gradient[j];
        }
        diffusion * kappa + advection * phi
    }

    /// `ν Σ_j (∂_j v_k + ∂_k v_j) ∂_jφ_i + (v·∇v_k) φ_i - p ∂_kφ_i - δ_k1 β T φ_i`
    fn momentum_flux<S: TapeScalar>(
        &self,
        k: usize,
        state: &FlowState<S>,
        phi: f64,
        gradients: &DMatrix<f64>,
        i: usize,
    ) -> S {
        let nu = self.parameters.viscosity();
        let grad_v = &state.velocity_gradient;
        let mut viscous = S::zero();
        let mut advection = S::zero();
        for j in 0..self.dimension() {
            viscous += (grad_v[k][j] + grad_v[j][k]) * gradients[(j, i)];
            advection += state.velocity[j] * grad_v[k][j];
        }
        let mut flux = viscous * nu + advection * phi - state.pressure * gradients[(k, i)];
        if k == 1 {
            flux -= state.temperature * (self.parameters.beta * phi);
        }
        flux
    }
}

/// Interpolated unknowns at a quadrature point. Entries beyond the dimension are zero.
#[derive(Debug, Clone, Copy)]
struct FlowState<S> {
    temperature: S,
    temperature_gradient: [S; 3],
    velocity: [S; 3],
    /// `velocity_gradient[k][j]` is `∂_j v_k`.
    velocity_gradient: [[S; 3]; 3],
    pressure: S,
}

impl<S: TapeScalar> FlowState<S> {
    fn interpolate(kernel: &BoussinesqKernel, point: &QuadraturePoint, fields: &LocalFields<S>) -> Self {
        let t_shape = point.shape(kernel.temperature);
        let mut velocity = [S::zero(); 3];
        let mut velocity_gradient = [[S::zero(); 3]; 3];
        for (k, &field) in kernel.velocity.iter().enumerate() {
            let shape = point.shape(field);
            velocity[k] = fields.interpolate(field, shape);
            velocity_gradient[k] = fields.interpolate_gradient(field, shape);
        }
        Self {
            temperature: fields.interpolate(kernel.temperature, t_shape),
            temperature_gradient: fields.interpolate_gradient(kernel.temperature, t_shape),
            velocity,
            velocity_gradient,
            pressure: fields.interpolate(kernel.pressure, point.shape(kernel.pressure)),
        }
    }

    fn divergence(&self, dimension: usize) -> S {
        let mut div = S::zero();
        for k in 0..dimension {
            div += self.velocity_gradient[k][k];
        }
        div
    }
}

impl WeakForm for BoussinesqKernel {
    fn jacobian_strategy(&self) -> JacobianStrategy {
        JacobianStrategy::Automatic
    }

    fn check_layout(&self, layout: &FieldLayout) -> Result<(), AssemblyError> {
        layout.check_field_index(self.temperature)?;
        for &component in &self.velocity {
            layout.check_field_index(component)?;
        }
        layout.check_field_index(self.pressure)
    }

    fn accumulate_residual<T: TapeScalar>(
        &self,
        point: &QuadraturePoint,
        current: &LocalFields<T>,
        previous: &LocalFields<f64>,
        residual: &mut LocalFieldsMut<T>,
    ) {
        let w = point.weight();
        let dt = self.parameters.dt;
        let now = FlowState::interpolate(self, point, current);
        let old = FlowState::interpolate(self, point, previous);

        let t_shape = point.shape(self.temperature);
        let r_t = residual.field_mut(self.temperature);
        for (i, r_i) in r_t.iter_mut().enumerate() {
            let phi = t_shape.values[i];
            let flux = self.heat_flux(&now, phi, &t_shape.gradients, i);
            let flux_old = self.heat_flux(&old, phi, &t_shape.gradients, i);
            let rate = (now.temperature - old.temperature) * (phi / dt);
            *r_i -= (rate + (flux + flux_old) * 0.5) * w;
        }

        for (k, &field) in self.velocity.iter().enumerate() {
            let v_shape = point.shape(field);
            let r_v = residual.field_mut(field);
            for (i, r_i) in r_v.iter_mut().enumerate() {
                let phi = v_shape.values[i];
                let flux = self.momentum_flux(k, &now, phi, &v_shape.gradients, i);
                let flux_old = self.momentum_flux(k, &old, phi, &v_shape.gradients, i);
                let rate = (now.velocity[k] - old.velocity[k]) * (phi / dt);
                *r_i -= (rate + (flux + flux_old) * 0.5) * w;
            }
        }

        let p_shape = point.shape(self.pressure);
        let div = now.divergence(self.dimension());
        let r_p = residual.field_mut(self.pressure);
        for (r_i, &psi) in r_p.iter_mut().zip(p_shape.values.iter()) {
            *r_i -= div * (psi * w);
        }
    }
}
