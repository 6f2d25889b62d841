use crate::assembly::{JacobianStrategy, LocalFields, LocalFieldsMut, LocalJacobian, QuadraturePoint, WeakForm};
use crate::dof::FieldLayout;
use crate::error::AssemblyError;
use galerkin_autodiff::TapeScalar;
use std::fmt;
use std::fmt::{Debug, Formatter};

/// The Poisson problem `-Δu = f`.
///
/// Residual and Jacobian contributions at a point with scaled weight `w` are
///
/// ```text
/// R_i += w (f(x) φ_i - ∇u·∇φ_i)
/// K_ij += w ∇φ_i·∇φ_j
/// ```
///
/// The Jacobian is analytic by default. Selecting [`JacobianStrategy::Automatic`] differentiates
/// the same residual on the tape instead, which is mainly useful for cross-checking.
#[derive(Clone)]
pub struct PoissonKernel<F> {
    source: F,
    field: usize,
    strategy: JacobianStrategy,
}

impl<F> Debug for PoissonKernel<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoissonKernel")
            .field("field", &self.field)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl<F> PoissonKernel<F>
where
    F: Fn(&[f64]) -> f64,
{
    /// A kernel acting on the first field of the layout.
    pub fn new(source: F) -> Self {
        Self {
            source,
            field: 0,
            strategy: JacobianStrategy::Analytic,
        }
    }

    pub fn with_field(self, field: usize) -> Self {
        Self { field, ..self }
    }

    pub fn with_strategy(self, strategy: JacobianStrategy) -> Self {
        Self { strategy, ..self }
    }

    pub fn field(&self) -> usize {
        self.field
    }
}

impl<F> WeakForm for PoissonKernel<F>
where
    F: Fn(&[f64]) -> f64,
{
    fn jacobian_strategy(&self) -> JacobianStrategy {
        self.strategy
    }

    fn check_layout(&self, layout: &FieldLayout) -> Result<(), AssemblyError> {
        layout.check_field_index(self.field)
    }

    fn accumulate_residual<T: TapeScalar>(
        &self,
        point: &QuadraturePoint,
        current: &LocalFields<T>,
        _previous: &LocalFields<f64>,
        residual: &mut LocalFieldsMut<T>,
    ) {
        let shape = point.shape(self.field);
        let w = point.weight();
        let f = (self.source)(point.coordinates());
        let grad_u = current.interpolate_gradient(self.field, shape);

        let r = residual.field_mut(self.field);
        for (i, r_i) in r.iter_mut().enumerate() {
            let mut flux = T::zero();
            for (d, g) in grad_u.iter().enumerate().take(shape.gradients.nrows()) {
                flux += *g * shape.gradients[(d, i)];
            }
            *r_i += w * f * shape.values[i];
            *r_i -= flux * w;
        }
    }

    fn accumulate_jacobian(
        &self,
        point: &QuadraturePoint,
        _current: &LocalFields<f64>,
        _previous: &LocalFields<f64>,
        jacobian: &mut LocalJacobian,
    ) -> Result<(), AssemblyError> {
        let gradients = &point.shape(self.field).gradients;
        let mut block = jacobian.block_mut(self.field, self.field);
        block.gemm_tr(point.weight(), gradients, gradients, 1.0);
        Ok(())
    }
}
