use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

/// A function `f: R^n -> R^m`.
pub trait VectorFunction {
    /// The output dimension `m`.
    fn dimension(&self) -> usize;
    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>);
}

impl<X: VectorFunction> VectorFunction for &mut X {
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        X::eval_into(self, f, x)
    }
}

#[derive(Debug, Clone)]
pub struct VectorFunctionBuilder {
    dimension: usize,
}

/// A [`VectorFunction`] defined by a closure.
#[derive(Debug, Clone)]
pub struct ConcreteVectorFunction<F> {
    dimension: usize,
    function: F,
}

impl VectorFunctionBuilder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn with_function<F>(self, function: F) -> ConcreteVectorFunction<F>
    where
        F: FnMut(&mut DVectorViewMut<f64>, &DVectorView<f64>),
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function,
        }
    }
}

impl<F> VectorFunction for ConcreteVectorFunction<F>
where
    F: FnMut(&mut DVectorViewMut<f64>, &DVectorView<f64>),
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        (self.function)(f, x)
    }
}

/// Approximates the Jacobian of a vector function evaluated at `x`, using
/// central finite differences with resolution `h`.
pub fn approximate_jacobian_fd(mut f: impl VectorFunction, x: &DVector<f64>, h: f64) -> DMatrix<f64> {
    let out_dim = f.dimension();
    let in_dim = x.len();

    let mut result = DMatrix::zeros(out_dim, in_dim);

    let mut x_perturbed = x.clone();
    let mut f_plus = DVector::zeros(out_dim);
    let mut f_minus = DVector::zeros(out_dim);

    for j in 0..in_dim {
        let x_j = x[j];
        x_perturbed[j] = x_j + h;
        f.eval_into(&mut f_plus.column_mut(0), &x_perturbed.column(0));
        x_perturbed[j] = x_j - h;
        f.eval_into(&mut f_minus.column_mut(0), &x_perturbed.column(0));
        x_perturbed[j] = x_j;

        // result[.., j] := (f+ - f-) / 2h
        let mut column_j = result.column_mut(j);
        column_j += &f_plus;
        column_j -= &f_minus;
        column_j /= 2.0 * h;
    }

    result
}

/// Approximates the gradient of the function `f: R^n -> R` with central finite differences.
pub fn approximate_gradient_fd(mut f: impl FnMut(DVectorView<f64>) -> f64, x: &DVector<f64>, h: f64) -> DVector<f64> {
    let mut x = x.clone();
    let mut df = DVector::zeros(x.len());
    for i in 0..x.len() {
        let x_i = x[i];
        x[i] = x_i + h;
        let f_plus = f(x.column(0));
        x[i] = x_i - h;
        let f_minus = f(x.column(0));
        x[i] = x_i;
        df[i] = (f_plus - f_minus) / (2.0 * h);
    }
    df
}
