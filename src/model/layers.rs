//! Graph convolution layer with a hand-written backward pass.

use ndarray::{Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::graph::propagation::Propagation;

/// Sample a `rows × cols` matrix from `N(0, std)`.
pub fn normal_matrix<R: Rng + ?Sized>(rows: usize, cols: usize, std: f32, rng: &mut R) -> Array2<f32> {
    match Normal::new(0.0f32, std) {
        Ok(normal) => Array2::from_shape_fn((rows, cols), |_| normal.sample(rng)),
        // std is only invalid if non-finite; fall back to zeros rather than panic
        Err(_) => Array2::zeros((rows, cols)),
    }
}

/// `Y = P (X W) + b`, where `P` is the normalized propagation operator.
#[derive(Debug, Clone)]
pub struct GcnLayer {
    pub(crate) weight: Array2<f32>,
    /// Stored as `1 × out` so the optimizer treats every parameter as a matrix.
    pub(crate) bias: Array2<f32>,
}

impl GcnLayer {
    /// Xavier/Glorot normal initialization, zero bias.
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        let scale = (2.0 / (input_dim + output_dim) as f32).sqrt();
        Self {
            weight: normal_matrix(input_dim, output_dim, scale, rng),
            bias: Array2::zeros((1, output_dim)),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn forward(&self, prop: &Propagation, input: &Array2<f32>) -> Array2<f32> {
        let transformed = input.dot(&self.weight);
        prop.apply(&transformed) + &self.bias.row(0)
    }

    /// Returns `(grad_input, grad_weight, grad_bias)` for upstream gradient `grad_out`.
    pub fn backward(
        &self,
        prop: &Propagation,
        input: &Array2<f32>,
        grad_out: &Array2<f32>,
    ) -> (Array2<f32>, Array2<f32>, Array2<f32>) {
        let grad_bias = grad_out.sum_axis(Axis(0)).insert_axis(Axis(0));
        let grad_transformed = prop.apply_transpose(grad_out);
        let grad_weight = input.t().dot(&grad_transformed);
        let grad_input = grad_transformed.dot(&self.weight.t());
        (grad_input, grad_weight, grad_bias)
    }
}
