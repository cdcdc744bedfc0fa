//! Adam optimizer over a fixed, ordered list of parameter matrices.

use ndarray::Array2;

use super::error::ModelError;

#[derive(Debug, Clone, Copy)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl AdamConfig {
    pub fn with_learning_rate(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// First and second moment buffers for one parameter matrix.
#[derive(Debug, Clone)]
struct Moments {
    m: Array2<f32>,
    v: Array2<f32>,
}

/// Adam state. Parameter slots are positional: the i-th gradient always updates the
/// i-th parameter, and buffers are allocated lazily on the first step.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    slots: Vec<Option<Moments>>,
    t: u32,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            t: 0,
        }
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> u32 {
        self.t
    }

    pub fn step(&mut self, params: Vec<&mut Array2<f32>>, grads: &[Array2<f32>]) -> Result<(), ModelError> {
        if params.len() != grads.len() {
            return Err(ModelError::ShapeMismatch(format!(
                "{} parameters but {} gradients",
                params.len(),
                grads.len()
            )));
        }
        for (i, (param, grad)) in params.iter().zip(grads).enumerate() {
            if param.shape() != grad.shape() {
                return Err(ModelError::ShapeMismatch(format!(
                    "slot {}: parameter {:?} vs gradient {:?}",
                    i,
                    param.shape(),
                    grad.shape()
                )));
            }
        }
        if self.slots.len() < params.len() {
            self.slots.resize(params.len(), None);
        }

        self.t += 1;
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        let bias_correction1 = 1.0 - beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.t as i32);

        for ((param, grad), slot) in params.into_iter().zip(grads).zip(self.slots.iter_mut()) {
            let moments = slot.get_or_insert_with(|| Moments {
                m: Array2::zeros(param.raw_dim()),
                v: Array2::zeros(param.raw_dim()),
            });

            // m_t = beta1 * m_{t-1} + (1 - beta1) * g_t
            moments.m.zip_mut_with(grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            // v_t = beta2 * v_{t-1} + (1 - beta2) * g_t^2
            moments.v.zip_mut_with(grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

            ndarray::Zip::from(param)
                .and(&moments.m)
                .and(&moments.v)
                .for_each(|p, &m, &v| {
                    let m_hat = m / bias_correction1;
                    let v_hat = v / bias_correction2;
                    *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_adam_minimizes_quadratic() {
        // f(x) = sum((x - 3)^2), grad = 2 (x - 3)
        let mut x = array![[0.0f32, 10.0], [-5.0, 3.0]];
        let mut adam = Adam::new(AdamConfig::with_learning_rate(0.1));

        for _ in 0..500 {
            let grad = x.mapv(|v| 2.0 * (v - 3.0));
            adam.step(vec![&mut x], &[grad]).unwrap();
        }

        assert_eq!(adam.steps(), 500);
        for v in x.iter() {
            assert!((v - 3.0).abs() < 0.1, "value {} did not converge", v);
        }
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut x = array![[1.0f32]];
        let mut adam = Adam::new(AdamConfig::with_learning_rate(0.01));
        adam.step(vec![&mut x], &[array![[4.0f32]]]).unwrap();
        // Bias-corrected first step is lr * sign(g)
        assert!((x[[0, 0]] - 0.99).abs() < 1e-5);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mut x = array![[1.0f32, 2.0]];
        let mut adam = Adam::new(AdamConfig::with_learning_rate(0.01));
        let err = adam.step(vec![&mut x], &[array![[1.0f32]]]).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch(_)));
        assert_eq!(adam.steps(), 0);

        let err = adam.step(vec![&mut x], &[]).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch(_)));
    }
}
