//! Graph autoencoder: a replaceable node encoder paired with an inner-product decoder.

use ndarray::{Array2, ArrayView1};
use rand::Rng;

use crate::graph::propagation::Propagation;

use super::layers::{normal_matrix, GcnLayer};
use super::optimizer::Adam;

/// Maps node identity plus graph structure to latent node vectors.
///
/// Implementations own their trainable parameters. `backward` must return one gradient
/// per matrix of `parameters_mut`, in the same order.
pub trait GraphEncoder {
    /// Intermediate activations kept from `encode` for the backward pass.
    type Cache;

    fn num_nodes(&self) -> usize;

    fn latent_dim(&self) -> usize;

    /// Returns the `num_nodes × latent_dim` latent matrix.
    fn encode(&self, prop: &Propagation) -> (Array2<f32>, Self::Cache);

    fn backward(&self, prop: &Propagation, cache: &Self::Cache, grad_latent: &Array2<f32>) -> Vec<Array2<f32>>;

    fn parameters_mut(&mut self) -> Vec<&mut Array2<f32>>;
}

/// Learnable per-node embedding table feeding two graph-convolution layers
/// (`embedding_dim → hidden_dim → latent_dim`, ReLU in between).
#[derive(Debug, Clone)]
pub struct GcnEncoder {
    embedding: Array2<f32>,
    conv1: GcnLayer,
    conv2: GcnLayer,
}

#[derive(Debug)]
pub struct GcnCache {
    pre_activation: Array2<f32>,
    hidden: Array2<f32>,
}

impl GcnEncoder {
    pub fn new<R: Rng + ?Sized>(
        num_nodes: usize,
        embedding_dim: usize,
        hidden_dim: usize,
        latent_dim: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            embedding: normal_matrix(num_nodes, embedding_dim, 1.0, rng),
            conv1: GcnLayer::new(embedding_dim, hidden_dim, rng),
            conv2: GcnLayer::new(hidden_dim, latent_dim, rng),
        }
    }

    pub fn embedding(&self) -> &Array2<f32> {
        &self.embedding
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding.ncols()
    }

    pub fn hidden_dim(&self) -> usize {
        self.conv1.output_dim()
    }
}

impl GraphEncoder for GcnEncoder {
    type Cache = GcnCache;

    fn num_nodes(&self) -> usize {
        self.embedding.nrows()
    }

    fn latent_dim(&self) -> usize {
        self.conv2.output_dim()
    }

    fn encode(&self, prop: &Propagation) -> (Array2<f32>, GcnCache) {
        // Node features are the node ids themselves, so the lookup is the whole table.
        let pre_activation = self.conv1.forward(prop, &self.embedding);
        let hidden = pre_activation.mapv(|v| v.max(0.0));
        let latent = self.conv2.forward(prop, &hidden);
        (latent, GcnCache { pre_activation, hidden })
    }

    fn backward(&self, prop: &Propagation, cache: &GcnCache, grad_latent: &Array2<f32>) -> Vec<Array2<f32>> {
        let (grad_hidden, grad_w2, grad_b2) = self.conv2.backward(prop, &cache.hidden, grad_latent);

        let mut grad_pre = grad_hidden;
        grad_pre.zip_mut_with(&cache.pre_activation, |g, &z| {
            if z <= 0.0 {
                *g = 0.0;
            }
        });

        let (grad_embedding, grad_w1, grad_b1) = self.conv1.backward(prop, &self.embedding, &grad_pre);
        vec![grad_embedding, grad_w1, grad_b1, grad_w2, grad_b2]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Array2<f32>> {
        vec![
            &mut self.embedding,
            &mut self.conv1.weight,
            &mut self.conv1.bias,
            &mut self.conv2.weight,
            &mut self.conv2.bias,
        ]
    }
}

/// Scores a node pair by the inner product of their latent vectors.
///
/// Scores live in `log1p` space: the reconstructed weight is `expm1(max(score, 0))`,
/// which keeps large transfer amounts from dominating training.
#[derive(Debug, Clone, Copy, Default)]
pub struct InnerProductDecoder;

impl InnerProductDecoder {
    pub fn score(&self, latent: &Array2<f32>, src: usize, dst: usize) -> f32 {
        latent.row(src).dot(&latent.row(dst))
    }

    pub fn target(&self, weight: f64) -> f32 {
        weight.ln_1p() as f32
    }

    pub fn reconstruct(&self, score: f32) -> f64 {
        (score.max(0.0) as f64).exp_m1()
    }

    /// Accumulate `d(score)/d(latent) * upstream` into `grad`.
    pub fn backward(&self, latent: &Array2<f32>, src: usize, dst: usize, upstream: f32, grad: &mut Array2<f32>) {
        let src_row: ArrayView1<f32> = latent.row(src);
        let dst_row: ArrayView1<f32> = latent.row(dst);
        let src_contrib = dst_row.mapv(|v| v * upstream);
        let dst_contrib = src_row.mapv(|v| v * upstream);
        {
            let mut g = grad.row_mut(src);
            g += &src_contrib;
        }
        let mut g = grad.row_mut(dst);
        g += &dst_contrib;
    }
}

/// Model state held across batches: encoder, decoder and optimizer, sized for one node count.
#[derive(Debug, Clone)]
pub struct AnomalyModel<E = GcnEncoder> {
    pub(crate) num_nodes_at_init: usize,
    pub(crate) generation: u64,
    pub(crate) encoder: E,
    pub(crate) decoder: InnerProductDecoder,
    pub(crate) optimizer: Adam,
}

impl<E: GraphEncoder> AnomalyModel<E> {
    pub fn new(encoder: E, optimizer: Adam, generation: u64) -> Self {
        Self {
            num_nodes_at_init: encoder.num_nodes(),
            generation,
            encoder,
            decoder: InnerProductDecoder,
            optimizer,
        }
    }

    pub fn num_nodes_at_init(&self) -> usize {
        self.num_nodes_at_init
    }

    /// Identity assigned at construction; unchanged across warm starts.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn optimizer_steps(&self) -> u32 {
        self.optimizer.steps()
    }
}
