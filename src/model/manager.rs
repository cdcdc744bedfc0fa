use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::ModelConfig;

use super::gae::{AnomalyModel, GcnEncoder};
use super::optimizer::{Adam, AdamConfig};

/// Builds fresh models keyed by node count. Every model it returns carries a new generation.
pub struct ModelFactory {
    embedding_dim: usize,
    hidden_dim: usize,
    latent_dim: usize,
    learning_rate: f32,
    rng: StdRng,
    next_generation: u64,
}

impl ModelFactory {
    pub fn new(config: &ModelConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            embedding_dim: config.embedding_dim,
            hidden_dim: config.hidden_dim,
            latent_dim: config.latent_dim,
            learning_rate: config.learning_rate,
            rng,
            next_generation: 1,
        }
    }

    pub fn build(&mut self, num_nodes: usize) -> AnomalyModel {
        let encoder = GcnEncoder::new(
            num_nodes,
            self.embedding_dim,
            self.hidden_dim,
            self.latent_dim,
            &mut self.rng,
        );
        let optimizer = Adam::new(AdamConfig::with_learning_rate(self.learning_rate));
        let generation = self.next_generation;
        self.next_generation += 1;
        AnomalyModel::new(encoder, optimizer, generation)
    }
}

/// Observable lifecycle state of the managed model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Uninitialized,
    Ready { num_nodes: usize, generation: u64 },
}

/// Owns the model across batches and decides between warm start and rebuild.
///
/// The per-node embedding table is indexed by node id, and ids are reassigned every batch,
/// so a model is only reused while the node count stays the same.
pub struct ModelManager {
    factory: ModelFactory,
    model: Option<AnomalyModel>,
    reinit_count: u64,
}

impl ModelManager {
    pub fn new(factory: ModelFactory) -> Self {
        Self {
            factory,
            model: None,
            reinit_count: 0,
        }
    }

    pub fn state(&self) -> ModelState {
        match &self.model {
            None => ModelState::Uninitialized,
            Some(model) => ModelState::Ready {
                num_nodes: model.num_nodes_at_init(),
                generation: model.generation(),
            },
        }
    }

    /// Times a ready model was replaced because the node count changed.
    pub fn reinit_count(&self) -> u64 {
        self.reinit_count
    }

    pub fn get_or_update_model(&mut self, num_nodes: usize) -> &mut AnomalyModel {
        match self.state() {
            ModelState::Ready { num_nodes: current, generation } if current == num_nodes => {
                tracing::debug!(nodes = num_nodes, generation, "Reusing model (warm start)");
            }
            ModelState::Ready { num_nodes: current, .. } => {
                tracing::info!(
                    from = current,
                    to = num_nodes,
                    "Node set changed, re-initializing model"
                );
                self.reinit_count += 1;
                self.model = None;
            }
            ModelState::Uninitialized => {
                tracing::info!(nodes = num_nodes, "Initializing model");
            }
        }

        let factory = &mut self.factory;
        self.model.get_or_insert_with(|| factory.build(num_nodes))
    }

    /// Drop the current model entirely; the next batch starts from scratch.
    pub fn discard(&mut self) {
        if self.model.take().is_some() {
            tracing::warn!("Discarded model state");
        }
    }
}
