use std::collections::HashSet;

use ndarray::Array2;
use rand::Rng;

use crate::graph::builder::TransactionGraph;
use crate::graph::propagation::Propagation;

use super::error::ModelError;
use super::gae::{AnomalyModel, GraphEncoder, InnerProductDecoder};

/// Loss trajectory of one training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub initial_loss: f32,
    pub final_loss: f32,
}

/// Train `model` on `graph` for exactly `epochs` Adam steps. No early stopping.
///
/// Objective, in `log1p` weight space:
/// `mean_edges (s_ij - ln(1 + w_ij))^2 + mean_negatives (s_ij)^2`,
/// with one uniformly sampled non-edge per real edge, redrawn every epoch.
///
/// On error the parameters may be partially updated; callers must discard the model.
pub fn train<E, R>(
    model: &mut AnomalyModel<E>,
    graph: &TransactionGraph,
    epochs: usize,
    rng: &mut R,
) -> Result<TrainingSummary, ModelError>
where
    E: GraphEncoder,
    R: Rng + ?Sized,
{
    if model.num_nodes_at_init != graph.num_nodes() {
        return Err(ModelError::NodeCountMismatch {
            expected: model.num_nodes_at_init,
            actual: graph.num_nodes(),
        });
    }

    let prop = Propagation::from_graph(graph);
    let decoder = model.decoder;
    let positives: Vec<(usize, usize, f32)> = graph
        .edges()
        .iter()
        .map(|e| (e.src, e.dst, decoder.target(e.weight_f64())))
        .collect();
    let edge_set: HashSet<(usize, usize)> = graph.edges().iter().map(|e| (e.src, e.dst)).collect();

    let mut summary = TrainingSummary {
        epochs,
        initial_loss: f32::NAN,
        final_loss: f32::NAN,
    };

    for epoch in 0..epochs {
        let (latent, cache) = model.encoder.encode(&prop);
        let negatives = sample_negative_pairs(graph.num_nodes(), &edge_set, positives.len(), rng);

        let (loss, grad_latent) = reconstruction_loss(&decoder, &latent, &positives, &negatives);
        if !loss.is_finite() {
            return Err(ModelError::NonFiniteLoss { epoch, loss });
        }

        let grads = model.encoder.backward(&prop, &cache, &grad_latent);
        model.optimizer.step(model.encoder.parameters_mut(), &grads)?;

        if epoch == 0 {
            summary.initial_loss = loss;
        }
        summary.final_loss = loss;

        if epoch % 10 == 0 {
            tracing::debug!(epoch, loss, "Training step");
        }
    }

    Ok(summary)
}

/// Loss value and its gradient with respect to the latent matrix.
fn reconstruction_loss(
    decoder: &InnerProductDecoder,
    latent: &Array2<f32>,
    positives: &[(usize, usize, f32)],
    negatives: &[(usize, usize)],
) -> (f32, Array2<f32>) {
    let mut grad = Array2::zeros(latent.raw_dim());
    let mut loss = 0.0f32;

    if !positives.is_empty() {
        let scale = 1.0 / positives.len() as f32;
        for &(src, dst, target) in positives {
            let diff = decoder.score(latent, src, dst) - target;
            loss += diff * diff * scale;
            decoder.backward(latent, src, dst, 2.0 * diff * scale, &mut grad);
        }
    }

    if !negatives.is_empty() {
        let scale = 1.0 / negatives.len() as f32;
        for &(src, dst) in negatives {
            let score = decoder.score(latent, src, dst);
            loss += score * score * scale;
            decoder.backward(latent, src, dst, 2.0 * score * scale, &mut grad);
        }
    }

    (loss, grad)
}

/// Draw up to `count` ordered pairs that are neither edges nor self-loops.
///
/// Rejection sampling with a bounded number of attempts; returns fewer pairs (possibly
/// none) when the graph is dense.
pub fn sample_negative_pairs<R: Rng + ?Sized>(
    num_nodes: usize,
    edges: &HashSet<(usize, usize)>,
    count: usize,
    rng: &mut R,
) -> Vec<(usize, usize)> {
    let non_loop_edges = edges.iter().filter(|(s, d)| s != d).count();
    let candidates = (num_nodes * num_nodes.saturating_sub(1)).saturating_sub(non_loop_edges);
    if candidates == 0 || count == 0 {
        return Vec::new();
    }

    let mut pairs = Vec::with_capacity(count);
    let max_attempts = count * 20;
    for _ in 0..max_attempts {
        if pairs.len() == count {
            break;
        }
        let src = rng.gen_range(0..num_nodes);
        let dst = rng.gen_range(0..num_nodes);
        if src != dst && !edges.contains(&(src, dst)) {
            pairs.push((src, dst));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::graph::builder::build_graph;
    use crate::indexer::types::TransferEvent;
    use crate::model::manager::ModelFactory;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn factory() -> ModelFactory {
        ModelFactory::new(&ModelConfig {
            seed: Some(5),
            ..ModelConfig::default()
        })
    }

    fn ring_graph() -> TransactionGraph {
        let batch = vec![
            TransferEvent::new("0xA", "0xB", 1_000_000),
            TransferEvent::new("0xB", "0xC", 2_000_000),
            TransferEvent::new("0xC", "0xD", 500_000),
            TransferEvent::new("0xD", "0xA", 4_000_000),
        ];
        build_graph(&batch, 6).unwrap().0
    }

    #[test]
    fn test_training_reduces_loss() {
        let graph = ring_graph();
        let mut model = factory().build(graph.num_nodes());
        let mut rng = StdRng::seed_from_u64(9);

        let summary = train(&mut model, &graph, 200, &mut rng).unwrap();
        assert_eq!(summary.epochs, 200);
        assert!(summary.initial_loss.is_finite());
        assert!(
            summary.final_loss < summary.initial_loss,
            "loss went from {} to {}",
            summary.initial_loss,
            summary.final_loss
        );
        assert_eq!(model.optimizer_steps(), 200);
    }

    #[test]
    fn test_warm_start_continues_optimizer() {
        let graph = ring_graph();
        let mut model = factory().build(graph.num_nodes());
        let mut rng = StdRng::seed_from_u64(1);

        train(&mut model, &graph, 10, &mut rng).unwrap();
        train(&mut model, &graph, 10, &mut rng).unwrap();
        assert_eq!(model.optimizer_steps(), 20);
        assert_eq!(model.generation(), 1);
    }

    #[test]
    fn test_degenerate_graphs_train() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut factory = factory();

        let (pair, _) = build_graph(&[TransferEvent::new("0xA", "0xB", 1_000_000)], 6).unwrap();
        let mut model = factory.build(pair.num_nodes());
        assert!(train(&mut model, &pair, 5, &mut rng).is_ok());

        let (self_loop, _) = build_graph(&[TransferEvent::new("0xA", "0xA", 7)], 6).unwrap();
        let mut model = factory.build(self_loop.num_nodes());
        assert!(train(&mut model, &self_loop, 5, &mut rng).is_ok());
    }

    #[test]
    fn test_node_count_mismatch() {
        let graph = ring_graph();
        let mut model = factory().build(2);
        let mut rng = StdRng::seed_from_u64(3);
        let err = train(&mut model, &graph, 1, &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::NodeCountMismatch { expected: 2, actual: 4 }));
    }

    #[test]
    fn test_non_finite_loss_is_reported() {
        let (graph, _) = build_graph(&[TransferEvent::new("0xA", "0xB", 1)], 6).unwrap();
        let mut model = factory().build(graph.num_nodes());
        model.encoder.parameters_mut()[0].fill(f32::NAN);

        let mut rng = StdRng::seed_from_u64(4);
        let err = train(&mut model, &graph, 3, &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::NonFiniteLoss { epoch: 0, .. }));
    }

    #[test]
    fn test_negative_sampling_excludes_edges_and_loops() {
        let edges: HashSet<(usize, usize)> = [(0, 1), (1, 2)].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(8);
        let pairs = sample_negative_pairs(3, &edges, 50, &mut rng);
        assert_eq!(pairs.len(), 50);
        for (s, d) in pairs {
            assert_ne!(s, d);
            assert!(!edges.contains(&(s, d)));
        }

        // Two nodes fully connected in both directions: nothing to sample
        let full: HashSet<(usize, usize)> = [(0, 1), (1, 0)].into_iter().collect();
        assert!(sample_negative_pairs(2, &full, 5, &mut rng).is_empty());
        assert!(sample_negative_pairs(1, &HashSet::new(), 5, &mut rng).is_empty());
    }
}
