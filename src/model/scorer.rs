use crate::anomaly::types::{AnomalyReport, EdgeScore};
use crate::graph::builder::{NodeIndex, TransactionGraph};
use crate::graph::propagation::Propagation;

use super::error::ModelError;
use super::gae::{AnomalyModel, GraphEncoder};

/// Score every edge of `graph` with the trained model. Inference only: parameters and
/// optimizer state are untouched.
pub fn score<E: GraphEncoder>(
    model: &AnomalyModel<E>,
    graph: &TransactionGraph,
    index: &NodeIndex,
    threshold: f64,
    window: u64,
) -> Result<AnomalyReport, ModelError> {
    if model.num_nodes_at_init != graph.num_nodes() {
        return Err(ModelError::NodeCountMismatch {
            expected: model.num_nodes_at_init,
            actual: graph.num_nodes(),
        });
    }

    let prop = Propagation::from_graph(graph);
    let (latent, _) = model.encoder.encode(&prop);
    let decoder = &model.decoder;

    let mut entries = Vec::with_capacity(graph.num_edges());
    for edge in graph.edges() {
        let original = edge.weight_f64();
        let reconstructed = decoder.reconstruct(decoder.score(&latent, edge.src, edge.dst));
        let error = (reconstructed - original).abs();
        if !error.is_finite() {
            return Err(ModelError::NonFiniteScore {
                src: edge.src,
                dst: edge.dst,
            });
        }

        entries.push(EdgeScore {
            src_address: address(index, edge.src),
            dst_address: address(index, edge.dst),
            original_weight: original,
            reconstructed_score: reconstructed,
            absolute_error: error,
        });
    }

    Ok(AnomalyReport::new(window, graph.num_nodes(), threshold, entries))
}

fn address(index: &NodeIndex, id: usize) -> String {
    index
        .address_of(id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", id))
}
