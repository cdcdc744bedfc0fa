use ndarray::Array2;

use super::builder::TransactionGraph;

/// Sparse, symmetric-normalized message-passing operator `D^-1/2 (A + I) D^-1/2`.
///
/// Messages flow along edge direction (src → dst); every node gets a self-loop and the
/// degree is counted on the receiving side. Parallel entries cannot occur because the
/// graph builder already merged duplicate pairs.
#[derive(Debug, Clone)]
pub struct Propagation {
    num_nodes: usize,
    /// `(target, source, coefficient)`
    entries: Vec<(usize, usize, f32)>,
}

impl Propagation {
    pub fn from_graph(graph: &TransactionGraph) -> Self {
        let n = graph.num_nodes();

        let mut links: Vec<(usize, usize)> = graph
            .edges()
            .iter()
            .filter(|e| e.src != e.dst)
            .map(|e| (e.dst, e.src))
            .collect();
        links.extend((0..n).map(|i| (i, i)));

        let mut degree = vec![0f32; n];
        for &(target, _) in &links {
            degree[target] += 1.0;
        }

        let entries = links
            .into_iter()
            .map(|(target, source)| {
                let coeff = 1.0 / (degree[target].sqrt() * degree[source].sqrt());
                (target, source, coeff)
            })
            .collect();

        Self { num_nodes: n, entries }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// `out[target] += coeff * x[source]`
    pub fn apply(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut out = Array2::zeros(x.raw_dim());
        for &(target, source, coeff) in &self.entries {
            let row = x.row(source).mapv(|v| v * coeff);
            let mut dst = out.row_mut(target);
            dst += &row;
        }
        out
    }

    /// Adjoint of [`apply`](Self::apply), used to route gradients back to sources.
    pub fn apply_transpose(&self, grad: &Array2<f32>) -> Array2<f32> {
        let mut out = Array2::zeros(grad.raw_dim());
        for &(target, source, coeff) in &self.entries {
            let row = grad.row(target).mapv(|v| v * coeff);
            let mut dst = out.row_mut(source);
            dst += &row;
        }
        out
    }
}
