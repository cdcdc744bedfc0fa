/// Numeric or structural failure while training or scoring a batch.
/// Any of these skips the batch's report and discards the model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("non-finite loss {loss} at epoch {epoch}")]
    NonFiniteLoss { epoch: usize, loss: f32 },

    #[error("non-finite reconstruction for edge {src} -> {dst}")]
    NonFiniteScore { src: usize, dst: usize },

    #[error("model sized for {expected} nodes cannot encode a graph with {actual} nodes")]
    NodeCountMismatch { expected: usize, actual: usize },

    #[error("parameter/gradient shape mismatch: {0}")]
    ShapeMismatch(String),
}
