//! Graph autoencoder lifecycle: construction, warm-start training and edge scoring.

pub mod error;
pub mod gae;
pub mod layers;
pub mod manager;
pub mod optimizer;
pub mod scorer;
pub mod trainer;
