pub mod anomaly;
pub mod config;
pub mod graph;
pub mod indexer;
pub mod model;
pub mod pipeline;
pub mod tokens;
