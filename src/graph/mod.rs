pub mod builder;
pub mod propagation;
