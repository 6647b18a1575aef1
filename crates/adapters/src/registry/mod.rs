//! Model registry adapters.

mod mlflow;

pub use mlflow::{MlflowRegistry, MlflowRegistryConfig};
