pub mod tracing;

pub use tracing::{TracingConfig, setup_tracing};
