//! service-core: shared infrastructure for micros services.
pub mod config;
pub mod error;
pub mod grpc;
pub mod middleware;
pub mod observability;
pub mod shutdown;

pub use axum;
pub use tokio;
pub use tonic;
pub use tracing;
