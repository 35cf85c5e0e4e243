pub mod config;
pub mod gateway;
pub mod grpc;
pub mod server;

pub use server::{Server, ServerError, ShutdownReport};
