//! Shared gRPC plumbing: listener settings, the standard health service,
//! correlation metadata, channel dialing, and `Status` to HTTP mapping.

pub mod error;
pub mod health;
pub mod interceptors;
pub mod retry;
pub mod server;

pub use health::{HealthComponents, HealthReporter, create_health_service};
pub use interceptors::{
    REQUEST_ID_KEY, extract_request_id, extract_traceparent, inject_trace_context,
    inject_trace_context_with_request_id, trace_context_interceptor,
};
pub use retry::{DialError, RetryConfig, connect_with_retry, retry_with_backoff};
pub use server::{GrpcServerBuilder, create_reflection_service};
