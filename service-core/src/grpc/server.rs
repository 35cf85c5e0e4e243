//! Transport settings and standard add-on services for RPC listeners.

use std::time::Duration;

use tonic::transport::Server;
use tonic_reflection::server::{Builder as ReflectionBuilder, Error as ReflectionError};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one gRPC listener. Reflection is on by default; the standard
/// health service is always served since peers use it as a readiness check.
#[derive(Debug, Clone)]
pub struct GrpcServerBuilder {
    service_name: String,
    reflection: bool,
}

impl GrpcServerBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            reflection: true,
        }
    }

    pub fn with_reflection(mut self, enable: bool) -> Self {
        self.reflection = enable;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn reflection_enabled(&self) -> bool {
        self.reflection
    }

    /// tonic server with HTTP/2 keepalive pings and `TCP_NODELAY`.
    pub fn build_server(&self) -> Server {
        Server::builder()
            .tcp_nodelay(true)
            .http2_keepalive_interval(Some(KEEPALIVE_INTERVAL))
            .http2_keepalive_timeout(Some(KEEPALIVE_TIMEOUT))
    }
}

/// Reflection service over the given encoded file descriptor sets.
pub fn create_reflection_service(
    file_descriptor_sets: &[&[u8]],
) -> Result<
    tonic_reflection::server::ServerReflectionServer<
        impl tonic_reflection::server::ServerReflection,
    >,
    ReflectionError,
> {
    file_descriptor_sets
        .iter()
        .fold(ReflectionBuilder::configure(), |builder, fds| {
            builder.register_encoded_file_descriptor_set(fds)
        })
        .build_v1()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflection_defaults_on() {
        let builder = GrpcServerBuilder::new("test-service");
        assert_eq!(builder.service_name(), "test-service");
        assert!(builder.reflection_enabled());
        assert!(!builder.with_reflection(false).reflection_enabled());
    }
}
