use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Which of the two listeners an error or outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Rpc,
    Gateway,
}

impl std::fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerKind::Rpc => f.write_str("gRPC"),
            ListenerKind::Gateway => f.write_str("HTTP gateway"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{listener} failed to listen on {addr}: {source}")]
    Bind {
        listener: ListenerKind,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to dial gRPC server at {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: service_core::grpc::DialError,
    },

    #[error("invalid gRPC endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("{listener} serve error: {source}")]
    Serve {
        listener: ListenerKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("graceful shutdown exceeded {timeout:?}; remaining connections were closed")]
    ShutdownTimeout { timeout: Duration },

    #[error("{listener} task failed: {source}")]
    Join {
        listener: ListenerKind,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ServerError {
    pub fn is_bind(&self) -> bool {
        matches!(self, ServerError::Bind { .. })
    }

    pub fn is_dial(&self) -> bool {
        matches!(self, ServerError::Dial { .. })
    }

    pub fn is_shutdown_timeout(&self) -> bool {
        matches!(self, ServerError::ShutdownTimeout { .. })
    }
}
