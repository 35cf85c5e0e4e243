//! Test helpers for auth-service integration tests.
//!
//! Each [`TestApp`] runs a full [`Server`] on its own pair of loopback ports.

#![allow(dead_code)]

use auth_service::{
    config::ServerConfig,
    grpc::{
        proto::auth::{auth_service_client::AuthServiceClient, HealthRequest, HealthResponse},
        AuthService, AuthServiceImpl,
    },
    Server, ShutdownReport,
};
use service_core::shutdown::{ShutdownReason, ShutdownSignal};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

pub const DOCS_BODY: &str = r#"{"swagger":"2.0","info":{"title":"auth_api.proto"}}"#;

pub const EXPECTED_HEALTH_JSON: &str =
    r#"{"status":"OK","message":"Auth service is running and healthy"}"#;

/// Reserve a free port by binding to port 0 and releasing it.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind ephemeral port")
        .local_addr()
        .unwrap()
        .port()
}

/// Poll until something accepts TCP connections on `port`.
pub async fn wait_for_port(port: u16) -> bool {
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

pub async fn port_is_closed(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_err()
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        grpc_port: free_port(),
        http_port: free_port(),
        ..Default::default()
    }
}

/// Handler that sleeps before answering, to hold a request in flight.
#[derive(Debug, Clone, Copy)]
pub struct SlowAuthService {
    pub delay: Duration,
}

#[tonic::async_trait]
impl AuthService for SlowAuthService {
    async fn health(
        &self,
        request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        tokio::time::sleep(self.delay).await;
        AuthServiceImpl.health(request).await
    }
}

pub struct TestApp {
    pub grpc_port: u16,
    pub http_port: u16,
    pub shutdown: ShutdownSignal,
    handle: JoinHandle<ShutdownReport>,
    _docs: NamedTempFile,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(AuthServiceImpl::new(), |_| {}).await
    }

    /// Start a server with `handler`; `configure` may adjust the config.
    /// Waits until both ports accept connections.
    pub async fn spawn_with<H: AuthService>(
        handler: H,
        configure: impl FnOnce(&mut ServerConfig),
    ) -> Self {
        let app = Self::spawn_unchecked(handler, configure);
        assert!(wait_for_port(app.grpc_port).await, "gRPC port never opened");
        assert!(wait_for_port(app.http_port).await, "HTTP port never opened");
        app
    }

    /// Start a server without waiting for it to come up.
    pub fn spawn_unchecked<H: AuthService>(
        handler: H,
        configure: impl FnOnce(&mut ServerConfig),
    ) -> Self {
        let mut docs = NamedTempFile::new().expect("Failed to create docs file");
        docs.write_all(DOCS_BODY.as_bytes()).unwrap();

        let mut config = ServerConfig {
            docs_path: docs.path().to_path_buf(),
            ..test_config()
        };
        configure(&mut config);

        let grpc_port = config.grpc_port;
        let http_port = config.http_port;

        let server = Server::new(config, handler);
        let shutdown = server.shutdown_signal();
        let handle = tokio::spawn(server.run_until(std::future::pending()));

        TestApp {
            grpc_port,
            http_port,
            shutdown,
            handle,
            _docs: docs,
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.http_port, path)
    }

    pub async fn grpc_client(&self) -> AuthServiceClient<Channel> {
        AuthServiceClient::connect(format!("http://127.0.0.1:{}", self.grpc_port))
            .await
            .expect("Failed to connect to gRPC server")
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Trigger shutdown and wait for the report.
    pub async fn stop(self) -> ShutdownReport {
        self.shutdown.trigger(ShutdownReason::Requested);
        self.join().await
    }

    /// Wait for the server to stop on its own.
    pub async fn join(self) -> ShutdownReport {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("Server did not stop in time")
            .expect("Server task panicked")
    }
}
