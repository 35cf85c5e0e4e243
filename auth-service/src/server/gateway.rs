//! HTTP gateway listener: dials the RPC listener, then serves the JSON routes
//! with a bounded graceful shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use service_core::grpc::{connect_with_retry, RetryConfig};
use service_core::shutdown::ShutdownSignal;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use super::error::{ListenerKind, ServerError};
use crate::config::{
    ServerConfig, DEFAULT_DOCS_PATH, DEFAULT_GATEWAY_DIAL_TIMEOUT, DEFAULT_GATEWAY_REQUEST_TIMEOUT,
};
use crate::gateway::{build_router, GatewayState};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub docs_path: PathBuf,
    pub dial_retry: RetryConfig,
    /// Bound on each dial attempt, TCP connect and readiness check alike.
    pub connect_timeout: Duration,
    /// Deadline for each forwarded call.
    pub request_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            docs_path: PathBuf::from(DEFAULT_DOCS_PATH),
            dial_retry: RetryConfig::no_retry(),
            connect_timeout: DEFAULT_GATEWAY_DIAL_TIMEOUT,
            request_timeout: DEFAULT_GATEWAY_REQUEST_TIMEOUT,
        }
    }
}

impl From<&ServerConfig> for GatewayOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            docs_path: config.docs_path.clone(),
            dial_retry: config.dial_retry.clone(),
            connect_timeout: config.gateway_dial_timeout,
            request_timeout: config.gateway_request_timeout,
        }
    }
}

pub struct GatewayListener;

pub struct RunningGatewayListener {
    local_addr: SocketAddr,
    shutdown: ShutdownSignal,
    accept_task: JoinHandle<Connections>,
}

/// Live connections handed from the accept loop to the drain phase.
struct Connections {
    graceful: GracefulShutdown,
    tasks: JoinSet<()>,
}

impl GatewayListener {
    /// Dial the RPC listener at `rpc_endpoint`, bind `addr` and start serving.
    ///
    /// The dial happens before the bind and only succeeds once the upstream
    /// answers a `grpc.health.v1` check with `SERVING`, so a gateway whose
    /// upstream is unreachable or is not a gRPC server never accepts a
    /// connection.
    pub async fn start(
        addr: SocketAddr,
        rpc_endpoint: &str,
        options: GatewayOptions,
        shutdown: ShutdownSignal,
    ) -> Result<RunningGatewayListener, ServerError> {
        let endpoint = Endpoint::from_shared(rpc_endpoint.to_string())
            .map_err(|source| ServerError::InvalidEndpoint {
                endpoint: rpc_endpoint.to_string(),
                source,
            })?
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout);

        let channel = connect_with_retry(
            &endpoint,
            &options.dial_retry,
            options.connect_timeout,
            upstream_serving,
        )
        .await
        .map_err(|source| ServerError::Dial {
            endpoint: rpc_endpoint.to_string(),
            source,
        })?;
        tracing::debug!(endpoint = rpc_endpoint, "Connected to gRPC server");

        let router = build_router(GatewayState::new(channel), &options.docs_path);

        let bind_error = |source| ServerError::Bind {
            listener: ListenerKind::Gateway,
            addr,
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let accept_task = tokio::spawn(accept_loop(listener, router, shutdown.clone()));

        tracing::debug!(
            address = %local_addr,
            upstream = rpc_endpoint,
            "HTTP gateway listening"
        );

        Ok(RunningGatewayListener {
            local_addr,
            shutdown,
            accept_task,
        })
    }
}

impl RunningGatewayListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the shutdown signal, then drain for at most `timeout`.
    ///
    /// Idle connections close immediately and in-flight requests are allowed
    /// to finish. Anything still open when `timeout` elapses is closed and
    /// [`ServerError::ShutdownTimeout`] is returned.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), ServerError> {
        let Connections {
            graceful,
            mut tasks,
        } = self.accept_task.await.map_err(|source| ServerError::Join {
            listener: ListenerKind::Gateway,
            source,
        })?;

        // The accept loop only exits once the signal fires.
        debug_assert!(self.shutdown.is_triggered());

        tracing::info!(
            address = %self.local_addr,
            open_connections = tasks.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Draining HTTP gateway"
        );

        tokio::select! {
            _ = graceful.shutdown() => {
                tasks.shutdown().await;
                tracing::info!(address = %self.local_addr, "HTTP gateway stopped");
                Ok(())
            }
            _ = tokio::time::sleep(timeout) => {
                let remaining = tasks.len();
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                tracing::warn!(
                    address = %self.local_addr,
                    closed_connections = remaining,
                    "HTTP gateway shutdown timed out, forcing close"
                );
                Err(ServerError::ShutdownTimeout { timeout })
            }
        }
    }
}

async fn upstream_serving(channel: Channel) -> Result<(), Status> {
    let response = HealthClient::new(channel)
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await?
        .into_inner();

    if response.status == ServingStatus::Serving as i32 {
        Ok(())
    } else {
        Err(Status::unavailable(format!(
            "upstream health status is {:?}",
            ServingStatus::try_from(response.status).unwrap_or(ServingStatus::Unknown)
        )))
    }
}

async fn accept_loop(listener: TcpListener, router: Router, shutdown: ShutdownSignal) -> Connections {
    let graceful = GracefulShutdown::new();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept HTTP connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .serve_connection(TokioIo::new(stream), TowerToHyperService::new(router.clone()));
                let conn = graceful.watch(conn);

                tasks.spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(peer = %peer, error = %e, "HTTP connection closed with error");
                    }
                });
            }
        }
    }

    // Stop accepting before draining begins.
    drop(listener);

    Connections { graceful, tasks }
}
