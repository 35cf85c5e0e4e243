//! Lifecycle coordinator for the two listeners.
//!
//! [`Server::start`] runs the gRPC listener and the HTTP gateway side by side
//! until SIGINT, SIGTERM or an explicit [`ShutdownSignal::trigger`], then
//! drains both and reports how each one ended.

pub mod error;
pub mod gateway;
pub mod rpc;

pub use error::{ListenerKind, ServerError};
pub use gateway::{GatewayListener, GatewayOptions, RunningGatewayListener};
pub use rpc::{RpcListener, RunningRpcListener};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use service_core::grpc::GrpcServerBuilder;
use service_core::shutdown::{wait_for_os_signal, ShutdownReason, ShutdownSignal};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{ServerConfig, StartupPolicy};
use crate::gateway::{DOCS_ROUTE, HEALTH_ROUTE};
use crate::grpc::AuthService;

/// How each listener ended.
#[derive(Debug)]
pub struct ShutdownReport {
    pub reason: Option<ShutdownReason>,
    pub rpc: Result<(), ServerError>,
    pub gateway: Result<(), ServerError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.rpc.is_ok() && self.gateway.is_ok()
    }
}

pub struct Server<H> {
    config: ServerConfig,
    handler: Arc<H>,
    shutdown: ShutdownSignal,
}

impl<H: AuthService> Server<H> {
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self::with_shared_handler(config, Arc::new(handler))
    }

    pub fn with_shared_handler(config: ServerConfig, handler: Arc<H>) -> Self {
        Self {
            config,
            handler,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Handle for stopping the server from code. Equivalent to SIGTERM.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run both listeners until an OS signal or an explicit trigger.
    pub async fn start(self) -> ShutdownReport {
        self.run_until(wait_for_os_signal()).await
    }

    /// Like [`start`](Self::start), but `stop` replaces the OS signal source.
    pub async fn run_until<F>(self, stop: F) -> ShutdownReport
    where
        F: Future<Output = ShutdownReason>,
    {
        let Server {
            config,
            handler,
            shutdown,
        } = self;

        let rpc_addr = SocketAddr::new(config.bind_address, config.grpc_port);
        let http_addr = SocketAddr::new(config.bind_address, config.http_port);

        tracing::info!(
            grpc = %rpc_addr,
            http = %http_addr,
            health = %format!("http://{}{}", http_addr, HEALTH_ROUTE),
            docs = %format!("http://{}{}", http_addr, DOCS_ROUTE),
            docs_path = %config.docs_path.display(),
            policy = ?config.startup_policy,
            "Starting servers"
        );

        let (ready_tx, ready_rx) = oneshot::channel();

        let builder =
            GrpcServerBuilder::new(env!("CARGO_PKG_NAME")).with_reflection(config.grpc_reflection);
        let rpc_task: JoinHandle<Result<(), ServerError>> = tokio::spawn(run_rpc(
            builder,
            rpc_addr,
            handler,
            shutdown.clone(),
            config.startup_policy,
            ready_tx,
        ));
        let gateway_task: JoinHandle<Result<(), ServerError>> = tokio::spawn(run_gateway(
            http_addr,
            config.clone(),
            shutdown.clone(),
            ready_rx,
        ));

        tokio::select! {
            reason = stop => {
                shutdown.trigger(reason);
            }
            _ = shutdown.triggered() => {}
        }

        tracing::info!(reason = ?shutdown.reason(), "Shutting down servers");

        let (rpc, gateway) = tokio::join!(rpc_task, gateway_task);
        let report = ShutdownReport {
            reason: shutdown.reason(),
            rpc: flatten(ListenerKind::Rpc, rpc),
            gateway: flatten(ListenerKind::Gateway, gateway),
        };

        if report.is_clean() {
            tracing::info!("Servers stopped gracefully");
        } else {
            tracing::warn!(
                rpc = ?report.rpc.as_ref().err().map(ToString::to_string),
                gateway = ?report.gateway.as_ref().err().map(ToString::to_string),
                "Servers stopped with errors"
            );
        }

        report
    }
}

async fn run_rpc<H: AuthService>(
    builder: GrpcServerBuilder,
    addr: SocketAddr,
    handler: Arc<H>,
    shutdown: ShutdownSignal,
    policy: StartupPolicy,
    ready: oneshot::Sender<SocketAddr>,
) -> Result<(), ServerError> {
    let running = match RpcListener::start(builder, addr, handler, shutdown.clone()).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "gRPC server failed to start");
            if policy == StartupPolicy::AllOrNothing {
                shutdown.trigger(ShutdownReason::StartupFailure);
            }
            return Err(e);
        }
    };

    // The gateway may have given up already.
    let _ = ready.send(running.local_addr());

    running.shutdown().await
}

async fn run_gateway(
    addr: SocketAddr,
    config: ServerConfig,
    shutdown: ShutdownSignal,
    rpc_ready: oneshot::Receiver<SocketAddr>,
) -> Result<(), ServerError> {
    // Dial the port the RPC listener actually bound. If it never came up, fall
    // back to the configured one and let the dial fail on its own.
    let rpc_port = tokio::select! {
        ready = rpc_ready => match ready {
            Ok(bound) => bound.port(),
            Err(_) => config.grpc_port,
        },
        _ = shutdown.triggered() => return Ok(()),
    };

    if shutdown.is_triggered() {
        return Ok(());
    }

    let endpoint = config.rpc_endpoint(rpc_port);
    let start = GatewayListener::start(
        addr,
        &endpoint,
        GatewayOptions::from(&config),
        shutdown.clone(),
    );

    // A dial with retries can outlive the signal.
    let started = tokio::select! {
        started = start => started,
        _ = shutdown.triggered() => return Ok(()),
    };

    let running = match started {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "HTTP gateway failed to start");
            if config.startup_policy == StartupPolicy::AllOrNothing {
                shutdown.trigger(ShutdownReason::StartupFailure);
            }
            return Err(e);
        }
    };

    let local = running.local_addr();
    tracing::info!(
        address = %local,
        health = %format!("http://{}{}", local, HEALTH_ROUTE),
        docs = %format!("http://{}{}", local, DOCS_ROUTE),
        "HTTP gateway ready"
    );

    running.shutdown(config.gateway_shutdown_timeout).await
}

fn flatten(
    listener: ListenerKind,
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    result.unwrap_or_else(|source| Err(ServerError::Join { listener, source }))
}
