//! gRPC listener: binds the RPC port and serves the handler contract.

use std::net::SocketAddr;
use std::sync::Arc;

use service_core::grpc::{
    create_health_service, create_reflection_service, trace_context_interceptor,
    GrpcServerBuilder, HealthReporter,
};
use service_core::shutdown::ShutdownSignal;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::server::NamedService;
use tonic::service::interceptor::InterceptedService;

use super::error::{ListenerKind, ServerError};
use crate::grpc::proto::auth::{auth_service_server::AuthServiceServer, FILE_DESCRIPTOR_SET};
use crate::grpc::AuthService;

pub struct RpcListener;

/// A bound, serving gRPC listener.
pub struct RunningRpcListener {
    local_addr: SocketAddr,
    health: HealthReporter,
    shutdown: ShutdownSignal,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl RpcListener {
    /// Bind `addr` and start serving `handler` until `shutdown` fires.
    ///
    /// Once this returns `Ok` the socket is accepting connections and the
    /// standard health service reports `SERVING`.
    pub async fn start<H: AuthService>(
        builder: GrpcServerBuilder,
        addr: SocketAddr,
        handler: Arc<H>,
        shutdown: ShutdownSignal,
    ) -> Result<RunningRpcListener, ServerError> {
        let bind_error = |source| ServerError::Bind {
            listener: ListenerKind::Rpc,
            addr,
            source,
        };

        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let health = create_health_service(<AuthServiceServer<H> as NamedService>::NAME).await;

        let reflection = if builder.reflection_enabled() {
            Some(create_reflection_service(&[FILE_DESCRIPTOR_SET])?)
        } else {
            None
        };

        let auth_service = InterceptedService::new(
            AuthServiceServer::from_arc(handler),
            trace_context_interceptor,
        );

        let incoming = TcpListenerStream::new(listener);
        let server = builder
            .build_server()
            .add_service(health.server)
            .add_optional_service(reflection)
            .add_service(auth_service)
            .serve_with_incoming_shutdown(incoming, shutdown.triggered_owned());

        let task = tokio::spawn(server);

        tracing::info!(
            service = builder.service_name(),
            address = %local_addr,
            "gRPC server listening"
        );

        Ok(RunningRpcListener {
            local_addr,
            health: health.reporter,
            shutdown,
            task,
        })
    }
}

impl RunningRpcListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the shutdown signal, then drain.
    ///
    /// New connections are refused as soon as the signal fires; in-flight
    /// calls run to completion with no deadline. Returns early if the serve
    /// loop dies on its own.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        let RunningRpcListener {
            local_addr,
            health,
            shutdown,
            mut task,
        } = self;

        tokio::select! {
            _ = shutdown.triggered() => {}
            result = &mut task => {
                tracing::error!(address = %local_addr, "gRPC server stopped before shutdown");
                return flatten(result);
            }
        }

        health.set_not_serving().await;

        tracing::info!(address = %local_addr, "Draining gRPC server");
        let result = flatten(task.await);
        if result.is_ok() {
            tracing::info!(address = %local_addr, "gRPC server stopped");
        }
        result
    }
}

fn flatten(
    result: Result<Result<(), tonic::transport::Error>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::Serve {
            listener: ListenerKind::Rpc,
            source: anyhow::Error::new(e),
        }),
        Err(source) => Err(ServerError::Join {
            listener: ListenerKind::Rpc,
            source,
        }),
    }
}
