use auth_service::{config::AuthConfig, grpc::AuthServiceImpl, Server};
use service_core::observability::logging::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        grpc_port = config.server.grpc_port,
        http_port = config.server.http_port,
        "Starting authentication service"
    );

    let report = Server::new(config.server, AuthServiceImpl::new()).start().await;

    tracing::info!(
        reason = ?report.reason,
        clean = report.is_clean(),
        "Authentication service shutdown complete"
    );

    shutdown_tracing();
    Ok(())
}
