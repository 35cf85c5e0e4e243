//! HTTP/JSON gateway in front of the gRPC `AuthService`.
//!
//! Every route here is a thin proxy: decode JSON, call the RPC listener over
//! a channel, encode the reply. The one exception is `/docs`, which serves the
//! API description document from disk.

pub mod handlers;

use std::path::Path;

use axum::{middleware::from_fn, routing::get, Router};
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use tonic::transport::Channel;
use tower_http::{services::ServeFile, trace::TraceLayer};

use crate::grpc::proto::auth::auth_service_client::AuthServiceClient;

pub const HEALTH_ROUTE: &str = "/api/v1/health";
pub const DOCS_ROUTE: &str = "/docs";

#[derive(Clone)]
pub struct GatewayState {
    pub client: AuthServiceClient<Channel>,
}

impl GatewayState {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: AuthServiceClient::new(channel),
        }
    }
}

pub fn build_router(state: GatewayState, docs_path: &Path) -> Router {
    Router::new()
        .route(
            HEALTH_ROUTE,
            get(handlers::health_get).post(handlers::health_post),
        )
        .route_service(DOCS_ROUTE, ServeFile::new(docs_path))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}
