use axum::{body::Bytes, extract::State, Extension, Json};
use service_core::error::AppError;
use service_core::grpc::{inject_trace_context, inject_trace_context_with_request_id};
use service_core::middleware::RequestId;

use super::GatewayState;
use crate::grpc::proto::auth::{HealthRequest, HealthResponse};

/// GET /api/v1/health
pub async fn health_get(
    State(state): State<GatewayState>,
    request_id: Option<Extension<RequestId>>,
) -> Result<Json<HealthResponse>, AppError> {
    forward_health(&state, HealthRequest {}, request_id).await
}

/// POST /api/v1/health
///
/// An empty body is an empty request. Unknown fields are ignored.
pub async fn health_post(
    State(state): State<GatewayState>,
    request_id: Option<Extension<RequestId>>,
    body: Bytes,
) -> Result<Json<HealthResponse>, AppError> {
    let request = parse_body(&body)?;
    forward_health(&state, request, request_id).await
}

pub async fn not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Not Found"))
}

fn parse_body(body: &[u8]) -> Result<HealthRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HealthRequest {});
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e)))
}

async fn forward_health(
    state: &GatewayState,
    message: HealthRequest,
    request_id: Option<Extension<RequestId>>,
) -> Result<Json<HealthResponse>, AppError> {
    let mut request = tonic::Request::new(message);
    match &request_id {
        Some(Extension(id)) => inject_trace_context_with_request_id(&mut request, id.as_str()),
        None => inject_trace_context(&mut request),
    }

    let mut client = state.client.clone();
    let response = client.health(request).await.map_err(|status| {
        tracing::warn!(
            code = ?status.code(),
            message = status.message(),
            "Upstream Health call failed"
        );
        AppError::from(status)
    })?;

    Ok(Json(response.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_blank_body_is_an_empty_request() {
        assert!(parse_body(b"").is_ok());
        assert!(parse_body(b"  \n").is_ok());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        assert!(parse_body(br#"{"verbose": true}"#).is_ok());
        assert!(parse_body(b"{}").is_ok());
    }

    #[test]
    fn malformed_json_is_a_bad_request() {
        assert!(matches!(
            parse_body(b"{not json"),
            Err(AppError::BadRequest(_))
        ));
    }
}
