//! gRPC implementation of AuthService.

use tonic::{Request, Response, Status};

use crate::grpc::proto::auth::{
    auth_service_server::AuthService, HealthRequest, HealthResponse,
};

pub const HEALTH_STATUS_OK: &str = "OK";
pub const HEALTH_MESSAGE: &str = "Auth service is running and healthy";

/// Reference handler. Holds no state, so one instance is shared by every
/// concurrent call.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthServiceImpl;

impl AuthServiceImpl {
    pub fn new() -> Self {
        Self
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn health(
        &self,
        _request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        Ok(Response::new(HealthResponse {
            status: HEALTH_STATUS_OK.to_string(),
            message: HEALTH_MESSAGE.to_string(),
        }))
    }
}
