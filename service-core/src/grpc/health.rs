//! Standard `grpc.health.v1.Health` service for a single RPC service.

use tonic_health::ServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};

/// Flips the serving status of one service and of the server as a whole
/// (the empty service name, which clients query by default).
#[derive(Clone, Debug)]
pub struct HealthReporter {
    inner: tonic_health::server::HealthReporter,
    service_name: String,
}

impl HealthReporter {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn set(&self, status: ServingStatus) {
        let mut reporter = self.inner.clone();
        reporter
            .set_service_status(self.service_name.as_str(), status)
            .await;
        reporter.set_service_status("", status).await;
    }

    pub async fn set_serving(&self) {
        self.set(ServingStatus::Serving).await;
    }

    pub async fn set_not_serving(&self) {
        tracing::debug!(service = %self.service_name, "Marking service NOT_SERVING");
        self.set(ServingStatus::NotServing).await;
    }
}

pub struct HealthComponents<S> {
    pub server: HealthServer<S>,
    pub reporter: HealthReporter,
}

/// Create a health service with `service_name` already `SERVING`.
pub async fn create_health_service(
    service_name: impl Into<String>,
) -> HealthComponents<impl Health> {
    let (inner, server) = tonic_health::server::health_reporter();
    let reporter = HealthReporter {
        inner,
        service_name: service_name.into(),
    };
    reporter.set_serving().await;

    HealthComponents { server, reporter }
}
