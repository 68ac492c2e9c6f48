//! gRPC health check service utilities.
//!
//! Wraps `tonic-health` so binaries can flip their serving status without
//! holding on to the raw reporter.

use std::sync::Arc;
use tokio::sync::RwLock;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::server::HealthReporter as TonicHealthReporter;

/// Health status for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Serving,
    NotServing,
    Unknown,
}

impl From<HealthStatus> for tonic_health::ServingStatus {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Serving => tonic_health::ServingStatus::Serving,
            HealthStatus::NotServing => tonic_health::ServingStatus::NotServing,
            HealthStatus::Unknown => tonic_health::ServingStatus::Unknown,
        }
    }
}

/// Reporter for updating the status of one named service.
#[derive(Clone)]
pub struct HealthReporter {
    inner: Arc<RwLock<TonicHealthReporter>>,
    service_name: String,
}

impl HealthReporter {
    pub fn new(reporter: TonicHealthReporter, service_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(reporter)),
            service_name: service_name.into(),
        }
    }

    pub async fn set_status(&self, status: HealthStatus) {
        let mut reporter = self.inner.write().await;
        reporter
            .set_service_status(&self.service_name, status.into())
            .await;
        tracing::info!(service = %self.service_name, status = ?status, "Health status updated");
    }

    pub async fn set_serving(&self) {
        self.set_status(HealthStatus::Serving).await;
    }

    pub async fn set_not_serving(&self) {
        self.set_status(HealthStatus::NotServing).await;
    }
}

/// Health service components returned by `create_health_service`.
pub struct HealthComponents<S> {
    /// The health server to add to the gRPC router.
    pub server: HealthServer<S>,
    /// The reporter for updating health status.
    pub reporter: HealthReporter,
}

/// Create a health service whose named entry starts out `NotServing`.
///
/// Call `reporter.set_serving()` once dependencies (database, migrations)
/// are ready.
pub async fn create_health_service(
    service_name: impl Into<String>,
) -> HealthComponents<impl Health> {
    let service_name = service_name.into();
    let (mut reporter, health_server) = tonic_health::server::health_reporter();

    reporter
        .set_service_status(&service_name, tonic_health::ServingStatus::NotServing)
        .await;

    HealthComponents {
        server: health_server,
        reporter: HealthReporter::new(reporter, service_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_conversion() {
        assert_eq!(
            tonic_health::ServingStatus::from(HealthStatus::Serving),
            tonic_health::ServingStatus::Serving
        );
        assert_eq!(
            tonic_health::ServingStatus::from(HealthStatus::NotServing),
            tonic_health::ServingStatus::NotServing
        );
        assert_eq!(
            tonic_health::ServingStatus::from(HealthStatus::Unknown),
            tonic_health::ServingStatus::Unknown
        );
    }
}
