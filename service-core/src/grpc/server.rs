//! gRPC server builder utilities.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tonic::transport::Server;
use tonic_health::pb::health_server::{Health, HealthServer};

/// Builder for configuring a gRPC server with standard transport settings.
pub struct GrpcServerBuilder {
    service_name: String,
    http2_keepalive_interval: Duration,
    http2_keepalive_timeout: Duration,
}

impl GrpcServerBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            http2_keepalive_interval: Duration::from_secs(30),
            http2_keepalive_timeout: Duration::from_secs(10),
        }
    }

    /// Build a tonic Server with the configured settings.
    pub fn build_server(&self) -> Server {
        Server::builder()
            .http2_keepalive_interval(Some(self.http2_keepalive_interval))
            .http2_keepalive_timeout(Some(self.http2_keepalive_timeout))
    }

    /// Serve the health service on `addr` until `shutdown` resolves.
    pub async fn serve_health<H, F>(
        &self,
        addr: SocketAddr,
        health: HealthServer<H>,
        shutdown: F,
    ) -> Result<(), tonic::transport::Error>
    where
        H: Health,
        F: Future<Output = ()> + Send,
    {
        tracing::info!(service = %self.service_name, address = %addr, "Starting gRPC health server");

        let mut server = self.build_server();
        server
            .add_service(health)
            .serve_with_shutdown(addr, shutdown)
            .await
    }
}
