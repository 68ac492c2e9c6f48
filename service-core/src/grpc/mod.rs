//! gRPC utilities.
//!
//! - Conversion from `tonic::Status` into the HTTP-facing `AppError`
//! - Health check service implementation
//! - Server builder for the health endpoint

pub mod error;
pub mod health;
pub mod server;

pub use error::RETRY_AFTER_KEY;
pub use health::{create_health_service, HealthComponents, HealthReporter, HealthStatus};
pub use server::GrpcServerBuilder;

// Re-export commonly used tonic types
pub use tonic::{Code, Request, Response, Status};
