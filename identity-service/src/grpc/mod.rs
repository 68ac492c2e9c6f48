//! gRPC-style boundary for identity-service.
//!
//! Operations return `Result<T, tonic::Status>`; the HTTP handlers and the
//! health server sit on top of this layer.

pub mod boundary;
pub mod error_mapper;

pub use boundary::AuthBoundary;
pub use error_mapper::to_status;
