//! HTTP handlers for identity-service.

pub mod auth;
