//! Request and response bodies for the auth routes.

pub mod auth;
