//! Shared setup for identity-service integration tests.

#![allow(dead_code)]

use identity_service::{
    build_router,
    grpc::AuthBoundary,
    services::{
        AuthService, MemoryStore, RequestContext, ServiceContext, SessionSettings, Store,
        TokenMaker, TokenScheme,
    },
    utils::{Argon2Hasher, HashCost},
    AppState,
};
use service_core::axum::Router;
use service_core::middleware::rate_limit::create_operation_rate_limiter;
use std::sync::Arc;

pub const TEST_KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
pub const PASSWORD: &str = "Str0ng!Pass";

pub fn cheap_hasher() -> Argon2Hasher {
    Argon2Hasher::new(HashCost {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}

/// Build an orchestrator over any store.
pub fn auth_service(
    store: Arc<dyn Store>,
    scheme: TokenScheme,
    rate_limit: Option<u32>,
) -> AuthService {
    AuthService::new(
        store,
        Arc::new(cheap_hasher()),
        TokenMaker::new(scheme, TEST_KEY).unwrap(),
        SessionSettings::default(),
        ServiceContext::new(
            "identity-service-test",
            rate_limit.map(|n| create_operation_rate_limiter(n, 60)),
        ),
    )
}

/// In-memory application: store, orchestrator, boundary and router.
pub struct TestApp {
    pub store: MemoryStore,
    pub auth: AuthService,
    pub boundary: AuthBoundary,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(TokenScheme::Jwt, None)
    }

    pub fn with_scheme(scheme: TokenScheme) -> Self {
        Self::build(scheme, None)
    }

    pub fn with_rate_limit(requests: u32) -> Self {
        Self::build(TokenScheme::Jwt, Some(requests))
    }

    fn build(scheme: TokenScheme, rate_limit: Option<u32>) -> Self {
        let store = MemoryStore::new();
        let auth = auth_service(Arc::new(store.clone()), scheme, rate_limit);
        let boundary = AuthBoundary::new(auth.clone(), None);
        Self {
            store,
            auth,
            boundary,
        }
    }

    pub fn router(&self) -> Router {
        build_router(AppState {
            service_name: "identity-service-test".to_string(),
            service_version: "test".to_string(),
            boundary: self.boundary.clone(),
        })
    }

    pub fn ctx(&self) -> RequestContext {
        RequestContext::background()
    }
}
