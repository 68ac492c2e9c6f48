use identity_service::{
    build_auth_service, build_router,
    config::IdentityConfig,
    db,
    grpc::AuthBoundary,
    services::{sweeper, Database},
    AppState,
};
use service_core::grpc::{create_health_service, GrpcServerBuilder};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        token_scheme = ?config.token.scheme,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(e.into()))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(e.into()))?;

    let store = Arc::new(Database::new(pool));
    let auth = build_auth_service(&config, store)?;
    tracing::info!("Auth service initialized");

    let shutdown = CancellationToken::new();

    // Background expiry sweeper
    let sweeper_handle = tokio::spawn(sweeper::run(
        auth.clone(),
        config.cleanup_interval(),
        shutdown.clone(),
    ));

    // gRPC health service
    let health = create_health_service(config.service_name.clone()).await;
    let reporter = health.reporter;
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.common.grpc_port));
    let grpc_shutdown = shutdown.clone();
    let grpc_builder = GrpcServerBuilder::new(config.service_name.clone());
    let grpc_handle = tokio::spawn(async move {
        if let Err(e) = grpc_builder
            .serve_health(grpc_addr, health.server, grpc_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "gRPC health server failed");
        }
    });

    let state = AppState {
        service_name: config.service_name.clone(),
        service_version: config.service_version.clone(),
        boundary: AuthBoundary::new(auth, config.request_timeout()),
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    reporter.set_serving().await;

    let http_shutdown = shutdown.clone();
    service_core::axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            http_shutdown.cancel();
        })
        .await?;

    reporter.set_not_serving().await;
    shutdown.cancel();

    let grace = Duration::from_secs(config.common.shutdown_grace_seconds);
    if tokio::time::timeout(grace, async {
        let _ = sweeper_handle.await;
        let _ = grpc_handle.await;
    })
    .await
    .is_err()
    {
        tracing::warn!(grace_secs = grace.as_secs(), "Background tasks did not stop in time");
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
