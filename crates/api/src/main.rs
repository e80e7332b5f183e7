use anyhow::Result;
use std::net::SocketAddr;
use tracing::{info, warn};

use auraclub_api::{app, config, middleware, services};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting AuraClub API v{}", env!("CARGO_PKG_VERSION"));

    let db_config: persistence::db::DatabaseConfig = (&config.database).into();
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    if let Err(e) = services::bootstrap::bootstrap_superuser(&pool, &config.bootstrap).await {
        warn!(error = %e, "Superuser bootstrap failed");
    }

    let addr = config.socket_addr()?;
    let app = app::create_app(config, pool)?;

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
