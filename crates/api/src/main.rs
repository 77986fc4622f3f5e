//! SkinSage API server entry point

use skinsage_api::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let pool = skinsage_shared::db::create_pool(&config.database_url).await?;

    // Run migrations on a dedicated single-connection pool
    let migration_pool = skinsage_shared::db::create_migration_pool(&config.database_url).await?;
    skinsage_shared::db::run_migrations(&migration_pool).await?;
    migration_pool.close().await;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(addr = %bind_address, "SkinSage API listening");

    axum::serve(listener, app).await?;

    Ok(())
}
