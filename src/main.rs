use std::sync::Arc;

use tracing::info;

use inventory_api::config::Config;
use inventory_api::handlers::{router, AppState};
use inventory_api::observability::{setup_metrics, setup_tracing};
use inventory_api::repo::{init_schema, PgInventoryRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    // Initialize tracing - keep provider alive
    let _otel_provider = setup_tracing(&config)?;

    info!("Starting inventory-api...");

    let metrics = setup_metrics()?;

    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    info!("Connected to database");

    init_schema(&db_pool).await?;

    info!("Database schema initialized");

    let repo = PgInventoryRepository::new(db_pool, metrics.db_duration_histogram.clone());
    let state = AppState {
        repo: Arc::new(repo),
        http_duration_histogram: metrics.http_duration_histogram.clone(),
    };

    let app = router(state, &config.cors_origin);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
