// src/db.rs
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Connects to Postgres and brings the schema up to date before the pool
/// is handed to any handler.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    tracing::info!("Applying pending database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database schema is up to date");

    Ok(pool)
}
