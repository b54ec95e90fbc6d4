use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Connects and brings the schema up to date.
pub async fn connect_database(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running database migrations")?;

    Ok(pool)
}
