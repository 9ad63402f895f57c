pub mod cache;
pub mod export;
pub mod lock;
pub mod objects;
pub mod state;
pub mod tweets;

use anyhow::Context;

pub async fn connect(database_url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("connect DATABASE_URL failed")
}
