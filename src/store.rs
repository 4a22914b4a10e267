use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use crate::config::Config;

const SCHEMA: &str = include_str!("schema.sql");

pub async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

/// Every statement in the schema is IF NOT EXISTS, so rerunning against an
/// initialized database is a no-op.
pub async fn init_schema(pool: &PgPool) -> anyhow::Result<()> {
    pool.execute(SCHEMA).await?;
    log::info!("Database schema ready");
    Ok(())
}
