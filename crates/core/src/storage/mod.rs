use anyhow::Context;

pub mod alerts;
pub mod lock;
pub mod notifications;
pub mod prices;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
