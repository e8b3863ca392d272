use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Best-effort guard against two workers running the ingest/alert tick at
// the same time against one database.
const PIPELINE_LOCK_KEY: i64 = 0x474F_4C44_5749; // "GOLDWI" as hex-ish namespace.

/// Owns the session holding the advisory lock. Postgres scopes advisory
/// locks to the session, so acquire and release must happen on the same
/// connection; the guard keeps that connection checked out of the pool
/// until [`PipelineLock::release`] (or drop, which closes the session and
/// releases the lock with it).
pub struct PipelineLock {
    conn: PoolConnection<Postgres>,
}

pub async fn try_acquire_pipeline_lock(
    pool: &sqlx::PgPool,
) -> anyhow::Result<Option<PipelineLock>> {
    let mut conn = pool
        .acquire()
        .await
        .context("check out connection for advisory lock failed")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(PIPELINE_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={PIPELINE_LOCK_KEY})"))?;
    Ok(acquired.0.then_some(PipelineLock { conn }))
}

impl PipelineLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let released: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(PIPELINE_LOCK_KEY)
            .fetch_one(&mut *self.conn)
            .await
            .with_context(|| {
                format!("failed to release advisory lock (key={PIPELINE_LOCK_KEY})")
            })?;
        // False here means the unlock ran on a session that never held
        // the lock, which would leave it stuck on the acquiring one.
        anyhow::ensure!(
            released.0,
            "advisory lock (key={PIPELINE_LOCK_KEY}) was not held by this session"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "needs a live Postgres via DATABASE_URL"]
    async fn lock_acquires_and_releases_on_one_session() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connect");

        let lock = try_acquire_pipeline_lock(&pool)
            .await
            .expect("acquire query")
            .expect("lock free");

        // Held lock blocks a second acquire from the same pool.
        assert!(try_acquire_pipeline_lock(&pool)
            .await
            .expect("second acquire query")
            .is_none());

        // Release lands on the owning session, so the next acquire
        // succeeds instead of finding the lock stuck on an idle
        // connection.
        lock.release().await.expect("release");
        let again = try_acquire_pipeline_lock(&pool)
            .await
            .expect("reacquire query")
            .expect("lock free after release");
        again.release().await.expect("second release");
    }
}
