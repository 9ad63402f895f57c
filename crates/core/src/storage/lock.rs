use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the lock keeps its connection checked
// out until release. Used as a best-effort guard against two live runs racing on the snapshot.
const RUN_LOCK_KEY: i64 = 0x4D45_4C54_444F_574E; // "MELTDOWN"

/// Held run lock. Dropping it without [`RunLock::release`] detaches the connection from the
/// pool and closes it, which ends the session and with it the lock.
pub struct RunLock {
    conn: Option<PoolConnection<Postgres>>,
}

/// `Ok(None)` when another session already holds the lock.
pub async fn try_acquire_run_lock(pool: &sqlx::PgPool) -> anyhow::Result<Option<RunLock>> {
    let mut conn = pool
        .acquire()
        .await
        .context("failed to check out a connection for the run lock")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(RUN_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={RUN_LOCK_KEY})"))?;
    Ok(acquired.0.then_some(RunLock { conn: Some(conn) }))
}

impl RunLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let unlocked = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(RUN_LOCK_KEY)
            .execute(&mut *conn)
            .await;
        match unlocked {
            // Back to the pool with the session lock gone.
            Ok(_) => Ok(()),
            Err(err) => {
                // The session may still hold the lock; never hand it back to the pool.
                drop(conn.detach());
                Err(err).with_context(|| {
                    format!("failed to release advisory lock (key={RUN_LOCK_KEY})")
                })
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("run lock dropped without release; closing its connection");
            drop(conn.detach());
        }
    }
}
