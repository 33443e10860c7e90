//! Single-instance tick lock.
//!
//! Two scheduler instances reading the same due set would race each other on
//! the pending transition of every batch; the lock lets all but one skip the
//! tick instead. Uses Redis `SET NX EX` for atomic acquire with automatic TTL
//! expiry, so a crashed holder cannot wedge the scheduler.

use redis::aio::ConnectionManager;

const LOCK_KEY: &str = "scheduler:tick-lock";

/// Redis-backed tick lock.
pub struct TickLock {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl TickLock {
    pub fn new(redis: ConnectionManager, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    /// Try to take the lock for this tick.
    ///
    /// Returns `true` if acquired. Returns `false` if another instance holds
    /// it, in which case the caller skips the tick.
    ///
    /// Uses Redis `SET key value NX EX ttl` for atomic check-and-set:
    /// - NX = only set if key doesn't exist
    /// - EX = set TTL in seconds
    pub async fn try_acquire(&mut self) -> anyhow::Result<bool> {
        let result: Option<String> = redis::cmd("SET")
            .arg(LOCK_KEY)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut self.redis)
            .await?;

        let acquired = result.is_some();

        if !acquired {
            tracing::debug!("Tick skipped — another scheduler instance holds the lock");
        }

        Ok(acquired)
    }

    /// Release the lock after the tick completes.
    pub async fn release(&mut self) -> anyhow::Result<()> {
        let _: () = redis::cmd("DEL")
            .arg(LOCK_KEY)
            .query_async(&mut self.redis)
            .await?;
        Ok(())
    }
}
