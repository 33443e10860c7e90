use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_common::redis_pool::create_redis_pool;
use courier_push::WebPushClient;
use courier_scheduler::dispatcher::BatchDispatcher;
use courier_scheduler::lock::TickLock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_scheduler=info,courier_store=info".into()),
        )
        .json()
        .init();

    tracing::info!("NewsCourier scheduler starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let vapid_private_key = config
        .vapid_private_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("VAPID_PRIVATE_KEY is required for the scheduler"))?;
    let vapid_public_key = config
        .vapid_public_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("VAPID_PUBLIC_KEY is required for the scheduler"))?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Tick lock keeps concurrent scheduler instances from racing on the same
    // due set
    let redis = create_redis_pool(&config.redis_url).await?;
    let mut lock = TickLock::new(redis, config.scheduler_lock_ttl_secs);

    let client = WebPushClient::new(
        vapid_private_key,
        vapid_public_key,
        config.vapid_subject.clone(),
    );
    let dispatcher = BatchDispatcher::new(
        pool,
        client,
        Duration::from_secs(config.delivery_timeout_secs),
    );

    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.scheduler_poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        poll_interval_secs = config.scheduler_poll_interval_secs,
        delivery_timeout_secs = config.delivery_timeout_secs,
        "Scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match lock.try_acquire().await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "Tick lock unavailable, skipping tick");
                        continue;
                    }
                }

                // The tick is awaited here, so ticks from this instance never
                // overlap.
                if let Err(e) = dispatcher.run_tick(Utc::now()).await {
                    tracing::error!(error = %e, "Tick aborted; pending batches retry next tick");
                }

                if let Err(e) = lock.release().await {
                    tracing::error!(error = %e, "Failed to release tick lock; it expires by TTL");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal, stopping gracefully...");
                break;
            }
        }
    }

    tracing::info!("NewsCourier scheduler stopped.");
    Ok(())
}
