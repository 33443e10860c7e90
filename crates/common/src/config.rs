use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Scheduler polling interval in seconds (default: 60)
    pub scheduler_poll_interval_secs: u64,

    /// TTL of the scheduler's single-instance tick lock in seconds (default: 120)
    pub scheduler_lock_ttl_secs: u64,

    /// Upper bound on a single push delivery attempt in seconds (default: 10)
    pub delivery_timeout_secs: u64,

    /// VAPID private key, PEM-encoded EC key for signing push requests
    pub vapid_private_key: Option<String>,

    /// VAPID public key, base64url-encoded, handed to subscribing browsers
    pub vapid_public_key: Option<String>,

    /// VAPID subject (mailto: or https: URI identifying the sender)
    pub vapid_subject: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            scheduler_poll_interval_secs: std::env::var("SCHEDULER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULER_POLL_INTERVAL_SECS must be a valid u64"))?,
            scheduler_lock_ttl_secs: std::env::var("SCHEDULER_LOCK_TTL_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULER_LOCK_TTL_SECS must be a valid u64"))?,
            delivery_timeout_secs: std::env::var("DELIVERY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_TIMEOUT_SECS must be a valid u64"))?,
            vapid_private_key: std::env::var("VAPID_PRIVATE_KEY").ok(),
            vapid_public_key: std::env::var("VAPID_PUBLIC_KEY").ok(),
            vapid_subject: std::env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:alerts@newscourier.io".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
