//! Application configuration loaded from environment.

use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g. `0.0.0.0:3000`).
    pub server_addr: SocketAddr,
    /// Secret used to verify bearer tokens issued by the identity service.
    pub jwt_secret: String,
    /// Shared key REST collaborators present via `x-app-key`.
    pub app_key: String,
    /// Delay between a user's last connection closing and presence eviction.
    pub grace_period: Duration,
    /// Per-connection bounded outbound queue capacity.
    pub outbound_queue: usize,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let server_addr = std::env::var("SERVER_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|_| ConfigLoadError::InvalidServerAddr)?;

        let jwt_secret = std::env::var("JWT_SECRET")
            .unwrap_or_else(|_| "presenced_jwt_secret_change_in_production".to_string());
        let app_key =
            std::env::var("APP_KEY").unwrap_or_else(|_| "presenced_key".to_string());

        let grace_period_secs = std::env::var("GRACE_PERIOD_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigLoadError::InvalidGracePeriod)?;

        let outbound_queue = std::env::var("OUTBOUND_QUEUE")
            .unwrap_or_else(|_| "64".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigLoadError::InvalidOutboundQueue)?;
        if outbound_queue == 0 {
            return Err(ConfigLoadError::InvalidOutboundQueue);
        }

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            server_addr,
            jwt_secret,
            app_key,
            grace_period: Duration::from_secs(grace_period_secs),
            outbound_queue,
            log_level,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Invalid SERVER_ADDR")]
    InvalidServerAddr,
    #[error("Invalid GRACE_PERIOD_SECS")]
    InvalidGracePeriod,
    #[error("Invalid OUTBOUND_QUEUE")]
    InvalidOutboundQueue,
}
