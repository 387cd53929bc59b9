use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub seed_demo_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tunables for the relationship store itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Users whose last heartbeat falls inside this window count as online.
    pub online_window_secs: u64,
    /// Zero disables the background counter reconciler.
    pub reconcile_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            online_window_secs: 300,
            reconcile_interval_secs: 0,
        }
    }
}

impl StoreConfig {
    pub fn online_window(&self) -> Duration {
        Duration::from_secs(self.online_window_secs)
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:data/community.db".to_string());
        if !url.starts_with("sqlite:") {
            anyhow::bail!("DATABASE_URL must be a sqlite: URL, got {}", url);
        }

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 3000),
            },
            store: StoreConfig {
                online_window_secs: env_or("ONLINE_WINDOW_SECS", 300),
                reconcile_interval_secs: env_or("RECONCILE_INTERVAL_SECS", 0),
            },
            seed_demo_data: env_or("SEED_DEMO_DATA", false),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
