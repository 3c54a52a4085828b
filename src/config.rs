//! Configuration management for the CVR sync server

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a pull waits on the writer lock before failing
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Rows fetched per page when building puts
    pub page_size: i64,
    /// Snapshots kept per client group after a commit
    pub cvr_retention: i64,
    /// Where clients speaking another pull version are sent
    pub redirect_location: String,
    /// Header carrying the actor descriptor from the auth gateway
    pub actor_header: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            page_size: 10_000,
            cvr_retention: 10,
            redirect_location: "/replicache/pull".to_string(),
            actor_header: "x-sync-actor".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./sync.db".to_string(),
                max_connections: 5,
                busy_timeout_ms: 5_000,
            },
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Read settings from the environment, defaulting each one that is unset
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = SyncConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./sync.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
                busy_timeout_ms: env::var("DATABASE_BUSY_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5_000),
            },
            sync: SyncConfig {
                page_size: env::var("SYNC_PAGE_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|size: &i64| *size > 0)
                    .unwrap_or(defaults.page_size),
                cvr_retention: env::var("SYNC_CVR_RETENTION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|keep: &i64| *keep > 0)
                    .unwrap_or(defaults.cvr_retention),
                redirect_location: env::var("SYNC_REDIRECT_LOCATION")
                    .unwrap_or(defaults.redirect_location),
                actor_header: env::var("SYNC_ACTOR_HEADER").unwrap_or(defaults.actor_header),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_keeps_settings_without_database_url() {
        env::remove_var("DATABASE_URL");
        env::set_var("SYNC_PAGE_SIZE", "250");
        env::set_var("DATABASE_BUSY_TIMEOUT_MS", "1500");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database.url, Config::default().database.url);
        assert_eq!(config.sync.page_size, 250);
        assert_eq!(config.database.busy_timeout_ms, 1500);

        env::remove_var("SYNC_PAGE_SIZE");
        env::remove_var("DATABASE_BUSY_TIMEOUT_MS");
    }
}
