//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,

    // Presence
    /// Seconds of heartbeat silence after which the reaper demotes an
    /// active/busy expert to offline.
    pub presence_stale_after_secs: u64,
    /// Seconds between reaper sweeps in the worker binary.
    pub reaper_interval_secs: u64,

    // Messaging
    /// Upper bound on messages returned by a single cursor fetch. Clients
    /// pick up the remainder on the next poll because the cursor advances.
    pub message_fetch_limit: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Presence
            presence_stale_after_secs: {
                let secs = env::var("PRESENCE_STALE_AFTER_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300);
                if secs == 0 {
                    return Err(ConfigError::Invalid(
                        "PRESENCE_STALE_AFTER_SECS must be greater than zero",
                    ));
                }
                secs
            },
            reaper_interval_secs: {
                let secs = env::var("REAPER_INTERVAL_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .unwrap_or(120);
                if secs == 0 {
                    return Err(ConfigError::Invalid(
                        "REAPER_INTERVAL_SECS must be greater than zero",
                    ));
                }
                secs
            },

            // Messaging
            message_fetch_limit: env::var("MESSAGE_FETCH_LIMIT")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_missing_database_url_fails() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();

        env::remove_var("DATABASE_URL");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn test_defaults_and_overrides() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();

        env::set_var("DATABASE_URL", "postgres://test");
        env::remove_var("PRESENCE_STALE_AFTER_SECS");
        env::remove_var("REAPER_INTERVAL_SECS");
        env::remove_var("MESSAGE_FETCH_LIMIT");

        let config = Config::from_env().unwrap();
        assert_eq!(config.presence_stale_after_secs, 300);
        assert_eq!(config.reaper_interval_secs, 120);
        assert_eq!(config.message_fetch_limit, 500);

        env::set_var("PRESENCE_STALE_AFTER_SECS", "60");
        let config = Config::from_env().unwrap();
        assert_eq!(config.presence_stale_after_secs, 60);

        // Zero threshold would make the reaper flap every expert offline
        env::set_var("PRESENCE_STALE_AFTER_SECS", "0");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        env::remove_var("PRESENCE_STALE_AFTER_SECS");
        env::remove_var("DATABASE_URL");
    }
}
