use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub spond_api_base: String,
    pub spond_timeout_secs: u64,
    pub sync_lock_ttl_secs: u64,
    pub sync_days_ahead: i64,
    pub sync_days_behind: i64,
}

const DEFAULT_SPOND_API_BASE: &str = "https://api.spond.com/core/v1/";

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            server_host: var_or("SERVER_HOST", "0.0.0.0"),
            server_port: var_or("SERVER_PORT", "3000").parse().unwrap_or(3000),
            api_base_uri: var_or("API_BASE_URI", "/api"),
            rate_limit_window_secs: var_or("RATE_LIMIT_WINDOW", "60").parse().unwrap_or(60),
            rate_limit_requests: var_or("RATE_LIMIT_REQUESTS", "100").parse().unwrap_or(100),
            spond_api_base: var_or("SPOND_API_BASE", DEFAULT_SPOND_API_BASE),
            spond_timeout_secs: var_or("SPOND_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            sync_lock_ttl_secs: var_or("SYNC_LOCK_TTL_SECS", "600").parse().unwrap_or(600),
            sync_days_ahead: var_or("SYNC_DAYS_AHEAD", "90").parse().unwrap_or(90),
            sync_days_behind: var_or("SYNC_DAYS_BEHIND", "30").parse().unwrap_or(30),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn spond_timeout(&self) -> Duration {
        Duration::from_secs(self.spond_timeout_secs)
    }

    pub fn sync_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.sync_lock_ttl_secs)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/club_test".into(),
            redis_url: "redis://127.0.0.1/".into(),
            jwt_secret: "test-secret".into(),
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            spond_api_base: DEFAULT_SPOND_API_BASE.into(),
            spond_timeout_secs: 5,
            sync_lock_ttl_secs: 600,
            sync_days_ahead: 90,
            sync_days_behind: 30,
        }
    }
}
