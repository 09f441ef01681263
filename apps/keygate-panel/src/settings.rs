use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::str::FromStr;

const CONFIG_PATHS: [&str; 2] = ["/etc/keygate/panel.toml", "./panel.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database_url: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_port")]
    pub listen_port: u16,
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
    #[serde(default)]
    pub geoip_db_path: Option<String>,
    pub admin_jwt_secret: String,
    /// Reverse proxies allowed to set `X-Forwarded-For` / `X-Real-IP`.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests allowed per IP inside the sliding window.
    pub requests_per_window: u64,
    pub window_secs: u64,
    /// Failed validations that trigger a temporary block.
    pub failure_threshold: u64,
    pub failure_window_secs: u64,
    pub block_ttl_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_secs: 3600,
            failure_threshold: 10,
            failure_window_secs: 3600,
            block_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Country assumed for loopback and private callers.
    pub default_country: String,
    /// A session counts as concurrent while it validated within this window.
    pub session_window_secs: i64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            default_country: "US".to_string(),
            session_window_secs: 300,
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    20
}

fn parse_proxies(raw: &str) -> Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<IpAddr>()
                .with_context(|| format!("Invalid TRUSTED_PROXIES entry {}", p))
        })
        .collect()
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn load() -> Result<Self> {
        for path in CONFIG_PATHS {
            if let Ok(contents) = fs::read_to_string(path) {
                tracing::info!("Loading config from {}", path);
                let settings: Self = toml::from_str(&contents)
                    .with_context(|| format!("Invalid config file {}", path))?;
                settings.check()?;
                return Ok(settings);
            }
        }

        tracing::info!("Loading config from environment");
        let settings = Self::from_env()?;
        settings.check()?;
        Ok(settings)
    }

    pub fn from_env() -> Result<Self> {
        let rate_defaults = RateLimitSettings::default();
        let validation_defaults = ValidationSettings::default();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| default_redis_url()),
            listen_port: env_or("PANEL_PORT", default_port()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections()),
            geoip_db_path: std::env::var("GEOIP_DB_PATH").ok().filter(|p| !p.is_empty()),
            admin_jwt_secret: std::env::var("ADMIN_JWT_SECRET")
                .context("ADMIN_JWT_SECRET must be set")?,
            trusted_proxies: parse_proxies(&std::env::var("TRUSTED_PROXIES").unwrap_or_default())?,
            rate_limit: RateLimitSettings {
                requests_per_window: env_or("RATE_LIMIT_PER_HOUR", rate_defaults.requests_per_window),
                window_secs: rate_defaults.window_secs,
                failure_threshold: env_or("FAILURE_THRESHOLD", rate_defaults.failure_threshold),
                failure_window_secs: env_or("FAILURE_WINDOW_SECS", rate_defaults.failure_window_secs),
                block_ttl_secs: env_or("BLOCK_TTL_SECS", rate_defaults.block_ttl_secs),
            },
            validation: ValidationSettings {
                default_country: std::env::var("DEFAULT_COUNTRY")
                    .map(|c| c.trim().to_uppercase())
                    .unwrap_or(validation_defaults.default_country),
                session_window_secs: env_or(
                    "SESSION_WINDOW_SECS",
                    validation_defaults.session_window_secs,
                ),
            },
        })
    }

    fn check(&self) -> Result<()> {
        keygate_db::db::check_database_url(&self.database_url)?;
        if self.admin_jwt_secret.trim().len() < 16 {
            return Err(anyhow::anyhow!(
                "admin_jwt_secret must be at least 16 characters"
            ));
        }
        if self.rate_limit.requests_per_window == 0 || self.rate_limit.window_secs == 0 {
            return Err(anyhow::anyhow!("rate limit window and quota must be positive"));
        }
        if self.validation.default_country.len() != 2 {
            return Err(anyhow::anyhow!("default_country must be an ISO-3166 alpha-2 code"));
        }
        Ok(())
    }
}
