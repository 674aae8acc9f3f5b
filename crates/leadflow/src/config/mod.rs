use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub leads: LeadConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            leads: LeadConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Lead lifecycle tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadConfig {
    pub token_ttl_hours: u32,
    pub callback_delay_hours: u32,
    pub distribution_batch_limit: Option<usize>,
    pub score_stale_after_hours: u32,
    pub store_path: Option<PathBuf>,
    /// Seconds between in-process sweeps while serving; `0` disables them.
    pub sweep_interval_seconds: u64,
}

impl Default for LeadConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: 48,
            callback_delay_hours: 24,
            distribution_batch_limit: None,
            score_stale_after_hours: 24,
            store_path: None,
            sweep_interval_seconds: 300,
        }
    }
}

impl LeadConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            token_ttl_hours: hours_var("LEADS_TOKEN_TTL_HOURS", defaults.token_ttl_hours)?,
            callback_delay_hours: hours_var(
                "LEADS_CALLBACK_DELAY_HOURS",
                defaults.callback_delay_hours,
            )?,
            distribution_batch_limit: match env::var("LEADS_DISTRIBUTION_BATCH_LIMIT") {
                Ok(raw) if !raw.trim().is_empty() => Some(
                    raw.trim()
                        .parse::<usize>()
                        .map_err(|_| ConfigError::InvalidNumber {
                            key: "LEADS_DISTRIBUTION_BATCH_LIMIT",
                        })?,
                ),
                _ => None,
            },
            score_stale_after_hours: hours_var(
                "LEADS_SCORE_STALE_AFTER_HOURS",
                defaults.score_stale_after_hours,
            )?,
            store_path: env::var("LEADS_STORE_PATH")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from),
            sweep_interval_seconds: match env::var("LEADS_SWEEP_INTERVAL_SECONDS") {
                Ok(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber {
                        key: "LEADS_SWEEP_INTERVAL_SECONDS",
                    })?,
                Err(_) => defaults.sweep_interval_seconds,
            },
        })
    }
}

fn hours_var(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    MissingStorePath,
    StoreInUse { lock_path: PathBuf },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
            ConfigError::MissingStorePath => {
                write!(f, "set LEADS_STORE_PATH or pass --store to locate the lead store")
            }
            ConfigError::StoreInUse { lock_path } => write!(
                f,
                "lead store is owned by another process; remove {} if none is running",
                lock_path.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::MissingStorePath
            | ConfigError::StoreInUse { .. } => None,
        }
    }
}
