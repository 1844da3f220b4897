//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub presence: PresenceConfig,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
    /// Overrides the format implied by `env`
    pub log_format: Option<LogFormat>,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Log output format override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Session registry tunables, fixed at process start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    session_ttl: Duration,
    reaper_interval: Duration,
}

impl PresenceConfig {
    /// Default inactivity timeout for user and domain sessions
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

    /// Create a validated configuration
    ///
    /// # Errors
    /// Returns an error if the TTL is zero or the reaper interval is zero or
    /// longer than the TTL.
    pub fn new(session_ttl: Duration, reaper_interval: Duration) -> Result<Self, ConfigError> {
        if session_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PRESENCE_SESSION_TTL_SECS",
                "must be greater than zero".to_string(),
            ));
        }
        if reaper_interval.is_zero() || reaper_interval > session_ttl {
            return Err(ConfigError::InvalidValue(
                "PRESENCE_REAPER_INTERVAL_SECS",
                format!("must be non-zero and at most the session TTL ({session_ttl:?})"),
            ));
        }
        Ok(Self {
            session_ttl,
            reaper_interval,
        })
    }

    /// Configuration with the reaper polling at half the TTL
    ///
    /// # Errors
    /// Returns an error if the TTL is zero.
    pub fn with_ttl(session_ttl: Duration) -> Result<Self, ConfigError> {
        Self::new(session_ttl, default_reaper_interval(session_ttl))
    }

    /// Inactivity timeout after which a session is reaped
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// How often each registry is swept for expired sessions
    #[must_use]
    pub fn reaper_interval(&self) -> Duration {
        self.reaper_interval
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            session_ttl: PresenceConfig::DEFAULT_TTL,
            reaper_interval: default_reaper_interval(PresenceConfig::DEFAULT_TTL),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "metaverse-presence".to_string()
}

fn default_ttl_secs() -> u64 {
    30
}

fn default_reaper_interval(ttl: Duration) -> Duration {
    (ttl / 2).max(Duration::from_millis(1)).min(ttl)
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed or out of range
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed or out of range
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match lookup("APP_ENV") {
            Some(raw) => Environment::parse(&raw)
                .ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
            None => Environment::default(),
        };

        let log_format = match lookup("LOG_FORMAT").map(|s| s.to_lowercase()) {
            Some(raw) if raw == "json" => Some(LogFormat::Json),
            Some(raw) if raw == "pretty" => Some(LogFormat::Pretty),
            Some(raw) => return Err(ConfigError::InvalidValue("LOG_FORMAT", raw)),
            None => None,
        };

        let session_ttl = Duration::from_secs(
            parse_secs(&lookup, "PRESENCE_SESSION_TTL_SECS")?.unwrap_or_else(default_ttl_secs),
        );

        let presence = match parse_secs(&lookup, "PRESENCE_REAPER_INTERVAL_SECS")? {
            Some(interval) => PresenceConfig::new(session_ttl, Duration::from_secs(interval))?,
            None => PresenceConfig::with_ttl(session_ttl)?,
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env,
                log_format,
            },
            presence,
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue(key, raw))
        })
        .transpose()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
