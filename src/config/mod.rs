//! Configuration loading for the incident monitor.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `INCIDENT_MONITOR_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "INCIDENT_MONITOR_";

/// Application configuration derived from `INCIDENT_MONITOR_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// Base URL of the remote incident API
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Optional API key seeded into the secret store at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    /// Directory holding named sound assets
    #[serde(default = "default_sounds_dir")]
    pub sounds_dir: PathBuf,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Polling and reconciliation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerConfig {
    /// Interval between reconciliation cycles (default: 3)
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Window used for on-demand resolved-incident fetches (default: 7 days)
    #[serde(default = "default_resolved_window_hours")]
    pub resolved_window_hours: u64,
    /// Window used for the per-cycle "recently resolved" fetch (default: 24 hours)
    #[serde(default = "default_recently_resolved_hours")]
    pub recently_resolved_hours: u64,
    /// Sidebar rows for incidents not updated within this window are purged (default: 7 days)
    #[serde(default = "default_sidebar_retention_hours")]
    pub sidebar_retention_hours: u64,
    /// How often the polling loop runs the sidebar retention sweep (default: 3600)
    #[serde(default = "default_sidebar_sweep_interval_seconds")]
    pub sidebar_sweep_interval_seconds: u64,
}

/// Parameters of one rate-limited notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RateLimitConfig {
    pub burst_window_ms: u64,
    pub burst_limit: u32,
}

impl RateLimitConfig {
    pub fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }

    /// Validate limiter bounds; `channel` names the limiter in the error.
    pub fn validate(&self, channel: &'static str) -> Result<(), ConfigError> {
        if self.burst_window_ms == 0 {
            return Err(ConfigError::InvalidRateLimit {
                channel,
                reason: "burst window must be positive".to_string(),
            });
        }
        if self.burst_limit == 0 {
            return Err(ConfigError::InvalidRateLimit {
                channel,
                reason: "burst limit must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Notification dispatcher parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NotificationConfig {
    #[serde(default = "default_sound_queue_capacity")]
    pub sound_queue_capacity: usize,
    #[serde(default = "default_redirect_queue_capacity")]
    pub redirect_queue_capacity: usize,
    #[serde(default = "default_sound_rate_limit")]
    pub sound_rate_limit: RateLimitConfig,
    #[serde(default = "default_redirect_rate_limit")]
    pub redirect_rate_limit: RateLimitConfig,
    /// A redirected incident is not redirected again within this window (default: 300)
    #[serde(default = "default_redirect_cooldown_seconds")]
    pub redirect_cooldown_seconds: u64,
    /// Memo entries older than this are purged (default: 1800)
    #[serde(default = "default_memo_horizon_seconds")]
    pub memo_horizon_seconds: u64,
    #[serde(default = "default_memo_sweep_interval_seconds")]
    pub memo_sweep_interval_seconds: u64,
    /// Upper bound on a manual sound test (default: 5)
    #[serde(default = "default_test_sound_timeout_seconds")]
    pub test_sound_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            api_base: default_api_base(),
            api_key: None,
            http_timeout_seconds: default_http_timeout_seconds(),
            sounds_dir: default_sounds_dir(),
            scheduler: SchedulerConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            resolved_window_hours: default_resolved_window_hours(),
            recently_resolved_hours: default_recently_resolved_hours(),
            sidebar_retention_hours: default_sidebar_retention_hours(),
            sidebar_sweep_interval_seconds: default_sidebar_sweep_interval_seconds(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sound_queue_capacity: default_sound_queue_capacity(),
            redirect_queue_capacity: default_redirect_queue_capacity(),
            sound_rate_limit: default_sound_rate_limit(),
            redirect_rate_limit: default_redirect_rate_limit(),
            redirect_cooldown_seconds: default_redirect_cooldown_seconds(),
            memo_horizon_seconds: default_memo_horizon_seconds(),
            memo_sweep_interval_seconds: default_memo_sweep_interval_seconds(),
            test_sound_timeout_seconds: default_test_sound_timeout_seconds(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn resolved_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.resolved_window_hours as i64)
    }

    pub fn recently_resolved_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recently_resolved_hours as i64)
    }

    pub fn sidebar_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.sidebar_retention_hours as i64)
    }

    pub fn sidebar_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sidebar_sweep_interval_seconds)
    }

    /// Validate scheduler configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_seconds == 0 || self.poll_interval_seconds > 300 {
            return Err(ConfigError::InvalidPollInterval {
                value: self.poll_interval_seconds,
            });
        }

        if self.recently_resolved_hours == 0
            || self.recently_resolved_hours > self.resolved_window_hours
        {
            return Err(ConfigError::InvalidResolvedWindow {
                recent: self.recently_resolved_hours,
                full: self.resolved_window_hours,
            });
        }

        if self.sidebar_retention_hours == 0 {
            return Err(ConfigError::InvalidSidebarRetention {
                value: self.sidebar_retention_hours,
            });
        }

        if self.sidebar_sweep_interval_seconds < 60 {
            return Err(ConfigError::InvalidSidebarSweepInterval {
                value: self.sidebar_sweep_interval_seconds,
            });
        }

        Ok(())
    }
}

impl NotificationConfig {
    pub fn redirect_cooldown(&self) -> Duration {
        Duration::from_secs(self.redirect_cooldown_seconds)
    }

    pub fn memo_horizon(&self) -> Duration {
        Duration::from_secs(self.memo_horizon_seconds)
    }

    pub fn memo_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.memo_sweep_interval_seconds)
    }

    pub fn test_sound_timeout(&self) -> Duration {
        Duration::from_secs(self.test_sound_timeout_seconds)
    }

    /// Validate notification configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sound_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                queue: "sound",
                value: self.sound_queue_capacity,
            });
        }
        if self.redirect_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                queue: "redirect",
                value: self.redirect_queue_capacity,
            });
        }

        self.sound_rate_limit.validate("sound")?;
        self.redirect_rate_limit.validate("redirect")?;

        if self.memo_horizon_seconds < self.redirect_cooldown_seconds {
            return Err(ConfigError::InvalidMemoWindow {
                cooldown: self.redirect_cooldown_seconds,
                horizon: self.memo_horizon_seconds,
            });
        }

        if self.memo_sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidMemoSweepInterval {
                value: self.memo_sweep_interval_seconds,
            });
        }

        if self.test_sound_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTestSoundTimeout {
                value: self.test_sound_timeout_seconds,
            });
        }

        Ok(())
    }
}

impl AppConfig {
    /// Parses the configured bind address into a `SocketAddr`.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Returns a JSON representation with secrets redacted.
    pub fn redacted_json(&self) -> Result<String, serde_json::Error> {
        let mut clone = self.clone();
        if clone.api_key.is_some() {
            clone.api_key = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&clone)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        if let Err(source) = url::Url::parse(&self.api_base) {
            return Err(ConfigError::InvalidApiBase {
                value: self.api_base.clone(),
                source,
            });
        }

        if self.http_timeout_seconds == 0 {
            return Err(ConfigError::InvalidHttpTimeout {
                value: self.http_timeout_seconds,
            });
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        self.scheduler.validate()?;
        self.notifications.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://incident-monitor.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    4
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_api_base() -> String {
    "https://api.pagerduty.com".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_sounds_dir() -> PathBuf {
    PathBuf::from("sounds")
}

fn default_poll_interval_seconds() -> u64 {
    3
}

fn default_resolved_window_hours() -> u64 {
    24 * 7
}

fn default_recently_resolved_hours() -> u64 {
    24
}

fn default_sidebar_retention_hours() -> u64 {
    24 * 7
}

fn default_sidebar_sweep_interval_seconds() -> u64 {
    3600 // 1 hour
}

fn default_sound_queue_capacity() -> usize {
    10
}

fn default_redirect_queue_capacity() -> usize {
    10
}

fn default_sound_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        burst_window_ms: 30_000,
        burst_limit: 5,
    }
}

fn default_redirect_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        burst_window_ms: 60_000,
        burst_limit: 5,
    }
}

fn default_redirect_cooldown_seconds() -> u64 {
    300 // 5 minutes
}

fn default_memo_horizon_seconds() -> u64 {
    1800 // 30 minutes
}

fn default_memo_sweep_interval_seconds() -> u64 {
    300
}

fn default_test_sound_timeout_seconds() -> u64 {
    5
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("database url is empty; set INCIDENT_MONITOR_DATABASE_URL")]
    MissingDatabaseUrl,
    #[error("invalid remote api base '{value}': {source}")]
    InvalidApiBase {
        value: String,
        source: url::ParseError,
    },
    #[error("http timeout must be positive, got {value}")]
    InvalidHttpTimeout { value: u64 },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("poll interval must be between 1 and 300 seconds, got {value}")]
    InvalidPollInterval { value: u64 },
    #[error(
        "recently-resolved window ({recent}h) must be positive and not exceed the resolved window ({full}h)"
    )]
    InvalidResolvedWindow { recent: u64, full: u64 },
    #[error("sidebar retention must be positive, got {value}")]
    InvalidSidebarRetention { value: u64 },
    #[error("sidebar sweep interval must be at least 60 seconds, got {value}")]
    InvalidSidebarSweepInterval { value: u64 },
    #[error("{queue} queue capacity must be positive, got {value}")]
    InvalidQueueCapacity { queue: &'static str, value: usize },
    #[error("invalid {channel} rate limit: {reason}")]
    InvalidRateLimit {
        channel: &'static str,
        reason: String,
    },
    #[error("memo horizon ({horizon}s) must not be shorter than the redirect cooldown ({cooldown}s)")]
    InvalidMemoWindow { cooldown: u64, horizon: u64 },
    #[error("memo sweep interval must be positive, got {value}")]
    InvalidMemoSweepInterval { value: u64 },
    #[error("test sound timeout must be positive, got {value}")]
    InvalidTestSoundTimeout { value: u64 },
}

/// Loads configuration using layered `.env` files and `INCIDENT_MONITOR_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`, then
    /// the process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);

        let api_bind_addr = take_string(&mut layered, "API_BIND_ADDR", default_api_bind_addr);
        let log_level = take_string(&mut layered, "LOG_LEVEL", default_log_level);
        let log_format = take_string(&mut layered, "LOG_FORMAT", default_log_format);
        let database_url = take_string(&mut layered, "DATABASE_URL", default_database_url);
        let api_base = take_string(&mut layered, "API_BASE", default_api_base);

        let api_key = layered.remove("API_KEY").and_then(|val| {
            let trimmed = val.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });

        let sounds_dir = layered
            .remove("SOUNDS_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_sounds_dir);

        let db_max_connections =
            take_parsed(&mut layered, "DB_MAX_CONNECTIONS", default_db_max_connections)?;
        let db_acquire_timeout_ms = take_parsed(
            &mut layered,
            "DB_ACQUIRE_TIMEOUT_MS",
            default_db_acquire_timeout_ms,
        )?;
        let http_timeout_seconds = take_parsed(
            &mut layered,
            "HTTP_TIMEOUT_SECONDS",
            default_http_timeout_seconds,
        )?;

        let scheduler = SchedulerConfig {
            poll_interval_seconds: take_parsed(
                &mut layered,
                "POLL_INTERVAL_SECONDS",
                default_poll_interval_seconds,
            )?,
            resolved_window_hours: take_parsed(
                &mut layered,
                "RESOLVED_WINDOW_HOURS",
                default_resolved_window_hours,
            )?,
            recently_resolved_hours: take_parsed(
                &mut layered,
                "RECENTLY_RESOLVED_HOURS",
                default_recently_resolved_hours,
            )?,
            sidebar_retention_hours: take_parsed(
                &mut layered,
                "SIDEBAR_RETENTION_HOURS",
                default_sidebar_retention_hours,
            )?,
            sidebar_sweep_interval_seconds: take_parsed(
                &mut layered,
                "SIDEBAR_SWEEP_INTERVAL_SECONDS",
                default_sidebar_sweep_interval_seconds,
            )?,
        };

        let sound_defaults = default_sound_rate_limit();
        let redirect_defaults = default_redirect_rate_limit();

        let notifications = NotificationConfig {
            sound_queue_capacity: take_parsed(
                &mut layered,
                "SOUND_QUEUE_CAPACITY",
                default_sound_queue_capacity,
            )?,
            redirect_queue_capacity: take_parsed(
                &mut layered,
                "REDIRECT_QUEUE_CAPACITY",
                default_redirect_queue_capacity,
            )?,
            sound_rate_limit: RateLimitConfig {
                burst_window_ms: take_parsed(&mut layered, "SOUND_BURST_WINDOW_MS", || {
                    sound_defaults.burst_window_ms
                })?,
                burst_limit: take_parsed(&mut layered, "SOUND_BURST_LIMIT", || {
                    sound_defaults.burst_limit
                })?,
            },
            redirect_rate_limit: RateLimitConfig {
                burst_window_ms: take_parsed(&mut layered, "REDIRECT_BURST_WINDOW_MS", || {
                    redirect_defaults.burst_window_ms
                })?,
                burst_limit: take_parsed(&mut layered, "REDIRECT_BURST_LIMIT", || {
                    redirect_defaults.burst_limit
                })?,
            },
            redirect_cooldown_seconds: take_parsed(
                &mut layered,
                "REDIRECT_COOLDOWN_SECONDS",
                default_redirect_cooldown_seconds,
            )?,
            memo_horizon_seconds: take_parsed(
                &mut layered,
                "MEMO_HORIZON_SECONDS",
                default_memo_horizon_seconds,
            )?,
            memo_sweep_interval_seconds: take_parsed(
                &mut layered,
                "MEMO_SWEEP_INTERVAL_SECONDS",
                default_memo_sweep_interval_seconds,
            )?,
            test_sound_timeout_seconds: take_parsed(
                &mut layered,
                "TEST_SOUND_TIMEOUT_SECONDS",
                default_test_sound_timeout_seconds,
            )?,
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            api_base,
            api_key,
            http_timeout_seconds,
            sounds_dir,
            scheduler,
            notifications,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{}PROFILE", ENV_PREFIX))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: fn() -> String,
) -> String {
    layered
        .remove(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(default)
}

/// Numeric settings fail loudly instead of silently falling back when malformed.
fn take_parsed<T, F>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: F,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: FnOnce() -> T,
{
    match layered.remove(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: format!("{}{}", ENV_PREFIX, key),
            value: raw,
        }),
        None => Ok(default()),
    }
}
