/// Service configuration loader - parses solmon.toml and the environment.
///
/// Tunables live in an optional TOML file (`solmon.toml` in the working
/// directory, or the path in `SOLMON_CONFIG`); every key has a default so a
/// missing file means "all defaults". Secrets never go in the file: they
/// come from the environment, with a `.env` file honoured via dotenv.
///
/// ```toml
/// state_dir = "/var/lib/solmon"
///
/// [api]
/// request_timeout_secs = 60
///
/// [schedule]
/// update_hour = 23
/// update_minute = 50
///
/// [quota]
/// daily_call_limit = 280
///
/// [retry]
/// retry_delay_secs = 60
/// pacing_delay_secs = 1
/// # max_attempts = 5    # unset: retry forever
/// ```

use crate::daemon::DaemonConfig;
use crate::ingest::monitoring_api::DEFAULT_API_BASE_URL;
use crate::ingest::playback::{DEFAULT_WEB_BASE_URL, WebCredentials};
use crate::quota::DEFAULT_DAILY_CALL_LIMIT;
use crate::retry::RetryPolicy;
use chrono::NaiveTime;
use serde::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "solmon.toml";

pub const ENV_CONFIG: &str = "SOLMON_CONFIG";
pub const ENV_API_KEY: &str = "SOLMON_API_KEY";
pub const ENV_SITE_USERNAME: &str = "SOLMON_SITE_USERNAME";
pub const ENV_SITE_PASSWORD: &str = "SOLMON_SITE_PASSWORD";
pub const ENV_STATE_DIR: &str = "SOLMON_STATE_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("{0} is not set")]
    MissingEnv(&'static str),
    #[error("no state directory: set state_dir, SOLMON_STATE_DIR or HOME")]
    NoStateDir,
}

// ---------------------------------------------------------------------------
// File configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default = "default_web_base_url")]
    pub web_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default = "default_update_hour")]
    pub update_hour: u32,
    #[serde(default = "default_update_minute")]
    pub update_minute: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_call_limit")]
    pub daily_call_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_pacing_delay_secs")]
    pub pacing_delay_secs: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_web_base_url() -> String {
    DEFAULT_WEB_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_update_hour() -> u32 {
    23
}

fn default_update_minute() -> u32 {
    50
}

fn default_daily_call_limit() -> u32 {
    DEFAULT_DAILY_CALL_LIMIT
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_pacing_delay_secs() -> u64 {
    1
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            web_base_url: default_web_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_hour: default_update_hour(),
            update_minute: default_update_minute(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_call_limit: default_daily_call_limit(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            pacing_delay_secs: default_pacing_delay_secs(),
            max_attempts: None,
        }
    }
}

impl AppConfig {
    /// Loads `$SOLMON_CONFIG`, else `solmon.toml`. Only the default file may
    /// be absent; an explicitly named file must exist.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var_os(ENV_CONFIG) {
            Some(path) => Self::load_from_path(Path::new(&path)),
            None => match fs::read_to_string(DEFAULT_CONFIG_FILE) {
                Ok(contents) => Self::load_from_str(&contents),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
                Err(source) => Err(ConfigError::Read { path: DEFAULT_CONFIG_FILE.to_string(), source }),
            },
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&contents)
    }

    /// Parse and validate config from a string.
    pub fn load_from_str(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.quota.daily_call_limit == 0 {
            return Err(ConfigError::Invalid("quota.daily_call_limit must be > 0".to_string()));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.request_timeout_secs must be > 0".to_string()));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0 when set".to_string()));
        }
        self.cutoff()?;
        Ok(())
    }

    /// Local time of the daily update cycle.
    pub fn cutoff(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::from_hms_opt(self.schedule.update_hour, self.schedule.update_minute, 0).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "schedule {:02}:{:02} is not a time of day",
                self.schedule.update_hour, self.schedule.update_minute
            ))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_delay: Duration::from_secs(self.retry.retry_delay_secs),
            pacing_delay: Duration::from_secs(self.retry.pacing_delay_secs),
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn daemon_config(&self) -> Result<DaemonConfig, ConfigError> {
        Ok(DaemonConfig {
            cutoff: self.cutoff()?,
            retry: self.retry_policy(),
        })
    }

    /// Directory holding the cached installation, checkpoints and cookies.
    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        resolve_state_dir(self.state_dir.as_deref(), |key| env::var(key).ok())
    }
}

fn resolve_state_dir(configured: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = configured {
        return Ok(dir.to_path_buf());
    }
    [ENV_STATE_DIR, "HOME"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .find(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .ok_or(ConfigError::NoStateDir)
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub api_key: String,
    /// Website login, needed only for panel playback.
    pub web: Option<WebCredentials>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("web", &self.web.as_ref().map(|w| &w.username))
            .finish()
    }
}

impl Credentials {
    /// Reads secrets from the environment (after loading `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup(ENV_API_KEY)
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(ENV_API_KEY))?;
        let web = match (lookup(ENV_SITE_USERNAME), lookup(ENV_SITE_PASSWORD)) {
            (Some(username), Some(password)) if !username.is_empty() => Some(WebCredentials { username, password }),
            _ => None,
        };
        Ok(Self { api_key, web })
    }
}
