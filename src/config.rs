/// Configuration loading
///
/// Settings come from the process environment, optionally populated from a
/// `.env` file. Every section is parsed through a lookup function so the
/// parsing rules can be exercised without touching the real environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_NWS_API_BASE: &str = "https://api.weather.gov";
pub const DEFAULT_USER_AGENT: &str = "weather-app/1.0";

/// Errors raised while reading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Load `.env` files into the process environment
///
/// The working directory wins; the per-user file under the platform config
/// directory only fills in what is still unset. Returns the files loaded.
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut loaded = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }

    if let Some(mut user_env) = dirs::config_dir() {
        user_env.push("mcp-labs");
        user_env.push(".env");
        if user_env.is_file() && dotenvy::from_path(&user_env).is_ok() {
            loaded.push(user_env);
        }
    }

    for path in &loaded {
        tracing::debug!("Loaded environment from {}", path.display());
    }
    loaded
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match non_empty(value) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Language model connection settings
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl ModelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key =
            non_empty(lookup("ANTHROPIC_API_KEY")).ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;

        Ok(Self {
            api_key,
            model: non_empty(lookup("ANTHROPIC_MODEL")).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_empty(lookup("ANTHROPIC_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Limits applied to every user turn
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Maximum model round-trips per turn
    pub max_rounds: usize,
    /// Token budget for each model response
    pub max_tokens: u32,
    /// Optional deadline for each model call and each tool call
    pub round_timeout: Option<Duration>,
    /// Optional system instruction seeded into new histories
    pub system_prompt: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            max_tokens: 1000,
            round_timeout: None,
            system_prompt: None,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_rounds = parse_number::<usize>("MCP_MAX_ROUNDS", lookup("MCP_MAX_ROUNDS"))?
            .unwrap_or(defaults.max_rounds);
        if max_rounds == 0 {
            return Err(ConfigError::Invalid {
                key: "MCP_MAX_ROUNDS",
                value: "0".to_string(),
                reason: "at least one round is required".to_string(),
            });
        }

        let max_tokens = parse_number::<u32>("MCP_MAX_TOKENS", lookup("MCP_MAX_TOKENS"))?
            .unwrap_or(defaults.max_tokens);
        let round_timeout =
            parse_number::<u64>("MCP_ROUND_TIMEOUT_SECS", lookup("MCP_ROUND_TIMEOUT_SECS"))?
                .map(Duration::from_secs);

        Ok(Self {
            max_rounds,
            max_tokens,
            round_timeout,
            system_prompt: non_empty(lookup("MCP_SYSTEM_PROMPT")),
        })
    }
}

/// Weather server settings
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_base: String,
    pub user_agent: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_NWS_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl WeatherConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_base: non_empty(lookup("NWS_API_BASE"))
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            user_agent: non_empty(lookup("NWS_USER_AGENT")).unwrap_or(defaults.user_agent),
        }
    }
}

/// SQL server settings
#[derive(Debug, Clone)]
pub struct SqlConfig {
    pub database: PathBuf,
}

impl SqlConfig {
    /// Resolve the database path, preferring an explicit path over the environment
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::from_lookup(explicit, env_lookup)
    }

    pub fn from_lookup(
        explicit: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let database = explicit
            .or_else(|| non_empty(lookup("MCP_SQLITE_DATABASE")).map(PathBuf::from))
            .ok_or(ConfigError::Missing("MCP_SQLITE_DATABASE"))?;
        Ok(Self { database })
    }
}
