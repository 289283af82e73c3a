//! Configuration loading
//!
//! Settings come from a `.env` file plus the process environment. The key for
//! the selected LLM provider is required; everything else has a default.

use crate::agent::DEFAULT_MAX_TOOL_ROUNDS;
use crate::error::{details, AgentError, FinancialAgentError};
use crate::logging::LoggingConfig;
use crate::Result;
use serde_json::json;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

pub const PHIDATA_API_KEY: &str = "PHIDATA_API_KEY";
pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

const PLACEHOLDER_MARKER: &str = "your_";

const DEFAULT_YFINANCE_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_YFINANCE_COOKIE_URL: &str = "https://fc.yahoo.com";
const DEFAULT_DUCKDUCKGO_BASE_URL: &str = "https://api.duckduckgo.com";
const DEFAULT_DUCKDUCKGO_NEWS_BASE_URL: &str = "https://duckduckgo.com";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_PLAYGROUND_PORT: u16 = 7777;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Groq,
    OpenAi,
    Ollama,
}

impl LlmProvider {
    /// Environment variable holding this provider's key, if it needs one
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Groq => Some(GROQ_API_KEY),
            LlmProvider::OpenAi => Some(OPENAI_API_KEY),
            LlmProvider::Ollama => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "llama-3.3-70b-versatile",
            LlmProvider::OpenAi => "gpt-4o",
            LlmProvider::Ollama => "llama3.2",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "groq" => Ok(LlmProvider::Groq),
            "openai" => Ok(LlmProvider::OpenAi),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(AgentError::Config(format!(
                "Unknown LLM_PROVIDER '{}' (expected groq, openai or ollama)",
                other
            ))),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LlmProvider::Groq => "groq",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Ollama => "ollama",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone)]
pub struct Config {
    pub provider: LlmProvider,
    pub model: String,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub ollama_host: String,
    pub openai_api_key: Option<String>,
    pub phidata_api_key: Option<String>,
    pub yfinance_base_url: String,
    pub yfinance_cookie_url: String,
    pub duckduckgo_base_url: String,
    pub duckduckgo_news_base_url: String,
    pub playground_host: String,
    pub playground_port: u16,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub request_timeout: Duration,
    pub max_tool_rounds: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("phidata_api_key", &redact(&self.phidata_api_key))
            .field("yfinance_base_url", &self.yfinance_base_url)
            .field("yfinance_cookie_url", &self.yfinance_cookie_url)
            .field("duckduckgo_base_url", &self.duckduckgo_base_url)
            .field("duckduckgo_news_base_url", &self.duckduckgo_news_base_url)
            .field("playground_host", &self.playground_host)
            .field("playground_port", &self.playground_port)
            .field("log_level", &self.log_level)
            .field("log_file", &self.log_file)
            .field("request_timeout", &self.request_timeout)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

/// A key value is usable when it is set, non-blank and not a template placeholder
pub fn is_valid_key_value(value: &str) -> bool {
    !value.trim().is_empty() && !value.to_lowercase().contains(PLACEHOLDER_MARKER)
}

fn valid_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| is_valid_key_value(v))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: FromStr>(names: &[&str], default: T) -> Result<T> {
    for name in names {
        if let Ok(raw) = env::var(name) {
            if raw.trim().is_empty() {
                continue;
            }
            return raw.trim().parse().map_err(|_| {
                AgentError::Config(format!("{} has an invalid value: '{}'", name, raw))
            });
        }
    }
    Ok(default)
}

/// Fetch a single API key, rejecting blanks and placeholders
pub fn get_api_key(key_name: &str) -> Result<String> {
    valid_env(key_name).ok_or_else(|| {
        FinancialAgentError::configuration(
            format!("API key '{}' is not set or is invalid", key_name),
            details([
                ("key_name", json!(key_name)),
                (
                    "note",
                    json!("Please check your .env file and ensure it contains a valid value"),
                ),
            ]),
        )
        .into()
    })
}

/// Load `.env` from `env_path` and build the configuration
pub fn load_config(env_path: &Path) -> Result<Config> {
    if !env_path.exists() {
        error!("Configuration file '{}' not found", env_path.display());
        return Err(FinancialAgentError::configuration(
            format!(
                "Configuration file '{}' not found. \
                 Please create a .env file in the project root directory. \
                 You can use .env.example as a template.",
                env_path.display()
            ),
            details([
                (
                    "steps",
                    json!([
                        "Copy .env.example to .env",
                        "Replace placeholder values with your actual API keys"
                    ]),
                ),
                ("required_keys", json!([GROQ_API_KEY])),
            ]),
        )
        .into());
    }

    info!("Loading configuration from {}", env_path.display());
    read_env_file(env_path)?;
    Config::from_env()
}

/// Like [`load_config`], but a missing `.env` leaves the process environment as is.
/// Keys are not checked; the playground does that in [`validate_api_keys`].
pub fn load_playground_config(env_path: &Path) -> Result<Config> {
    if env_path.exists() {
        info!("Loading configuration from {}", env_path.display());
        read_env_file(env_path)?;
    } else {
        info!("No {} found, using process environment", env_path.display());
    }
    Config::read_env()
}

fn read_env_file(env_path: &Path) -> Result<()> {
    dotenv::from_path(env_path)
        .map_err(|e| AgentError::Config(format!("Failed to read {}: {}", env_path.display(), e)))
}

fn missing_keys(required: &[&'static str]) -> Vec<&'static str> {
    required
        .iter()
        .copied()
        .filter(|k| get_api_key(k).is_err())
        .collect()
}

impl Config {
    /// Build from the current process environment; the provider key must be usable
    pub fn from_env() -> Result<Self> {
        let provider: LlmProvider = env::var("LLM_PROVIDER").unwrap_or_default().parse()?;

        let required: Vec<&str> = provider.api_key_var().into_iter().collect();
        let missing = missing_keys(&required);

        if !missing.is_empty() {
            error!("Missing required API keys: {}", missing.join(", "));
            return Err(FinancialAgentError::configuration(
                format!("Missing or invalid required API keys: {}", missing.join(", ")),
                details([
                    ("missing_keys", json!(missing)),
                    ("required_keys", json!(required)),
                    (
                        "note",
                        json!("Make sure to replace placeholder values with your actual API keys"),
                    ),
                ]),
            )
            .into());
        }

        Self::read_env()
    }

    /// Read every setting from the process environment without enforcing keys
    pub fn read_env() -> Result<Self> {
        let provider: LlmProvider = env::var("LLM_PROVIDER").unwrap_or_default().parse()?;
        let llm_api_key = provider.api_key_var().and_then(|k| get_api_key(k).ok());

        let optional = |name: &str| {
            let value = valid_env(name);
            if value.is_some() {
                info!("Optional key {} loaded", name);
            } else {
                info!("Optional key {} not configured (skipping)", name);
            }
            value
        };
        let openai_api_key = optional(OPENAI_API_KEY);
        let phidata_api_key = optional(PHIDATA_API_KEY);

        let log_file = match env::var("LOG_FILE") {
            Ok(v) if v.trim().is_empty() || v.eq_ignore_ascii_case("none") => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => Some(PathBuf::from("financial_agent.log")),
        };

        let config = Config {
            provider,
            model: env_or("LLM_MODEL", provider.default_model()),
            llm_base_url: env::var("LLM_BASE_URL").ok().filter(|v| !v.trim().is_empty()),
            llm_api_key,
            ollama_host: env_or("OLLAMA_HOST", DEFAULT_OLLAMA_HOST),
            openai_api_key,
            phidata_api_key,
            yfinance_base_url: env_or("YFINANCE_BASE_URL", DEFAULT_YFINANCE_BASE_URL),
            yfinance_cookie_url: env_or("YFINANCE_COOKIE_URL", DEFAULT_YFINANCE_COOKIE_URL),
            duckduckgo_base_url: env_or("DUCKDUCKGO_BASE_URL", DEFAULT_DUCKDUCKGO_BASE_URL),
            duckduckgo_news_base_url: env_or(
                "DUCKDUCKGO_NEWS_BASE_URL",
                DEFAULT_DUCKDUCKGO_NEWS_BASE_URL,
            ),
            playground_host: env_or("PLAYGROUND_HOST", "0.0.0.0"),
            playground_port: parse_env(&["PLAYGROUND_PORT", "PORT"], DEFAULT_PLAYGROUND_PORT)?,
            log_level: env_or("LOG_LEVEL", "INFO"),
            log_file,
            request_timeout: Duration::from_secs(parse_env(
                &["REQUEST_TIMEOUT_SECS"],
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            max_tool_rounds: parse_env(&["AGENT_MAX_TOOL_ROUNDS"], DEFAULT_MAX_TOOL_ROUNDS)?,
        };

        info!(provider = %config.provider, model = %config.model, "Configuration loaded successfully");
        Ok(config)
    }

    pub fn logging(&self, enable_console: bool) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            log_file: self.log_file.clone(),
            enable_console,
        }
    }
}

/// Startup check for the playground: every required key must be usable
pub fn validate_api_keys(config: &Config) -> Result<()> {
    let required: Vec<&str> = config.provider.api_key_var().into_iter().collect();
    let missing = missing_keys(&required);
    if missing.is_empty() {
        return Ok(());
    }

    error!("Missing required API keys: {}", missing.join(", "));
    Err(FinancialAgentError::configuration(
        "Missing required API keys for playground startup",
        details([
            ("missing_keys", json!(missing)),
            ("required_keys", json!(required)),
            (
                "steps",
                json!([
                    "Create a .env file in the project root (use .env.example as template)",
                    "Add your actual API keys (replace placeholder values)",
                    "Restart the server"
                ]),
            ),
        ]),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use std::io::Write;
    use std::sync::Mutex;

    // Tests below mutate process environment; serialize them.
    lazy_static::lazy_static! {
        static ref ENV_LOCK: Mutex<()> = Mutex::new(());
    }

    const MANAGED_VARS: &[&str] = &[
        "LLM_PROVIDER",
        GROQ_API_KEY,
        OPENAI_API_KEY,
        PHIDATA_API_KEY,
        "LLM_MODEL",
        "PLAYGROUND_PORT",
        "PORT",
        "LOG_FILE",
    ];

    fn clear_env() {
        for var in MANAGED_VARS {
            env::remove_var(var);
        }
    }

    fn classified(err: AgentError) -> FinancialAgentError {
        match err {
            AgentError::Classified(e) => e,
            other => panic!("expected classified error, got {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_valid_key_value("gsk_realvalue"));
        assert!(!is_valid_key_value(""));
        assert!(!is_valid_key_value("   "));
        assert!(!is_valid_key_value("your_groq_api_key_here"));
        assert!(!is_valid_key_value("YOUR_KEY"));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("".parse::<LlmProvider>().unwrap(), LlmProvider::Groq);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert!("bedrock".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_missing_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = classified(load_config(&dir.path().join(".env")).unwrap_err());
        assert_eq!(err.error_type, ErrorType::ConfigurationError);
        assert!(err.message.contains("not found"));
        assert!(err.details.contains_key("steps"));
    }

    #[test]
    fn test_missing_required_key() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var(GROQ_API_KEY, "your_groq_api_key");

        let err = classified(Config::from_env().unwrap_err());
        assert_eq!(err.error_type, ErrorType::ConfigurationError);
        assert_eq!(err.details["missing_keys"], json!([GROQ_API_KEY]));
        clear_env();
    }

    #[test]
    fn test_loads_from_env_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "GROQ_API_KEY=gsk_test_value").unwrap();
        writeln!(file, "OPENAI_API_KEY=your_openai_key").unwrap();
        writeln!(file, "PLAYGROUND_PORT=8123").unwrap();
        writeln!(file, "LOG_FILE=none").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.provider, LlmProvider::Groq);
        assert_eq!(config.model, "llama-3.3-70b-versatile");
        assert_eq!(config.llm_api_key.as_deref(), Some("gsk_test_value"));
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.playground_port, 8123);
        assert!(config.log_file.is_none());
        assert!(validate_api_keys(&config).is_ok());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("gsk_test_value"));
        clear_env();
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("LLM_PROVIDER", "ollama");

        let config = Config::from_env().unwrap();
        assert_eq!(config.provider, LlmProvider::Ollama);
        assert!(config.llm_api_key.is_none());
        assert!(validate_api_keys(&config).is_ok());
        clear_env();
    }

    #[test]
    fn test_get_api_key() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var(PHIDATA_API_KEY, "phi-live");
        assert_eq!(get_api_key(PHIDATA_API_KEY).unwrap(), "phi-live");

        env::remove_var(PHIDATA_API_KEY);
        let err = classified(get_api_key(PHIDATA_API_KEY).unwrap_err());
        assert_eq!(err.details["key_name"], json!(PHIDATA_API_KEY));
    }

    #[test]
    fn test_playground_config_without_env_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var(GROQ_API_KEY, "gsk_from_process_env");

        let dir = tempfile::tempdir().unwrap();
        let config = load_playground_config(&dir.path().join(".env")).unwrap();
        assert_eq!(config.llm_api_key.as_deref(), Some("gsk_from_process_env"));
        assert!(validate_api_keys(&config).is_ok());
        clear_env();
    }

    #[test]
    fn test_playground_rejects_missing_key() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var(GROQ_API_KEY, "your_groq_api_key_here");

        let dir = tempfile::tempdir().unwrap();
        let config = load_playground_config(&dir.path().join(".env")).unwrap();
        assert!(config.llm_api_key.is_none());

        let err = classified(validate_api_keys(&config).unwrap_err());
        assert_eq!(err.error_type, ErrorType::ConfigurationError);
        assert_eq!(err.message, "Missing required API keys for playground startup");
        assert_eq!(err.details["missing_keys"], json!([GROQ_API_KEY]));
        assert_eq!(err.details["steps"].as_array().map(Vec::len), Some(3));
        clear_env();
    }

    #[test]
    fn test_invalid_port() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("LLM_PROVIDER", "ollama");
        env::set_var("PLAYGROUND_PORT", "not-a-port");
        assert!(matches!(Config::from_env(), Err(AgentError::Config(_))));
        clear_env();
    }
}
