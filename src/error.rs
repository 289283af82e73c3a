//! Error types and error classification for the financial agent system
//!
//! Internal failures travel as [`AgentError`]. At the agent boundary they are
//! classified into a [`FinancialAgentError`], which carries a user-facing
//! message, one of six [`ErrorType`]s and a free-form details map.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Free-form error context
pub type Details = Map<String, Value>;

//
// ================= Taxonomy =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ConfigurationError,
    AgentExecutionError,
    ApiError,
    ValidationError,
    NetworkError,
    UnknownError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ConfigurationError => "configuration_error",
            ErrorType::AgentExecutionError => "agent_execution_error",
            ErrorType::ApiError => "api_error",
            ErrorType::ValidationError => "validation_error",
            ErrorType::NetworkError => "network_error",
            ErrorType::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, user-presentable error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct FinancialAgentError {
    pub message: String,
    pub error_type: ErrorType,
    pub details: Details,
}

/// Dictionary form of a classified error (CLI output and HTTP bodies)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: ErrorType,
    pub details: Details,
}

impl FinancialAgentError {
    pub fn new(message: impl Into<String>, error_type: ErrorType, details: Details) -> Self {
        Self {
            message: message.into(),
            error_type,
            details,
        }
    }

    pub fn configuration(message: impl Into<String>, details: Details) -> Self {
        Self::new(message, ErrorType::ConfigurationError, details)
    }

    pub fn agent_execution(message: impl Into<String>, details: Details) -> Self {
        Self::new(message, ErrorType::AgentExecutionError, details)
    }

    pub fn api(message: impl Into<String>, details: Details) -> Self {
        Self::new(message, ErrorType::ApiError, details)
    }

    pub fn validation(message: impl Into<String>, details: Details) -> Self {
        Self::new(message, ErrorType::ValidationError, details)
    }

    pub fn network(message: impl Into<String>, details: Details) -> Self {
        Self::new(message, ErrorType::NetworkError, details)
    }

    pub fn unknown(message: impl Into<String>, details: Details) -> Self {
        Self::new(message, ErrorType::UnknownError, details)
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.message.clone(),
            error_type: self.error_type,
            details: self.details.clone(),
        }
    }
}

//
// ================= Internal errors =================
//

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Exceeded {0} tool rounds without a final answer")]
    MaxIterations(u32),

    #[error(transparent)]
    Classified(#[from] FinancialAgentError),

    // =============================
    // External Library Conversions
    // =============================
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Variant name, reported as `exception_type` in error details
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "Config",
            AgentError::Llm(_) => "Llm",
            AgentError::Api { .. } => "Api",
            AgentError::Tool(_) => "Tool",
            AgentError::ToolNotFound(_) => "ToolNotFound",
            AgentError::InvalidToolInput(_) => "InvalidToolInput",
            AgentError::Validation(_) => "Validation",
            AgentError::MaxIterations(_) => "MaxIterations",
            AgentError::Classified(e) => match e.error_type {
                ErrorType::ConfigurationError => "ConfigurationError",
                ErrorType::AgentExecutionError => "AgentExecutionError",
                ErrorType::ApiError => "APIError",
                ErrorType::ValidationError => "ValidationError",
                ErrorType::NetworkError => "NetworkError",
                ErrorType::UnknownError => "FinancialAgentError",
            },
            AgentError::Http(_) => "Http",
            AgentError::Serialization(_) => "Serialization",
            AgentError::Io(_) => "Io",
        }
    }

    /// Classify a failure raised while an agent was running
    pub fn classify(&self, agent_name: &str) -> FinancialAgentError {
        match self {
            AgentError::Classified(e) => e.clone(),
            AgentError::Api { status, message } => {
                let mut err = handle_api_error(message, Some(*status));
                err.details.insert("exception_type".into(), json!(self.kind()));
                err
            }
            AgentError::Http(e) if is_network_failure(e) => {
                let text = format!("network failure: {}", error_chain(e));
                let mut err = handle_agent_execution_error(&text, agent_name);
                err.details.insert("exception_type".into(), json!(self.kind()));
                err
            }
            other => {
                let mut err = handle_agent_execution_error(&error_chain(other), agent_name);
                err.details
                    .insert("exception_type".into(), json!(other.kind()));
                err
            }
        }
    }
}

fn is_network_failure(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Render an error with its source chain, `outer: inner: root`
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

//
// ================= Classification =================
//

const TICKER_KEYWORDS: &[&str] = &["ticker", "symbol", "not found"];
const RATE_LIMIT_KEYWORDS: &[&str] = &["rate limit", "too many requests", "429"];
const NETWORK_KEYWORDS: &[&str] = &["connection", "timeout", "network"];

/// Map an agent failure message to a user-facing execution error.
///
/// Keyword groups are checked in order: ticker, rate limit, network.
pub fn handle_agent_execution_error(error_text: &str, agent_name: &str) -> FinancialAgentError {
    let lowered = error_text.to_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    let categorized = |message: &str, category: &str| {
        FinancialAgentError::agent_execution(
            message,
            details([
                ("agent", json!(agent_name)),
                ("error_category", json!(category)),
                ("original_error", json!(error_text)),
            ]),
        )
    };

    if has_any(TICKER_KEYWORDS) {
        return categorized(
            "Invalid ticker symbol. Please verify the ticker symbol and try again. \
             Ensure the ticker is spelled correctly and the company is publicly traded.",
            "invalid_ticker",
        );
    }

    if has_any(RATE_LIMIT_KEYWORDS) {
        return categorized(
            "API rate limit exceeded. Please wait a moment and try again. \
             If the issue persists, consider reducing query frequency.",
            "rate_limit",
        );
    }

    if has_any(NETWORK_KEYWORDS) {
        return categorized(
            "Network error occurred while processing your request. \
             Please check your internet connection and try again.",
            "network",
        );
    }

    FinancialAgentError::agent_execution(
        format!("{} execution failed: {}", agent_name, error_text),
        details([
            ("agent", json!(agent_name)),
            ("original_error", json!(error_text)),
        ]),
    )
}

/// Map an upstream API failure to a user-facing error by status code
pub fn handle_api_error(error_text: &str, status_code: Option<u16>) -> FinancialAgentError {
    let mut info = details([("original_error", json!(error_text))]);

    if let Some(code) = status_code {
        info.insert("status_code".into(), json!(code));
    }

    let message = match status_code {
        Some(400) => "Invalid request format. Please check your query and try again.".to_string(),
        Some(401) => "Authentication failed. Please check your API keys.".to_string(),
        Some(403) => "Access forbidden. Please verify your API key permissions.".to_string(),
        Some(404) => "Resource not found. Please check your request.".to_string(),
        Some(429) => "Rate limit exceeded. Please wait and try again.".to_string(),
        Some(500) => "Internal server error. Please try again later.".to_string(),
        Some(503) => "Service temporarily unavailable. Please try again later.".to_string(),
        _ => format!("API error occurred: {}", error_text),
    };

    FinancialAgentError::api(message, info)
}

/// Map a failure raised while loading configuration
pub fn handle_configuration_error(error: &AgentError) -> FinancialAgentError {
    match error {
        AgentError::Classified(e) => e.clone(),
        AgentError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            FinancialAgentError::configuration(
                "Configuration file not found. \
                 Please create a .env file with required API keys. \
                 Use .env.example as a template.",
                details([("original_error", json!(io.to_string()))]),
            )
        }
        AgentError::Validation(msg) => FinancialAgentError::configuration(
            msg.clone(),
            details([("original_error", json!(msg))]),
        ),
        other => FinancialAgentError::configuration(
            format!("Configuration error: {}", other),
            details([
                ("original_error", json!(other.to_string())),
                ("exception_type", json!(other.kind())),
            ]),
        ),
    }
}

/// Format any error into the standard response shape
pub fn format_error_response(error: &AgentError) -> ErrorResponse {
    if let AgentError::Classified(e) = error {
        return e.to_response();
    }

    let error_type = match error {
        AgentError::Io(_) | AgentError::Config(_) => ErrorType::ConfigurationError,
        AgentError::Validation(_) | AgentError::InvalidToolInput(_) => ErrorType::ValidationError,
        AgentError::Http(e) if is_network_failure(e) => ErrorType::NetworkError,
        _ => ErrorType::UnknownError,
    };

    ErrorResponse {
        error: error.to_string(),
        error_type,
        details: details([("exception_type", json!(error.kind()))]),
    }
}

/// Build a details map from literal pairs
pub fn details<const N: usize>(pairs: [(&str, Value); N]) -> Details {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(err: &FinancialAgentError) -> Option<&str> {
        err.details.get("error_category").and_then(Value::as_str)
    }

    #[test]
    fn test_ticker_errors() {
        let cases = [
            "No data found, symbol may be delisted",
            "Invalid TICKER supplied",
            "Quote Not Found for XYZ",
        ];

        for c in cases {
            let err = handle_agent_execution_error(c, "FinancialAgent");
            assert_eq!(err.error_type, ErrorType::AgentExecutionError);
            assert_eq!(category(&err), Some("invalid_ticker"), "case: {}", c);
            assert!(err.message.starts_with("Invalid ticker symbol."));
            assert_eq!(err.details["agent"], json!("FinancialAgent"));
            assert_eq!(err.details["original_error"], json!(c));
        }
    }

    #[test]
    fn test_rate_limit_errors() {
        for c in ["Rate limit reached", "Too Many Requests", "HTTP 429 from upstream"] {
            let err = handle_agent_execution_error(c, "Agent");
            assert_eq!(category(&err), Some("rate_limit"), "case: {}", c);
            assert!(err.message.starts_with("API rate limit exceeded."));
        }
    }

    #[test]
    fn test_network_errors() {
        for c in ["Connection refused", "operation TIMEOUT", "network unreachable"] {
            let err = handle_agent_execution_error(c, "Agent");
            assert_eq!(category(&err), Some("network"), "case: {}", c);
        }
    }

    #[test]
    fn test_keyword_priority() {
        let err = handle_agent_execution_error("symbol lookup failed with 429", "Agent");
        assert_eq!(category(&err), Some("invalid_ticker"));

        let err = handle_agent_execution_error("429: connection reset", "Agent");
        assert_eq!(category(&err), Some("rate_limit"));
    }

    #[test]
    fn test_generic_execution_error() {
        let err = handle_agent_execution_error("model returned garbage", "WebSearchAgent");
        assert_eq!(err.message, "WebSearchAgent execution failed: model returned garbage");
        assert!(category(&err).is_none());
    }

    #[test]
    fn test_api_status_codes() {
        let expected = [
            (400, "Invalid request format."),
            (401, "Authentication failed."),
            (403, "Access forbidden."),
            (404, "Resource not found."),
            (429, "Rate limit exceeded."),
            (500, "Internal server error."),
            (503, "Service temporarily unavailable."),
        ];

        for (code, prefix) in expected {
            let err = handle_api_error("boom", Some(code));
            assert_eq!(err.error_type, ErrorType::ApiError);
            assert!(err.message.starts_with(prefix), "code {}: {}", code, err.message);
            assert_eq!(err.details["status_code"], json!(code));
        }

        let err = handle_api_error("boom", Some(418));
        assert_eq!(err.message, "API error occurred: boom");

        let err = handle_api_error("boom", None);
        assert!(err.details.get("status_code").is_none());
        assert_eq!(err.details.keys().collect::<Vec<_>>(), vec!["original_error"]);
    }

    #[test]
    fn test_classify_routes_api_errors_by_status() {
        let err = AgentError::Api {
            status: 401,
            message: "invalid api key".into(),
        };
        let classified = err.classify("FinancialAgent");
        assert_eq!(classified.error_type, ErrorType::ApiError);
        assert!(classified.message.starts_with("Authentication failed."));
        assert_eq!(classified.details["exception_type"], json!("Api"));
    }

    #[test]
    fn test_classify_passes_classified_through() {
        let inner = FinancialAgentError::validation("Invalid ticker symbol: 'ZZZZ'", Details::new());
        let err = AgentError::from(inner.clone());
        assert_eq!(err.classify("FinancialAgent"), inner);
    }

    #[test]
    fn test_classify_records_exception_type() {
        let err = AgentError::Tool("something odd".into());
        let classified = err.classify("Agent");
        assert_eq!(classified.details["exception_type"], json!("Tool"));
    }

    #[test]
    fn test_format_error_response() {
        let io = AgentError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert_eq!(format_error_response(&io).error_type, ErrorType::ConfigurationError);

        let v = AgentError::Validation("bad".into());
        let resp = format_error_response(&v);
        assert_eq!(resp.error_type, ErrorType::ValidationError);
        assert_eq!(resp.details["exception_type"], json!("Validation"));

        let other = AgentError::Llm("weird".into());
        assert_eq!(format_error_response(&other).error_type, ErrorType::UnknownError);
    }

    #[test]
    fn test_configuration_error_mapping() {
        let io = AgentError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        let err = handle_configuration_error(&io);
        assert_eq!(err.error_type, ErrorType::ConfigurationError);
        assert!(err.message.starts_with("Configuration file not found."));

        let v = AgentError::Validation("GROQ_API_KEY missing".into());
        assert_eq!(handle_configuration_error(&v).message, "GROQ_API_KEY missing");
    }

    #[test]
    fn test_error_response_serialization() {
        let err = FinancialAgentError::network("offline", details([("host", json!("x"))]));
        let value = serde_json::to_value(err.to_response()).unwrap();
        assert_eq!(value["error"], json!("offline"));
        assert_eq!(value["error_type"], json!("network_error"));
        assert_eq!(value["details"]["host"], json!("x"));
    }
}
