//! Financial Agent System
//!
//! Routes user queries to LLM-backed agents that can:
//! - Look up stock prices, analyst recommendations, fundamentals and news
//! - Search the web through DuckDuckGo
//! - Coordinate both as a team
//!
//! Failures are classified into a small error taxonomy, and every log line
//! passes through a redacting writer before it reaches console or file.

pub mod agent;
pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod models;
pub mod playground;
pub mod runner;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use agent::{Agent, AgentBuilder};
pub use agents::{AgentKind, AgentSet};
pub use config::{load_config, Config};
pub use error::{AgentError, ErrorResponse, ErrorType, FinancialAgentError};
pub use models::*;
pub use runner::{format_error_markdown, query_agent};
