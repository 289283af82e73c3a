//! Tool trait and registry
//!
//! Tools are the agent's only way to reach external data. Each one declares a
//! JSON schema for its arguments so the model can call it.

use crate::error::AgentError;
use crate::llm::ToolSpec;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod duckduckgo;
pub mod yfinance;

pub use duckduckgo::{DuckDuckGoClient, DuckDuckGoNewsTool, DuckDuckGoSearchTool};
pub use yfinance::{normalize_ticker, yfinance_tools, StockToolOptions, YahooFinanceClient};

/// A single callable capability
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool registry for looking up and executing tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let tool = self
            .get(&input.tool_name)
            .ok_or_else(|| AgentError::ToolNotFound(input.tool_name.clone()))?;
        ensure_object_parameters(input)?;
        tool.execute(input).await
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = ToolRegistry::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

pub(crate) fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(AgentError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ))
    }
}

pub(crate) fn require_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str> {
    input
        .parameters
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            AgentError::InvalidToolInput(format!(
                "Expected '{}' in arguments for {}",
                key, input.tool_name
            ))
        })
}

pub(crate) fn optional_usize(input: &ToolInput, key: &str, default: usize) -> usize {
    input
        .parameters
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|n| n as usize)
        .unwrap_or(default)
}
