//! Core data models shared by the agent runtime, CLI and playground

use crate::error::ErrorResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: Value,
}

impl ToolInput {
    pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Successful tool result; failures travel as `Err` and are recorded on the call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub data: Value,
}

impl ToolOutput {
    pub fn ok(data: Value) -> Self {
        Self { data }
    }

    /// Text handed back to the model as the tool result
    pub fn to_model_text(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

//
// ================= Agent runs =================
//

/// A tool invocation made during a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub success: bool,
}

impl fmt::Display for ToolCallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = match &self.arguments {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{}={}", k, s),
                    other => format!("{}={}", k, other),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        write!(f, "{}({})", self.tool_name, args)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub agent_name: String,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Result of routing one query to one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub agent_name: String,
    pub query_id: String,
    pub success: bool,
    pub content: Option<String>,
    pub error: Option<ErrorResponse>,
    /// The failure was already a `FinancialAgentError` rather than mapped from another error
    #[serde(default)]
    pub raised_classified: bool,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Wall-clock seconds
    pub execution_time: f64,
}
