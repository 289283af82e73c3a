//! Single-query execution with logging and error classification

use crate::agent::Agent;
use crate::error::{AgentError, ErrorResponse};
use crate::logging::{log_error, log_query, log_response};
use crate::models::QueryOutcome;
use serde_json::{json, Map};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Run `query` on `agent`; failures come back classified, never as `Err`
pub async fn query_agent(agent: &Agent, query: &str) -> QueryOutcome {
    let agent_name = agent.name().to_string();
    let query_id = Uuid::new_v4().to_string();

    log_query(&agent_name, query, &query_id);
    let start = Instant::now();

    info!(agent = %agent_name, "Executing query with {}", agent_name);
    let result = agent.run(query).await;
    let elapsed = start.elapsed();

    match result {
        Ok(response) => {
            log_response(&agent_name, true, &query_id, Some(elapsed));
            QueryOutcome {
                agent_name,
                query_id,
                success: true,
                content: Some(response.content),
                error: None,
                raised_classified: false,
                tool_calls: response.tool_calls,
                execution_time: elapsed.as_secs_f64(),
            }
        }
        Err(e) => {
            let mut context = Map::new();
            context.insert("query".into(), json!(query));
            log_error(Some(agent_name.as_str()), &e, Some(&context));

            let raised_classified = matches!(e, AgentError::Classified(_));
            let classified = e.classify(&agent_name);
            log_response(&agent_name, false, &query_id, Some(elapsed));

            QueryOutcome {
                agent_name,
                query_id,
                success: false,
                content: None,
                error: Some(classified.to_response()),
                raised_classified,
                tool_calls: Vec::new(),
                execution_time: elapsed.as_secs_f64(),
            }
        }
    }
}

/// Details worth showing a user: only those a `FinancialAgentError` carried itself
pub fn user_facing_details(outcome: &QueryOutcome) -> Option<&Map<String, serde_json::Value>> {
    if !outcome.raised_classified {
        return None;
    }
    outcome
        .error
        .as_ref()
        .map(|e| &e.details)
        .filter(|d| !d.is_empty())
}

/// Markdown rendering used when an error is shown in place of an answer
pub fn format_error_markdown(error: &ErrorResponse) -> String {
    format!(
        "**Error**: {}\n\n**Error Type**: {}\n",
        error.error, error.error_type
    )
}
