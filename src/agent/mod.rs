//! Agent runtime
//!
//! An agent is a model bound to a set of tools and instructions. `run` drives
//! the tool-calling loop:
//!
//! QUERY → MODEL → TOOL CALLS → TOOL RESULTS → MODEL → ... → ANSWER
//!
//! Team members are exposed to the leader as `transfer_task_to_<member>` tools,
//! so delegation goes through the same loop.

use crate::error::AgentError;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::{RunResponse, ToolCallRecord, ToolInput, ToolOutput};
use crate::tools::{require_str, Tool, ToolRegistry};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

pub struct Agent {
    name: String,
    role: Option<String>,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    instructions: Vec<String>,
    team: Vec<Arc<Agent>>,
    show_tool_calls: bool,
    markdown: bool,
    max_tool_rounds: u32,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model.id())
            .field("tools", &self.tools.list())
            .field("team", &self.team.iter().map(|a| a.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>, model: Arc<dyn ChatModel>) -> AgentBuilder {
        AgentBuilder::new(name, model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn model_id(&self) -> &str {
        self.model.id()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.list()
    }

    pub fn team(&self) -> &[Arc<Agent>] {
        &self.team
    }

    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = String::new();

        if !self.team.is_empty() {
            prompt.push_str(
                "You are the leader of a team of AI Agents. You can either respond directly \
                 or transfer tasks to other Agents in your team depending on their role and \
                 the tools available to them.\n\n<team_members>\n",
            );
            for member in &self.team {
                prompt.push_str(&format!(" - Agent: {}\n", member.name()));
                if let Some(role) = member.role() {
                    prompt.push_str(&format!("   Role: {}\n", role));
                }
                let tools = member.tool_names();
                if !tools.is_empty() {
                    prompt.push_str(&format!("   Available tools: {}\n", tools.join(", ")));
                }
            }
            prompt.push_str("</team_members>\n\n");
        }

        if let Some(role) = &self.role {
            prompt.push_str(&format!("Your role is: {}\n\n", role));
        }

        let mut rules: Vec<&str> = self.instructions.iter().map(String::as_str).collect();
        if self.markdown {
            rules.push("Use markdown to format your answers.");
        }
        if !rules.is_empty() {
            prompt.push_str("## Instructions\n");
            for rule in rules {
                prompt.push_str(&format!("- {}\n", rule));
            }
        }

        prompt.trim_end().to_string()
    }

    /// Answer a query, calling tools as the model requests them
    pub async fn run(&self, query: &str) -> Result<RunResponse> {
        info!(agent = %self.name, model = %self.model.id(), "Agent run started");

        let specs = self.tools.specs();
        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(query),
        ];
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut rounds = 0u32;

        loop {
            let reply = self.model.complete(&messages, &specs).await?;

            if reply.tool_calls.is_empty() {
                let content = reply.content.unwrap_or_default();
                debug!(
                    agent = %self.name,
                    rounds,
                    tool_calls = records.len(),
                    "Agent run finished"
                );
                return Ok(RunResponse {
                    agent_name: self.name.clone(),
                    content: self.render(content, &records),
                    tool_calls: records,
                });
            }

            if rounds >= self.max_tool_rounds {
                warn!(agent = %self.name, rounds, "Tool round limit reached");
                return Err(AgentError::MaxIterations(self.max_tool_rounds));
            }
            rounds += 1;

            messages.push(ChatMessage::assistant(
                reply.content.clone(),
                reply.tool_calls.clone(),
            ));

            for call in reply.tool_calls {
                let input = ToolInput::new(call.name.clone(), call.arguments.clone());
                let (text, success) = match self.tools.execute(&input).await {
                    Ok(output) => (output.to_model_text(), true),
                    Err(e) => {
                        warn!(agent = %self.name, tool = %call.name, "Tool call failed: {}", e);
                        (format!("Error: {}", e), false)
                    }
                };

                debug!(agent = %self.name, tool = %call.name, success, "Tool call completed");
                records.push(ToolCallRecord {
                    tool_name: call.name,
                    arguments: call.arguments,
                    success,
                });
                messages.push(ChatMessage::tool_result(call.id, text));
            }
        }
    }

    fn render(&self, content: String, records: &[ToolCallRecord]) -> String {
        if !self.show_tool_calls || records.is_empty() {
            return content;
        }

        let mut out: String = records
            .iter()
            .map(|r| format!(" - Running: {}\n", r))
            .collect();
        out.push('\n');
        out.push_str(&content);
        out
    }
}

//
// ================= Builder =================
//

pub struct AgentBuilder {
    name: String,
    role: Option<String>,
    model: Arc<dyn ChatModel>,
    tools: Vec<Arc<dyn Tool>>,
    instructions: Vec<String>,
    team: Vec<Arc<Agent>>,
    show_tool_calls: bool,
    markdown: bool,
    max_tool_rounds: u32,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            name: name.into(),
            role: None,
            model,
            tools: Vec::new(),
            instructions: Vec::new(),
            team: Vec::new(),
            show_tool_calls: false,
            markdown: false,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn instructions<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.instructions.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn team_member(mut self, member: Arc<Agent>) -> Self {
        self.team.push(member);
        self
    }

    pub fn show_tool_calls(mut self, enabled: bool) -> Self {
        self.show_tool_calls = enabled;
        self
    }

    pub fn markdown(mut self, enabled: bool) -> Self {
        self.markdown = enabled;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn build(self) -> Agent {
        let mut tools: ToolRegistry = self.tools.into_iter().collect();
        for member in &self.team {
            tools.register(Arc::new(TransferTaskTool::new(member.clone())));
        }

        Agent {
            name: self.name,
            role: self.role,
            model: self.model,
            tools,
            instructions: self.instructions,
            team: self.team,
            show_tool_calls: self.show_tool_calls,
            markdown: self.markdown,
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}

//
// ================= Team delegation =================
//

/// `WebSearchAgent` → `web_search_agent`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }

    out.trim_end_matches('_').to_string()
}

/// Hands a task to a team member and returns its answer
pub struct TransferTaskTool {
    member: Arc<Agent>,
    name: String,
    description: String,
}

impl TransferTaskTool {
    pub fn new(member: Arc<Agent>) -> Self {
        let name = format!("transfer_task_to_{}", snake_case(member.name()));
        let description = match member.role() {
            Some(role) => format!(
                "Use this function to transfer a task to {}. Role: {}",
                member.name(),
                role
            ),
            None => format!("Use this function to transfer a task to {}.", member.name()),
        };
        Self {
            member,
            name,
            description,
        }
    }
}

#[async_trait::async_trait]
impl Tool for TransferTaskTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_description": {
                    "type": "string",
                    "description": "A clear and concise description of the task the agent should achieve"
                },
                "expected_output": {
                    "type": "string",
                    "description": "The expected output from the agent"
                }
            },
            "required": ["task_description"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let task = require_str(input, "task_description")?;
        let mut message = task.to_string();
        if let Some(expected) = input
            .parameters
            .get("expected_output")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
        {
            message.push_str(&format!("\n\nThe expected output is: {}", expected));
        }

        info!(member = %self.member.name(), "Transferring task to team member");
        let response = self.member.run(&message).await?;
        Ok(ToolOutput::ok(Value::String(response.content)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::llm::{ChatMessage, ChatModel, ModelReply, ToolCall, ToolSpec};
    use crate::Result;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records every request it sees
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ModelReply>>>,
        pub requests: Mutex<Vec<(Vec<ChatMessage>, Vec<ToolSpec>)>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<ModelReply>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn answering(text: &str) -> Self {
            Self::new(vec![Ok(text_reply(text))])
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    pub fn text_reply(text: &str) -> ModelReply {
        ModelReply {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
        }
    }

    pub fn call_reply(id: &str, name: &str, arguments: Value) -> ModelReply {
        ModelReply {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ModelReply> {
            self.requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), tools.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(text_reply("done")))
        }
    }
}
