//! Pre-built agents: stock data, web search, and the team that coordinates both

use crate::agent::Agent;
use crate::config::Config;
use crate::llm::{create_model, ChatModel};
use crate::tools::{
    yfinance_tools, DuckDuckGoClient, DuckDuckGoNewsTool, DuckDuckGoSearchTool, StockToolOptions,
    YahooFinanceClient,
};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub const FINANCIAL_AGENT: &str = "FinancialAgent";
pub const WEB_SEARCH_AGENT: &str = "WebSearchAgent";
pub const MULTI_AGENT_SYSTEM: &str = "MultiAgentSystem";

const FINANCIAL_INSTRUCTIONS: [&str; 5] = [
    "Use tables to display the data",
    "Provide clear and structured financial information",
    "Include relevant metrics and context",
    "If a ticker symbol is invalid or not found, provide a clear error message to the user",
    "Handle errors gracefully and suggest checking the ticker symbol",
];

const WEB_SEARCH_INSTRUCTIONS: [&str; 3] = [
    "Always include sources and URLs in your responses",
    "Format all results in Markdown format",
    "Provide clear citations for all information",
];

const TEAM_INSTRUCTIONS: [&str; 8] = [
    "Coordinate between the Web Search Agent and Financial Agent to answer user queries",
    "Combine data from all agents into a unified response",
    "Summarize insights from multiple sources",
    "When a query requires financial data, delegate to the Financial Agent",
    "When a query requires web search, delegate to the Web Search Agent",
    "When a query requires both, coordinate both agents and synthesize the results",
    "Always provide comprehensive and well-structured responses",
    "Include relevant context from all data sources",
];

/// Shared model and data clients the agents are built from
#[derive(Clone)]
pub struct AgentResources {
    pub model: Arc<dyn ChatModel>,
    pub yahoo: Arc<YahooFinanceClient>,
    pub search: Arc<DuckDuckGoClient>,
    pub max_tool_rounds: u32,
}

impl AgentResources {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            model: create_model(config)?,
            yahoo: Arc::new(YahooFinanceClient::new(
                &config.yfinance_base_url,
                &config.yfinance_cookie_url,
                config.request_timeout,
            )?),
            search: Arc::new(DuckDuckGoClient::new(
                &config.duckduckgo_base_url,
                &config.duckduckgo_news_base_url,
                config.request_timeout,
            )?),
            max_tool_rounds: config.max_tool_rounds,
        })
    }
}

pub fn create_financial_agent(resources: &AgentResources) -> Agent {
    Agent::builder(FINANCIAL_AGENT, resources.model.clone())
        .role("Fetch financial details about stocks.")
        .tools(yfinance_tools(resources.yahoo.clone(), StockToolOptions::all()))
        .instructions(FINANCIAL_INSTRUCTIONS)
        .show_tool_calls(true)
        .markdown(true)
        .max_tool_rounds(resources.max_tool_rounds)
        .build()
}

pub fn create_web_search_agent(resources: &AgentResources) -> Agent {
    Agent::builder(WEB_SEARCH_AGENT, resources.model.clone())
        .role("Search the web for information.")
        .tool(Arc::new(DuckDuckGoSearchTool::new(resources.search.clone())))
        .tool(Arc::new(DuckDuckGoNewsTool::new(resources.search.clone())))
        .instructions(WEB_SEARCH_INSTRUCTIONS)
        .show_tool_calls(true)
        .markdown(true)
        .max_tool_rounds(resources.max_tool_rounds)
        .build()
}

/// Team leader over the web search and financial agents
pub fn create_multi_agent_system(
    resources: &AgentResources,
    web_search: Arc<Agent>,
    financial: Arc<Agent>,
) -> Agent {
    Agent::builder(MULTI_AGENT_SYSTEM, resources.model.clone())
        .team_member(web_search)
        .team_member(financial)
        .instructions(TEAM_INSTRUCTIONS)
        .show_tool_calls(true)
        .markdown(true)
        .max_tool_rounds(resources.max_tool_rounds)
        .build()
}

/// Which agent a query is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AgentKind {
    Financial,
    Web,
    #[default]
    Multi,
}

impl AgentKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Financial => "Financial Agent",
            AgentKind::Web => "Web Search Agent",
            AgentKind::Multi => "Multi-Agent System",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// All three agents, sharing one model client
pub struct AgentSet {
    pub financial: Arc<Agent>,
    pub web_search: Arc<Agent>,
    pub multi: Arc<Agent>,
}

impl AgentSet {
    pub fn build(resources: &AgentResources) -> Self {
        let financial = Arc::new(create_financial_agent(resources));
        let web_search = Arc::new(create_web_search_agent(resources));
        let multi = Arc::new(create_multi_agent_system(
            resources,
            web_search.clone(),
            financial.clone(),
        ));

        info!(model = %resources.model.id(), "All agents initialized successfully");
        Self {
            financial,
            web_search,
            multi,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::build(&AgentResources::from_config(config)?))
    }

    pub fn get(&self, kind: AgentKind) -> &Arc<Agent> {
        match kind {
            AgentKind::Financial => &self.financial,
            AgentKind::Web => &self.web_search,
            AgentKind::Multi => &self.multi,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::agent::testing::ScriptedModel;
    use std::time::Duration;

    const UNROUTABLE: &str = "http://127.0.0.1:9";

    /// Resources pointing at unroutable endpoints; only the model answers
    pub fn resources(model: Arc<ScriptedModel>) -> AgentResources {
        AgentResources {
            model,
            yahoo: Arc::new(
                YahooFinanceClient::new(UNROUTABLE, UNROUTABLE, Duration::from_millis(200)).unwrap(),
            ),
            search: Arc::new(
                DuckDuckGoClient::new(UNROUTABLE, UNROUTABLE, Duration::from_millis(200)).unwrap(),
            ),
            max_tool_rounds: 4,
        }
    }
}
