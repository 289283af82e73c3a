use clap::Parser;
use financial_agent_system::{
    agents::{AgentKind, AgentSet},
    config::load_config,
    error::handle_configuration_error,
    logging::{log_error, setup_logging, LoggingConfig},
    runner::{query_agent, user_facing_details},
    ErrorResponse,
};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const SEPARATOR_WIDTH: usize = 80;

const SAMPLE_QUERIES: [(&str, &str, AgentKind); 3] = [
    ("Financial Data", "What is the current price of AAPL?", AgentKind::Financial),
    ("Web Search", "Latest news about artificial intelligence", AgentKind::Web),
    (
        "Multi-Agent Coordination",
        "Summarize analyst recommendations and latest news for NVIDIA",
        AgentKind::Multi,
    ),
];

/// Financial AI Agent System - local query runner
#[derive(Parser)]
#[command(name = "financial-agent")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:
  financial-agent
  financial-agent --query \"What is the current price of AAPL?\"
  financial-agent --query \"Latest AI news\" --agent web
  financial-agent --query \"NVIDIA stock analysis\" --agent financial
  financial-agent --query \"Compare AAPL and MSFT\" --agent multi")]
struct Cli {
    /// Custom query to execute (runs the sample queries when omitted)
    #[arg(short, long)]
    query: Option<String>,

    /// Which agent handles the query
    #[arg(short, long, value_enum, default_value = "multi")]
    agent: AgentKind,

    /// Path to the .env file
    #[arg(long, env = "FINANCIAL_AGENT_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Also print log lines to the console
    #[arg(long)]
    verbose: bool,
}

fn print_separator(c: char) {
    println!("{}", c.to_string().repeat(SEPARATOR_WIDTH));
}

fn print_header(text: &str) {
    print_separator('=');
    println!("  {}", text);
    print_separator('=');
}

fn print_banner(text: &str) {
    println!("\n{}", "=".repeat(SEPARATOR_WIDTH));
    println!("{}", text);
    println!("{}", "=".repeat(SEPARATOR_WIDTH));
}

fn print_error(prefix: &str, error: &ErrorResponse) {
    println!("{}: {}", prefix, error.error);
    if !error.details.is_empty() {
        println!("Details: {}", Value::Object(error.details.clone()));
    }
}

/// Run one query and print the outcome; true on success
async fn execute_query(agents: &AgentSet, query: &str, kind: AgentKind) -> bool {
    println!("\n[*] Using: {}", kind);
    println!("[?] Query: {}", query);
    print_separator('-');

    let outcome = query_agent(agents.get(kind), query).await;

    if outcome.success {
        println!("\n[RESPONSE]:");
        print_separator('-');
        println!("{}", outcome.content.as_deref().unwrap_or_default());
        print_separator('-');

        if !outcome.tool_calls.is_empty() {
            println!("\n[*] Tool Calls:");
            for call in &outcome.tool_calls {
                println!("  - {}", call);
            }
        }
        return true;
    }

    if let Some(error) = &outcome.error {
        println!("\n[-] Error: {}", error.error);
        println!("Error Type: {}", error.error_type);
    }
    if let Some(details) = user_facing_details(&outcome) {
        println!("Details: {}", Value::Object(details.clone()));
    }
    false
}

async fn run_sample_queries(agents: &AgentSet) {
    print_banner("SAMPLE QUERY EXECUTION");

    for (i, (title, query, kind)) in SAMPLE_QUERIES.iter().enumerate() {
        println!("\n\n[{}] Query {}: {}", i + 1, i + 1, title);
        execute_query(agents, query, *kind).await;
    }

    print_banner("[+] Sample queries completed!");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    print_header("Financial AI Agent System - Local Test");

    println!("\n[*] Loading configuration...");
    let config = match load_config(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            let _guard = setup_logging(&LoggingConfig {
                log_file: Some(PathBuf::from("financial_agent.log")),
                enable_console: cli.verbose,
                ..Default::default()
            });
            let mut context = Map::new();
            context.insert("stage".into(), json!("configuration"));
            log_error(None, &e, Some(&context));

            print_error("[-] Configuration Error", &handle_configuration_error(&e).to_response());
            return ExitCode::FAILURE;
        }
    };

    let _guard = setup_logging(&config.logging(cli.verbose));
    info!("Starting Financial AI Agent System");
    println!("[+] Configuration loaded successfully");

    println!("\n[*] Initializing agents...");
    let agents = match AgentSet::from_config(&config) {
        Ok(agents) => agents,
        Err(e) => {
            log_error(None, &e, None);
            print_error("[-] Initialization Error", &handle_configuration_error(&e).to_response());
            return ExitCode::FAILURE;
        }
    };
    for kind in [AgentKind::Web, AgentKind::Financial, AgentKind::Multi] {
        println!("  - {}: Ready", kind);
    }

    match cli.query {
        Some(query) => {
            print_banner("CUSTOM QUERY EXECUTION");

            if execute_query(&agents, &query, cli.agent).await {
                println!("\n[+] Query completed successfully!");
                ExitCode::SUCCESS
            } else {
                println!("\n[-] Query failed!");
                ExitCode::FAILURE
            }
        }
        None => {
            run_sample_queries(&agents).await;
            ExitCode::SUCCESS
        }
    }
}
