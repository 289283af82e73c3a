use financial_agent_system::{
    agents::AgentSet,
    config::{load_playground_config, validate_api_keys},
    logging::{setup_logging, LoggingConfig},
    playground::start_server,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_playground_config(Path::new(".env")) {
        Ok(config) => config,
        Err(e) => {
            // No config means no log settings; fall back to the defaults.
            let _guard = setup_logging(&LoggingConfig {
                log_file: Some(PathBuf::from("financial_agent.log")),
                ..Default::default()
            });
            error!("Configuration failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = setup_logging(&config.logging(true));
    info!("Starting Playground service");

    info!("Validating API keys");
    if let Err(e) = validate_api_keys(&config) {
        error!("API key validation failed: {}", e);
        return ExitCode::FAILURE;
    }
    info!("API keys validated successfully");

    let agents = match AgentSet::from_config(&config) {
        Ok(agents) => agents,
        Err(e) => {
            error!("Failed to initialize agents: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        provider = %config.provider,
        model = %config.model,
        "Creating Playground app with agents"
    );

    let served = vec![agents.financial.clone(), agents.web_search.clone()];
    if let Err(e) = start_server(served, &config.playground_host, config.playground_port).await {
        error!("Playground server stopped: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
