use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sayr_mcp_agent::mcp::{self, McpClient};
use sayr_mcp_agent::{
    init_tracing, model_from_config, Agent, AppConfig, DoneReason, FinalAnswerSink,
    LanguageModel, StubModel, ToolHost, ToolSink,
};

/// Solve a task step by step with the tools of an MCP server.
#[derive(Debug, Parser)]
#[command(name = "sayr-mcp-agent", version)]
struct Cli {
    /// TOML configuration file; defaults plus SAYR_* variables when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Task to solve instead of the configured query.
    #[arg(short, long)]
    query: Option<String>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Replay these model responses instead of calling the model API.
    #[arg(long = "stub-response")]
    stub_responses: Vec<String>,
}

#[tokio::main]
async fn main() -> sayr_mcp_agent::Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => AppConfig::from_env_or_file(path)?,
        None => AppConfig::from_env()?,
    };
    if let Some(query) = cli.query {
        cfg.agent.query = query;
    }
    if let Some(max) = cli.max_iterations {
        cfg.agent.max_iterations = max;
    }
    init_tracing(&cfg.logging);

    let model: Arc<dyn LanguageModel> = if cli.stub_responses.is_empty() {
        model_from_config(&cfg.model)?
    } else {
        StubModel::new(cli.stub_responses)
    };

    let client = Arc::new(McpClient::new(mcp::connect(&cfg.mcp)?));
    let host: Arc<dyn ToolHost> = client.clone();
    let result = run(model, host, &cfg).await;

    if let Err(err) = client.close().await {
        tracing::warn!(error = %err, "failed to close MCP session");
    }
    result
}

async fn run(
    model: Arc<dyn LanguageModel>,
    host: Arc<dyn ToolHost>,
    cfg: &AppConfig,
) -> sayr_mcp_agent::Result<()> {
    let agent = Agent::connect(model, Arc::clone(&host), &cfg.agent).await?;
    let outcome = agent.run().await;

    match &outcome.reason {
        DoneReason::FinalAnswer(value) => println!("FINAL_ANSWER: {value}"),
        DoneReason::MaxIterations => println!(
            "Reached {} iterations without a final answer",
            cfg.agent.max_iterations
        ),
        DoneReason::Error(err) => eprintln!("Run failed: {err}"),
    }
    for entry in &outcome.state.history {
        println!("  {entry}");
    }

    if let Some(tool) = &cfg.agent.final_answer_tool {
        let sink = ToolSink::new(host, tool.clone(), cfg.agent.final_answer_arg.clone());
        if let Some(output) = sink.persist(&outcome).await? {
            println!("{tool}: {}", output.render());
        }
    }
    Ok(())
}
