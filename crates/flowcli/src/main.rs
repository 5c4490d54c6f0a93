// crates/flowcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{
    IggyChannel, IggyChannelConfig, MemoryChannel, MessageChannel, NodeConfig, StatusUpdate,
    WorkflowConfig, WorkflowDefinition, WorkflowStatus,
};
use flownodes::AiEndpoint;
use flowruntime::{ExecutorRegistry, FlowRuntime, MemoryStore, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow definition file to completion
    Run {
        /// Path to workflow definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Raw input handed to the entry nodes
        #[arg(short, long)]
        input: Option<String>,

        /// Iggy connection string; the in-memory channel is used when absent
        #[arg(long, env = "FLOW_IGGY_URL")]
        iggy: Option<String>,

        /// Maximum tasks executed at once
        #[arg(long, env = "FLOW_WORKERS", default_value_t = 10)]
        workers: usize,

        /// Terminate the instance if it has not finished after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,

        /// Completion endpoint for `ai` nodes; simulated when absent
        #[arg(long, env = "FLOW_AI_URL")]
        ai_url: Option<String>,

        #[arg(long, env = "FLOW_AI_KEY", hide_env_values = true)]
        ai_key: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow definition file
    Validate {
        /// Path to workflow definition JSON file
        file: PathBuf,
    },

    /// List available executor types
    Executors,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn build_registry(ai_endpoint: Option<AiEndpoint>) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    flownodes::register_all(&mut registry, reqwest::Client::new(), ai_endpoint);
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            iggy,
            workers,
            timeout_secs,
            ai_url,
            ai_key,
            verbose,
        } => {
            init_tracing(verbose);

            let ai_endpoint = ai_url.map(|url| AiEndpoint {
                url,
                api_key: ai_key,
            });
            let options = RunOptions {
                input,
                iggy,
                workers,
                timeout: Duration::from_secs(timeout_secs),
                ai_endpoint,
            };
            run_workflow(file, options).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file)?;
        }

        Commands::Executors => {
            list_executors();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

struct RunOptions {
    input: Option<String>,
    iggy: Option<String>,
    workers: usize,
    timeout: Duration,
    ai_endpoint: Option<AiEndpoint>,
}

fn load_definition(file: &PathBuf) -> Result<(WorkflowDefinition, WorkflowConfig)> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let definition: WorkflowDefinition = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a workflow definition", file.display()))?;
    let config = definition.parse_config()?;
    config.validate_graph()?;
    Ok((definition, config))
}

async fn run_workflow(file: PathBuf, options: RunOptions) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let (definition, config) = load_definition(&file)?;

    println!("📋 Workflow: {}", definition.name);
    println!("   Nodes: {}", config.nodes.len());
    println!("   Edges: {}", config.edges.len());
    println!();

    let channel: Arc<dyn MessageChannel> = match options.iggy {
        Some(connection_string) => Arc::new(
            IggyChannel::connect(IggyChannelConfig {
                connection_string,
                ..Default::default()
            })
            .await?,
        ),
        None => Arc::new(MemoryChannel::new()),
    };

    let runtime = FlowRuntime::new(
        Arc::new(MemoryStore::new()),
        channel,
        Arc::new(build_registry(options.ai_endpoint)),
        RuntimeConfig {
            worker_concurrency: options.workers,
            ..Default::default()
        },
    );

    // Subscribe to status updates for real-time output
    let mut updates = runtime.subscribe_status();
    let printer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                StatusUpdate::Workflow {
                    status, message, ..
                } => match status {
                    WorkflowStatus::Running => println!("▶️  {}", message),
                    WorkflowStatus::Success => println!("✨ Workflow succeeded: {}", message),
                    WorkflowStatus::Failed => println!("💥 Workflow failed: {}", message),
                    WorkflowStatus::Terminated => println!("🛑 Workflow terminated: {}", message),
                },
                StatusUpdate::Node {
                    node_id,
                    status,
                    message,
                    ..
                } => {
                    println!("  ⚡ [{}] {} - {}", node_id, status, message);
                }
            }
        }
    });

    let handles = runtime.start().await?;
    let definition_id = runtime.save_definition(definition).await?;
    let instance_id = runtime.create_instance(definition_id, options.input).await?;

    let finished = tokio::select! {
        result = runtime.wait_for_terminal(instance_id, options.timeout) => match result {
            Ok(instance) => instance,
            Err(flowcore::FlowError::Timeout(reason)) => {
                tracing::warn!("{}, terminating", reason);
                runtime.terminate(instance_id).await?
            }
            Err(e) => return Err(e.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, terminating instance {}", instance_id);
            runtime.terminate(instance_id).await?
        }
    };

    // Wait for updates to finish printing
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();
    runtime.shutdown();
    for handle in handles {
        let _ = handle.await;
    }

    println!();
    println!("📊 Execution Summary:");
    println!("   Instance ID: {}", finished.id);
    println!("   Status: {}", finished.status);
    if let Some(error) = &finished.error_message {
        println!("   Error: {}", error);
    }
    println!();
    for node in runtime.nodes(instance_id).await? {
        println!("   {:<20} {:<10} {}", node.node_id, node.status, node.node_type);
        if let Some(output) = &node.output {
            println!("     output: {}", output);
        }
        if let Some(error) = &node.error_message {
            println!("     error:  {}", error);
        }
    }

    if finished.status != WorkflowStatus::Success {
        anyhow::bail!("workflow finished with status {}", finished.status);
    }
    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let (definition, config) = load_definition(&file)?;
    let registry = build_registry(None);
    let unknown: Vec<&str> = config
        .nodes
        .iter()
        .filter(|n| registry.resolve(&n.node_type).is_err())
        .map(|n| n.node_type.as_str())
        .collect();

    println!("✅ Workflow is valid:");
    println!("   Name: {}", definition.name);
    println!("   Nodes: {}", config.nodes.len());
    println!("   Edges: {}", config.edges.len());
    let entries: Vec<&str> = config
        .entry_nodes()
        .into_iter()
        .map(|n| n.id.as_str())
        .collect();
    println!("   Entry nodes: {}", entries.join(", "));
    if !unknown.is_empty() {
        println!("⚠️  No built-in executor for: {}", unknown.join(", "));
    }

    Ok(())
}

fn list_executors() {
    println!("📦 Available Executor Types:");
    println!();

    let registry = build_registry(None);
    for node_type in registry.list_types() {
        if let Some(metadata) = registry.metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let config = WorkflowConfig::new()
        .with_node(
            NodeConfig::new("fetch", "http")
                .with_name("Fetch Data")
                .with_config("url", "https://api.github.com/zen")
                .with_config("method", "GET")
                .with_position(100.0, 100.0),
        )
        .with_node(
            NodeConfig::new("summarize", "ai")
                .with_name("Summarize")
                .with_config("prompt", "Summarize the response in one sentence")
                .with_position(300.0, 50.0),
        )
        .with_node(
            NodeConfig::new("log", "debug")
                .with_name("Log Response")
                .with_position(300.0, 150.0),
        )
        .with_node(
            NodeConfig::new("notify", "email")
                .with_name("Notify")
                .with_config("to", "team@example.com")
                .with_config("subject", "Daily zen")
                .with_position(500.0, 100.0),
        )
        .connect("fetch", "summarize")
        .connect("fetch", "log")
        .connect("summarize", "notify")
        .connect("log", "notify");

    let definition = WorkflowDefinition::new("Example HTTP Workflow", &config)?
        .with_description("Fetches data from an API, summarizes it and sends a notification");

    // Save to file
    let json = serde_json::to_string_pretty(&definition)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow run --file {}", output.display());

    Ok(())
}
