//! Warden - sandboxed command execution and MCP tools from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden::mcp::McpClient;
use warden::{Config, ExecutionPolicy, ExecutionSandbox, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Warden - sandboxed command execution and MCP tools for coding agents")]
#[command(version)]
struct Args {
    /// Project root
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,

    /// Configuration file (defaults to <directory>/warden.toml)
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and run a single command
    Exec {
        /// The command line, e.g. "git status"
        #[arg(value_name = "COMMAND")]
        command: String,
    },
    /// List built-in and MCP tools
    Tools,
    /// Run the tool requested by a <tool_code> block
    Dispatch {
        /// Model output; read from stdin when omitted
        #[arg(value_name = "TEXT")]
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::load(args.config.as_deref(), &args.directory)?;
    let policy = ExecutionPolicy::from_settings(&config.sandbox);
    let sandbox = ExecutionSandbox::new(&args.directory, policy)
        .with_context(|| format!("Cannot use {} as project root", args.directory.display()))?;

    match args.command {
        Commands::Exec { command } => {
            let result = sandbox.execute_command(&command).await;
            print!("{}", result.output);
            if let Some(error) = result.error {
                eprintln!("Error: {error}");
                std::process::exit(1);
            }
        }
        Commands::Tools => {
            let (registry, client) = build_registry(sandbox, &config).await;
            println!("{}", registry.describe());
            client.shutdown().await;
        }
        Commands::Dispatch { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read model output from stdin")?;
                    buf
                }
            };

            let (registry, client) = build_registry(sandbox, &config).await;
            match registry.dispatch(&text).await {
                Some(output) => println!("{output}"),
                None => tracing::info!("No tool call requested"),
            }
            client.shutdown().await;
        }
    }

    Ok(())
}

async fn build_registry(
    sandbox: ExecutionSandbox,
    config: &Config,
) -> (ToolRegistry, Arc<McpClient>) {
    let mut registry = ToolRegistry::new(Arc::new(sandbox));
    let client = Arc::new(McpClient::new());

    for server in client.connect_configured(&config.mcp.servers).await {
        if let Err(e) = registry.register_server(&client, &server).await {
            tracing::warn!(server = %server, error = %e, "Failed to register MCP tools");
        }
    }
    (registry, client)
}
