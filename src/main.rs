use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "shikigami")]
#[command(about = "Drive a local coding agent through ask, plan, approve and execute over HTTP")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.shikigami/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Interface to bind (overrides config and RUNNER_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config and RUNNER_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check that the agent CLI can be found
    Check,

    /// Show the status of a job on a running server
    Status {
        /// Job to query
        job_id: String,

        /// Server base URL (defaults to http://127.0.0.1:<configured port>)
        #[arg(long)]
        url: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            cli::serve::serve_command(config_path, host, port).await?;
        }
        Some(Commands::Check) => {
            if !cli::check::check_command(config_path)? {
                std::process::exit(1);
            }
        }
        Some(Commands::Status { job_id, url, json }) => {
            let url = match url {
                Some(url) => url,
                None => {
                    let config = shikigami::config::Config::load(config_path)?;
                    format!("http://127.0.0.1:{}", config.server.port)
                }
            };
            cli::status::status_command(&url, &job_id, json)?;
        }
        None => {
            cli::serve::serve_command(config_path, None, None).await?;
        }
    }

    Ok(())
}
