use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conduit::config::ConduitToml;
use conduit::logging::{self, LoggingConfig};
use conduit::pipeline::GraphKind;
use conduit_common::LanguageType;

mod cmd;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(version, about = "Run code-conversion sessions through checkpointed phase graphs")]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .conduit/ with a default conduit.toml
    Init,
    /// Start a new session for a source file
    Run {
        /// Source file to convert
        file: PathBuf,
        /// Declared source language (guessed from the extension if omitted)
        #[arg(short, long)]
        language: Option<LanguageType>,
        /// Thread id to checkpoint under (random if omitted)
        #[arg(short, long)]
        thread: Option<String>,
        /// Session id (random if omitted)
        #[arg(long)]
        session: Option<String>,
        /// Graph to run (defaults to [pipeline].graph)
        #[arg(short, long, value_enum)]
        graph: Option<GraphKind>,
    },
    /// Continue a run from its latest checkpoint
    Resume { thread: String },
    /// Show the latest checkpoint of a thread
    Status {
        thread: String,
        /// Print the checkpoint as JSON
        #[arg(long)]
        json: bool,
    },
    /// List threads that have checkpoints
    List,
    /// Delete the checkpoint of a thread
    Reset {
        thread: String,
        #[arg(long)]
        force: bool,
    },
    /// Inspect finished run records
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Send a test prompt to the configured collaborator
    Check,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// List finished runs, most recent first
    List,
    /// Show one run record
    Show { file: PathBuf },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default conduit.toml
    Init,
}

fn init_logging(cli: &Cli, project_dir: &std::path::Path) {
    let conduit_dir = conduit::init::get_conduit_dir(project_dir);
    let mut config = ConduitToml::load_or_default(&conduit_dir)
        .map(|toml| toml.logging)
        .unwrap_or_default();
    if cli.verbose {
        config = LoggingConfig {
            level: "debug".to_string(),
            ..config
        };
    }
    logging::init(&config);
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    init_logging(&cli, &project_dir);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Run {
            file,
            language,
            thread,
            session,
            graph,
        } => {
            cmd::cmd_run(
                &project_dir,
                cmd::RunArgs {
                    file: file.clone(),
                    language: *language,
                    thread: thread.clone(),
                    session: session.clone(),
                    graph: *graph,
                },
            )
            .await?
        }
        Commands::Resume { thread } => cmd::cmd_resume(&project_dir, thread).await?,
        Commands::Status { thread, json } => cmd::cmd_status(&project_dir, thread, *json).await?,
        Commands::List => cmd::cmd_list(&project_dir).await?,
        Commands::Reset { thread, force } => cmd::cmd_reset(&project_dir, thread, *force).await?,
        Commands::Audit { command } => cmd::cmd_audit(&project_dir, command)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Check => cmd::cmd_check(&project_dir).await?,
    }

    Ok(())
}
