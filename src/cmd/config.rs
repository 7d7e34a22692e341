//! Project setup and configuration: `init`, `config`, `check`.

use anyhow::{Context, Result};
use std::path::Path;

use conduit::collaborator::OpenRouterClient;
use conduit::config::{CONFIG_FILE, ConduitToml, Config};
use conduit::init::{get_conduit_dir, init_project};

use super::super::ConfigCommands;
use super::api_key_from_env;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let result = init_project(project_dir)?;
    if result.created {
        println!(
            "Initialized conduit project at {}",
            result.conduit_dir.display()
        );
    } else {
        println!(
            "Conduit project already initialized at {}",
            result.conduit_dir.display()
        );
    }
    if result.wrote_config {
        println!("  Wrote default {CONFIG_FILE}");
    }
    Ok(())
}

fn print_toml(toml: &ConduitToml) {
    let c = &toml.collaborator;
    println!("[collaborator]");
    println!("  base_url = \"{}\"", c.base_url);
    println!("  model = \"{}\"", c.model);
    println!("  temperature = {}", c.temperature);
    println!("  max_tokens = {}", c.max_tokens);
    println!("  timeout_secs = {}", c.timeout_secs);
    println!();
    println!("[runner]");
    println!("  node_timeout_secs = {}", toml.runner.node_timeout_secs);
    println!(
        "  checkpoint_backend = \"{}\"",
        toml.runner.checkpoint_backend
    );
    println!();
    println!("[pipeline]");
    println!("  graph = \"{}\"", toml.pipeline.graph);
    println!(
        "  on_collaborator_error = \"{}\"",
        match toml.pipeline.on_collaborator_error {
            conduit::pipeline::FailurePolicy::Abort => "abort",
            conduit::pipeline::FailurePolicy::Record => "record",
        }
    );
    println!();
    println!("[logging]");
    println!("  level = \"{}\"", toml.logging.level);
    println!("  json = {}", toml.logging.json);
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let conduit_dir = get_conduit_dir(project_dir);
    let config_path = conduit_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", console::style("Conduit Configuration").bold());
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&ConduitToml::load(&config_path)?);
            } else {
                println!("No {CONFIG_FILE} found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&ConduitToml::default());
                println!("Run 'conduit config init' to create a {CONFIG_FILE} file.");
                println!();
            }

            let key_status = if std::env::var(super::API_KEY_ENV).is_ok_and(|k| !k.is_empty()) {
                console::style("set").green()
            } else {
                console::style("not set").yellow()
            };
            println!("{}: {key_status}", super::API_KEY_ENV);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {CONFIG_FILE} found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ConduitToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("{}", console::style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {warning}");
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{CONFIG_FILE} already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&conduit_dir)
                .with_context(|| format!("Failed to create {}", conduit_dir.display()))?;
            ConduitToml::default().save(&config_path)?;

            println!("Created {CONFIG_FILE} at {}", config_path.display());
        }
    }

    Ok(())
}

pub async fn cmd_check(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir)?;
    let client = OpenRouterClient::new(config.openrouter_config(api_key_from_env()?))
        .context("Failed to configure the collaborator client")?;

    println!();
    println!(
        "Testing connection to {} ({})...",
        config.toml.collaborator.base_url, config.toml.collaborator.model
    );

    let report = client.test_connection().await;
    if report.success {
        println!("{}", console::style("Connection OK").green().bold());
        if let Some(response) = &report.response {
            println!("  Response: {}", conduit::util::preview(response, 80));
        }
        if let Some(usage) = &report.usage {
            println!(
                "  Tokens:   {} prompt, {} completion",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        println!();
        Ok(())
    } else {
        println!("{}", console::style("Connection failed").red().bold());
        let error = report.error.unwrap_or_else(|| "unknown error".to_string());
        println!("  {error}");
        println!();
        anyhow::bail!("Collaborator check failed: {error}")
    }
}
