//! Checkpoint inspection and the audit trail: `status`, `list`, `reset`, `audit`.

use anyhow::{Context, Result};
use std::path::Path;

use conduit::audit::{AuditLogger, RunOutcome};
use conduit::checkpoint::Checkpoint;

use super::super::AuditCommands;
use super::{load_initialized, open_checkpointer, warn_if_ephemeral};

pub async fn cmd_status(project_dir: &Path, thread_id: &str, json: bool) -> Result<()> {
    let config = load_initialized(project_dir)?;
    warn_if_ephemeral(&config);

    let Some(checkpoint) = open_checkpointer(&config)
        .get(thread_id)
        .await
        .with_context(|| format!("Failed to read checkpoint for thread '{thread_id}'"))?
    else {
        anyhow::bail!("No checkpoint found for thread '{thread_id}'");
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&checkpoint).context("Failed to serialize checkpoint")?
        );
        return Ok(());
    }

    print_checkpoint(&checkpoint);
    Ok(())
}

fn print_checkpoint(checkpoint: &Checkpoint) {
    let session = &checkpoint.session;

    println!();
    println!("{}", console::style("Checkpoint").bold());
    println!("  Thread:  {}", checkpoint.key.thread_id);
    println!("  Session: {}", checkpoint.key.session_id);
    println!("  Graph:   {}", checkpoint.graph);
    println!("  Node:    {} (step {})", checkpoint.node, checkpoint.step);
    println!("  Phase:   {}", session.current_phase());
    println!(
        "  Written: {}",
        checkpoint.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(source) = session.original_source() {
        println!(
            "  Source:  {} ({}, {} bytes)",
            source.display_name(),
            source.language,
            source.content.len()
        );
    }

    if session.has_errors() {
        println!();
        println!("{}", console::style("Errors:").red());
        for message in session.error_messages() {
            println!("  - {message}");
        }
    }

    println!();
    println!("Execution log:");
    for line in checkpoint.log.render() {
        println!("  {line}");
    }
    println!();
}

pub async fn cmd_list(project_dir: &Path) -> Result<()> {
    let config = load_initialized(project_dir)?;
    warn_if_ephemeral(&config);

    let checkpointer = open_checkpointer(&config);
    let threads = checkpointer
        .list()
        .await
        .context("Failed to list checkpoints")?;

    println!();
    if threads.is_empty() {
        println!("No checkpoints found.");
        println!();
        return Ok(());
    }

    println!("{:<38} {:<10} {:<24} {:<5} Phase", "Thread", "Graph", "Node", "Step");
    println!(
        "{:<38} {:<10} {:<24} {:<5} -----",
        "-".repeat(36),
        "-".repeat(8),
        "-".repeat(22),
        "----"
    );
    for thread_id in threads {
        match checkpointer.get(&thread_id).await {
            Ok(Some(c)) => println!(
                "{:<38} {:<10} {:<24} {:<5} {}",
                thread_id,
                c.graph,
                c.node,
                c.step,
                c.session.current_phase()
            ),
            Ok(None) => {}
            Err(e) => println!(
                "{:<38} {}",
                thread_id,
                console::style(format!("unreadable: {e}")).red()
            ),
        }
    }
    println!();
    Ok(())
}

pub async fn cmd_reset(project_dir: &Path, thread_id: &str, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_initialized(project_dir)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Delete the checkpoint for thread '{thread_id}'? It cannot be resumed afterwards."
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let deleted = open_checkpointer(&config)
        .delete(thread_id)
        .await
        .with_context(|| format!("Failed to delete checkpoint for thread '{thread_id}'"))?;

    if deleted {
        println!("Deleted checkpoint for thread '{thread_id}'");
    } else {
        println!("No checkpoint found for thread '{thread_id}'");
    }
    Ok(())
}

pub fn cmd_audit(project_dir: &Path, command: &AuditCommands) -> Result<()> {
    let config = load_initialized(project_dir)?;
    let audit = AuditLogger::new(&config.audit_dir());

    match command {
        AuditCommands::List => {
            let runs = audit.list_runs()?;
            println!();
            if runs.is_empty() {
                println!("No finished runs recorded.");
                println!();
                return Ok(());
            }
            for path in runs {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match audit.load_run(&path) {
                    Ok(run) => println!(
                        "{:<36} {:<10} {:<12} {}",
                        name,
                        run.graph,
                        outcome_label(&run.outcome),
                        run.thread_id
                    ),
                    Err(e) => println!("{:<36} {}", name, console::style(e).red()),
                }
            }
            println!();
        }
        AuditCommands::Show { file } => {
            // Bare file names are looked up in the runs directory.
            let path = if file.exists() {
                file.clone()
            } else {
                config.audit_dir().join("runs").join(file)
            };
            let run = audit.load_run(&path)?;

            println!();
            println!("{}", console::style("Run record").bold());
            println!("  Run:      {}", run.run_id);
            println!("  Thread:   {}", run.thread_id);
            println!("  Session:  {}", run.session_id);
            println!("  Graph:    {}", run.graph);
            println!("  Outcome:  {}", outcome_label(&run.outcome));
            if let RunOutcome::Failed { node, error } = &run.outcome {
                println!("  Failed:   {} ({error})", node.as_deref().unwrap_or("-"));
            }
            println!("  Steps:    {}", run.steps_executed);
            println!(
                "  Phase:    {}",
                run.final_phase.as_deref().unwrap_or("-")
            );
            if let Some(secs) = run.duration_secs() {
                println!("  Duration: {secs:.2}s");
            }
            if !run.error_messages.is_empty() {
                println!();
                println!("{}", console::style("Errors:").red());
                for message in &run.error_messages {
                    println!("  - {message}");
                }
            }
            println!();
            println!("Execution log:");
            for line in run.log.render() {
                println!("  {line}");
            }
            println!();
        }
    }
    Ok(())
}

fn outcome_label(outcome: &RunOutcome) -> console::StyledObject<&'static str> {
    match outcome {
        RunOutcome::Completed => console::style("completed").green(),
        RunOutcome::InProgress => console::style("in_progress").yellow(),
        RunOutcome::Failed { .. } => console::style("failed").red(),
    }
}
