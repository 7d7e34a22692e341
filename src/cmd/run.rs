//! Graph execution: `conduit run` and `conduit resume`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use conduit::audit::{AuditLogger, RunOutcome};
use conduit::checkpoint::Checkpoint;
use conduit::collaborator::{OpenRouterClient, TextGenerator};
use conduit::config::Config;
use conduit::errors::RunError;
use conduit::graph::CompiledGraph;
use conduit::orchestrator::{GraphRunner, RunOutput};
use conduit::pipeline::{self, GraphKind};
use conduit_common::{LanguageType, SourceCode};

use super::{api_key_from_env, load_initialized, open_checkpointer, warn_if_ephemeral};

pub struct RunArgs {
    pub file: PathBuf,
    pub language: Option<LanguageType>,
    pub thread: Option<String>,
    pub session: Option<String>,
    pub graph: Option<GraphKind>,
}

fn build_graph(config: &Config, kind: GraphKind) -> Result<CompiledGraph> {
    let graph = match kind {
        GraphKind::Base => pipeline::base_graph()?,
        GraphKind::Analysis => {
            let client = OpenRouterClient::new(config.openrouter_config(api_key_from_env()?))
                .context("Failed to configure the collaborator client")?;
            let generator: Arc<dyn TextGenerator> = Arc::new(client);
            pipeline::analysis_graph(generator, config.toml.pipeline.on_collaborator_error)?
        }
    };
    Ok(graph)
}

fn build_runner(config: &Config, graph: CompiledGraph) -> GraphRunner {
    let runner = GraphRunner::new(Arc::new(graph), open_checkpointer(config))
        .with_config(config.runner_config());

    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received; stopping after the current node...");
            token.cancel();
        }
    });
    runner
}

fn read_source(file: &Path, language: Option<LanguageType>) -> Result<SourceCode> {
    let language = match language {
        Some(language) => language,
        None => LanguageType::from_path(file).with_context(|| {
            format!(
                "Cannot infer the language of {}; pass --language",
                file.display()
            )
        })?,
    };
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file {}", file.display()))?;
    let mut source = SourceCode::new(content, language);
    if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
        source = source.with_filename(name);
    }
    Ok(source)
}

pub async fn cmd_run(project_dir: &Path, args: RunArgs) -> Result<()> {
    let config = load_initialized(project_dir)?;
    let kind = args.graph.unwrap_or(config.toml.pipeline.graph);
    let source = read_source(&args.file, args.language)?;

    let initial = match &args.session {
        Some(id) => pipeline::create_initial_state_with_id(id, Some(source))?,
        None => pipeline::create_initial_state(Some(source)),
    };
    let thread_id = args
        .thread
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let runner = build_runner(&config, build_graph(&config, kind)?);
    warn_if_ephemeral(&config);

    println!();
    println!(
        "{} {} on thread {}",
        console::style("Running graph").bold(),
        console::style(kind).cyan(),
        console::style(&thread_id).cyan()
    );
    println!("  Session: {}", initial.session.session_id());
    println!();

    let mut audit = AuditLogger::new(&config.audit_dir());
    audit.start_run(&thread_id, initial.session.session_id(), kind.as_str())?;

    let start = Start::new(initial.session.session_id(), 0);
    let result = runner.run(initial, &thread_id).await;
    finish(&runner, &mut audit, &thread_id, &start, result).await
}

pub async fn cmd_resume(project_dir: &Path, thread_id: &str) -> Result<()> {
    let config = load_initialized(project_dir)?;
    warn_if_ephemeral(&config);

    let checkpoint = open_checkpointer(&config)
        .get(thread_id)
        .await
        .with_context(|| format!("Failed to read checkpoint for thread '{thread_id}'"))?
        .ok_or_else(|| RunError::CheckpointNotFound {
            thread_id: thread_id.to_string(),
        })?;
    let kind: GraphKind = checkpoint
        .graph
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .with_context(|| format!("Checkpoint for thread '{thread_id}' names an unknown graph"))?;

    let runner = build_runner(&config, build_graph(&config, kind)?);

    println!();
    println!(
        "{} {} from node {} (step {})",
        console::style("Resuming thread").bold(),
        console::style(thread_id).cyan(),
        console::style(&checkpoint.node).cyan(),
        checkpoint.step
    );
    println!();

    let mut audit = AuditLogger::new(&config.audit_dir());
    if !audit.load_current(thread_id)? {
        audit.start_run(thread_id, &checkpoint.key.session_id, kind.as_str())?;
    }

    let start = Start::new(&checkpoint.key.session_id, checkpoint.step);
    let result = runner.resume(thread_id).await;
    finish(&runner, &mut audit, thread_id, &start, result).await
}

/// Where this invocation picked the thread up.
struct Start {
    session_id: String,
    step: u64,
    at: DateTime<Utc>,
}

impl Start {
    fn new(session_id: &str, step: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            step,
            at: Utc::now(),
        }
    }

    /// The stored checkpoint, unless it belongs to another session.
    fn own(&self, stored: Option<Checkpoint>) -> Option<Checkpoint> {
        stored.filter(|c| c.key.session_id == self.session_id)
    }

    /// Nodes this invocation committed, going by the stored checkpoint.
    fn steps_committed(&self, stored: &Checkpoint) -> usize {
        if stored.created_at < self.at {
            return 0;
        }
        usize::try_from(stored.step.saturating_sub(self.step)).unwrap_or(usize::MAX)
    }
}

/// Record the outcome in the audit trail and print a summary.
async fn finish(
    runner: &GraphRunner,
    audit: &mut AuditLogger,
    thread_id: &str,
    start: &Start,
    result: Result<RunOutput, RunError>,
) -> Result<()> {
    match result {
        Ok(output) => {
            let record = audit.finish_run(
                RunOutcome::Completed,
                output.steps_executed,
                Some(output.state.session.current_phase()),
                output.state.session.error_messages(),
                &output.state.log,
            )?;
            print_output(&output);
            println!("  Audit record: {}", record.display());
            println!();
            Ok(())
        }
        Err(e) => {
            // The stored checkpoint holds the log up to the last good node.
            let stored = match runner.checkpoint(thread_id).await {
                Ok(stored) => start.own(stored),
                Err(err) => {
                    warn!(
                        thread_id,
                        error = %err,
                        "Failed to read the last checkpoint for the audit record"
                    );
                    None
                }
            };
            let steps = stored.as_ref().map_or(0, |c| start.steps_committed(c));
            let state = stored.as_ref().map(|c| c.to_state());
            let mut errors = state
                .as_ref()
                .map(|s| s.session.error_messages().to_vec())
                .unwrap_or_default();
            errors.push(e.to_string());

            let log = state.as_ref().map(|s| s.log.clone()).unwrap_or_default();
            let record = audit.finish_run(
                RunOutcome::Failed {
                    node: e.node().map(str::to_string),
                    error: e.to_string(),
                },
                steps,
                state.as_ref().map(|s| s.session.current_phase()),
                &errors,
                &log,
            )?;

            println!("{} {}", console::style("Run failed:").red().bold(), e);
            match e.last_checkpoint() {
                Some(key) => println!(
                    "  Last checkpoint: {key}. Run 'conduit resume {thread_id}' to continue."
                ),
                None => println!("  No checkpoint was written."),
            }
            println!("  Audit record: {}", record.display());
            println!();
            Err(e.into())
        }
    }
}

fn print_output(output: &RunOutput) {
    let session = &output.state.session;
    println!("{}", console::style("Completed").green().bold());
    println!("  Phase:          {}", session.current_phase());
    println!(
        "  Last node:      {}",
        output.last_node.as_deref().unwrap_or("-")
    );
    println!("  Steps executed: {}", output.steps_executed);

    if let Some(detection) = session.language_detection() {
        println!(
            "  Language:       {} (confidence {:.2})",
            detection.detected_language, detection.confidence
        );
    }
    if let Some(deps) = session.dependencies() {
        println!(
            "  Dependencies:   {} imports, {} external, {} standard",
            deps.imports.len(),
            deps.external_libraries.len(),
            deps.standard_libraries.len()
        );
    }
    if session.has_errors() {
        println!("  {}", console::style("Errors:").red());
        for message in session.error_messages() {
            println!("    - {message}");
        }
    }

    println!();
    println!("Execution log:");
    for line in output.state.log.render() {
        println!("  {line}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit::graph::GraphState;
    use conduit_common::SessionState;

    fn stored(session_id: &str, step: u64) -> Checkpoint {
        let session = SessionState::create(session_id).unwrap();
        Checkpoint::new("t-1", step, "base", "validation", &GraphState::new(session))
    }

    #[test]
    fn test_foreign_session_checkpoint_is_ignored() {
        let start = Start::new("new-session", 0);
        assert!(start.own(Some(stored("old-session", 2))).is_none());
        assert!(start.own(Some(stored("new-session", 1))).is_some());
        assert!(start.own(None).is_none());
    }

    #[test]
    fn test_steps_committed_counts_from_start_step() {
        let start = Start::new("abc", 1);
        assert_eq!(start.steps_committed(&stored("abc", 3)), 2);
        assert_eq!(start.steps_committed(&stored("abc", 1)), 0);
    }

    #[test]
    fn test_checkpoint_older_than_start_counts_nothing() {
        let mut old = stored("abc", 2);
        let start = Start::new("abc", 0);
        old.created_at = start.at - chrono::Duration::seconds(5);
        assert_eq!(start.steps_committed(&old), 0);
    }
}
