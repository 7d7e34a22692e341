use super::{ExecutionLog, RunOutcome, RunRecord};
use crate::util::thread_file_stem;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Persists [`RunRecord`]s for one run at a time.
///
/// While a run is active its record lives in `current-<thread>.json`, named by
/// the SHA-256 of the thread id. `finish_run` moves it into `runs/`.
pub struct AuditLogger {
    audit_dir: PathBuf,
    current_run: Option<RunRecord>,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            audit_dir: audit_dir.to_path_buf(),
            current_run: None,
        }
    }

    fn current_file(&self, thread_id: &str) -> PathBuf {
        self.audit_dir
            .join(format!("current-{}.json", thread_file_stem(thread_id)))
    }

    pub fn start_run(&mut self, thread_id: &str, session_id: &str, graph: &str) -> Result<()> {
        fs::create_dir_all(&self.audit_dir).with_context(|| {
            format!("Failed to create audit dir {}", self.audit_dir.display())
        })?;
        self.current_run = Some(RunRecord::new(thread_id, session_id, graph));
        self.save_current()
    }

    /// Finish the active run with `outcome`, copying the final log and errors.
    ///
    /// Returns the path of the written record. Errors if no run is active.
    pub fn finish_run(
        &mut self,
        outcome: RunOutcome,
        steps_executed: usize,
        final_phase: Option<&str>,
        error_messages: &[String],
        log: &ExecutionLog,
    ) -> Result<PathBuf> {
        let mut run = self
            .current_run
            .take()
            .ok_or_else(|| anyhow::anyhow!("No current run to finish"))?;

        run.steps_executed = steps_executed;
        run.final_phase = final_phase.map(str::to_string);
        run.error_messages = error_messages.to_vec();
        run.log = log.clone();
        run.finish(outcome);

        let runs_dir = self.audit_dir.join("runs");
        fs::create_dir_all(&runs_dir).context("Failed to create audit runs dir")?;

        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &run.run_id.simple().to_string()[..8]
        );
        let run_file = runs_dir.join(&filename);

        let json = serde_json::to_string_pretty(&run).context("Failed to serialize run record")?;
        fs::write(&run_file, json).context("Failed to write run record")?;

        let current = self.current_file(&run.thread_id);
        if current.exists() {
            fs::remove_file(&current)
                .with_context(|| format!("Failed to remove {}", current.display()))?;
        }

        Ok(run_file)
    }

    pub fn save_current(&self) -> Result<()> {
        if let Some(ref run) = self.current_run {
            let json =
                serde_json::to_string_pretty(run).context("Failed to serialize current run")?;
            fs::write(self.current_file(&run.thread_id), json)
                .context("Failed to write current run file")?;
        }
        Ok(())
    }

    /// Load an interrupted run for `thread_id`, if one was left behind.
    pub fn load_current(&mut self, thread_id: &str) -> Result<bool> {
        let path = self.current_file(thread_id);
        if !path.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(&path).context("Failed to read current run file")?;
        let run: RunRecord =
            serde_json::from_str(&content).context("Failed to parse current run file")?;
        self.current_run = Some(run);
        Ok(true)
    }

    pub fn current_run(&self) -> Option<&RunRecord> {
        self.current_run.as_ref()
    }

    /// Finished run records, most recent first.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let runs_dir = self.audit_dir.join("runs");
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<RunRecord> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run record {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run record {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_logger() -> (AuditLogger, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let logger = AuditLogger::new(dir.path());
        (logger, dir)
    }

    fn sample_log() -> ExecutionLog {
        let mut log = ExecutionLog::new();
        log.append("Initial state created");
        log.append("Phase updated to: initialized");
        log
    }

    #[test]
    fn test_finish_without_active_run_returns_err() {
        let (mut logger, _dir) = setup_logger();
        let result = logger.finish_run(RunOutcome::Completed, 0, None, &[], &ExecutionLog::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_start_run_creates_current_file_per_thread() {
        let (mut logger, dir) = setup_logger();
        logger.start_run("thread/a", "abc", "base").unwrap();

        let expected = dir
            .path()
            .join(format!("current-{}.json", thread_file_stem("thread/a")));
        assert!(expected.exists());
    }

    #[test]
    fn test_finish_run_writes_record_and_removes_current() {
        let (mut logger, dir) = setup_logger();
        logger.start_run("t-1", "abc", "base").unwrap();

        let path = logger
            .finish_run(
                RunOutcome::Completed,
                2,
                Some("validated"),
                &["warn".to_string()],
                &sample_log(),
            )
            .unwrap();

        assert!(path.starts_with(dir.path().join("runs")));
        assert!(logger.current_run().is_none());
        assert!(
            !dir.path()
                .join(format!("current-{}.json", thread_file_stem("t-1")))
                .exists()
        );

        let record = logger.load_run(&path).unwrap();
        assert_eq!(record.thread_id, "t-1");
        assert_eq!(record.steps_executed, 2);
        assert_eq!(record.final_phase.as_deref(), Some("validated"));
        assert_eq!(record.error_messages, vec!["warn"]);
        assert_eq!(record.log.len(), 2);
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_load_current_after_interruption() {
        let (mut logger, dir) = setup_logger();
        logger.start_run("t-2", "abc", "analysis").unwrap();

        let mut second = AuditLogger::new(dir.path());
        assert!(second.load_current("t-2").unwrap());
        assert_eq!(second.current_run().unwrap().graph, "analysis");
        assert!(!second.load_current("other").unwrap());
    }

    #[test]
    fn test_long_thread_id_round_trip() {
        let (mut logger, dir) = setup_logger();
        let thread_id = "x".repeat(300);
        logger.start_run(&thread_id, "abc", "base").unwrap();

        let mut second = AuditLogger::new(dir.path());
        assert!(second.load_current(&thread_id).unwrap());
        let path = second
            .finish_run(RunOutcome::Completed, 1, None, &[], &sample_log())
            .unwrap();
        assert_eq!(second.load_run(&path).unwrap().thread_id, thread_id);
        assert!(!second.load_current(&thread_id).unwrap());
    }

    #[test]
    fn test_list_runs_most_recent_first() {
        let (mut logger, _dir) = setup_logger();
        assert!(logger.list_runs().unwrap().is_empty());

        for thread in ["a", "b"] {
            logger.start_run(thread, "abc", "base").unwrap();
            logger
                .finish_run(RunOutcome::Completed, 1, None, &[], &sample_log())
                .unwrap();
        }

        let runs = logger.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0] >= runs[1]);
    }
}
