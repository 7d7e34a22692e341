//! Execution log and run records.
//!
//! [`ExecutionLog`] is the human-readable trail that travels with a session
//! through every node. [`RunRecord`] is the per-run summary that
//! [`AuditLogger`] persists under `.conduit/audit/runs/`.

pub mod logger;

pub use logger::AuditLogger;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of the execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn render(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.message
        )
    }
}

/// Append-only, time-ordered list of log lines.
///
/// Insertion order is the total order. Timestamps never decrease: if the
/// clock steps backwards the new entry reuses the previous timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        let timestamp = match self.entries.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.entries.push(LogEntry {
            timestamp,
            message: message.into(),
        });
    }

    /// Formatted lines, `"[<rfc3339>] <message>"`, oldest first.
    pub fn render(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(LogEntry::render)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.message.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }
}

/// How a recorded run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    InProgress,
    Completed,
    Failed {
        node: Option<String>,
        error: String,
    },
}

/// Summary of one `run`/`resume` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub thread_id: String,
    pub session_id: String,
    pub graph: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    #[serde(default)]
    pub steps_executed: usize,
    #[serde(default)]
    pub final_phase: Option<String>,
    #[serde(default)]
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub log: ExecutionLog,
}

impl RunRecord {
    pub fn new(thread_id: &str, session_id: &str, graph: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            thread_id: thread_id.to_string(),
            session_id: session_id.to_string(),
            graph: graph.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            outcome: RunOutcome::InProgress,
            steps_executed: 0,
            final_phase: None,
            error_messages: Vec::new(),
            log: ExecutionLog::new(),
        }
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.ended_at = Some(Utc::now());
        self.outcome = outcome;
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_insertion_order() {
        let mut log = ExecutionLog::new();
        log.append("Initial state created");
        log.append("System started");
        log.append("Phase updated to: initialized");

        let messages: Vec<&str> = log.messages().collect();
        assert_eq!(
            messages,
            [
                "Initial state created",
                "System started",
                "Phase updated to: initialized"
            ]
        );
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.last().map(|e| e.message.as_str()),
            Some("Phase updated to: initialized")
        );
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let mut log = ExecutionLog::new();
        for i in 0..50 {
            log.append(format!("line {i}"));
        }
        assert!(
            log.entries()
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
    }

    #[test]
    fn test_append_clamps_future_timestamp() {
        let future = Utc::now() + chrono::Duration::hours(1);
        let mut log = ExecutionLog {
            entries: vec![LogEntry {
                timestamp: future,
                message: "from a fast clock".into(),
            }],
        };
        log.append("after clock step");
        assert_eq!(log.entries()[1].timestamp, future);
    }

    #[test]
    fn test_render_is_repeatable() {
        let mut log = ExecutionLog::new();
        log.append("Basic validation executed");

        let first: Vec<String> = log.render().collect();
        let second: Vec<String> = log.render().collect();
        assert_eq!(first, second);
        assert!(first[0].starts_with('['));
        assert!(first[0].ends_with("] Basic validation executed"));
    }

    #[test]
    fn test_log_serializes_as_array() {
        let mut log = ExecutionLog::new();
        log.append("one");
        let value = serde_json::to_value(&log).unwrap();
        assert!(value.is_array());
        let back: ExecutionLog = serde_json::from_value(value).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_run_record_finish() {
        let mut record = RunRecord::new("t-1", "abc", "base");
        assert_eq!(record.outcome, RunOutcome::InProgress);
        assert!(record.duration_secs().is_none());

        record.finish(RunOutcome::Completed);
        assert!(record.ended_at.is_some());
        assert!(record.duration_secs().unwrap() >= 0.0);
    }

    #[test]
    fn test_run_outcome_wire_format() {
        let failed = RunOutcome::Failed {
            node: Some("validation".into()),
            error: "boom".into(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["node"], "validation");
    }
}
