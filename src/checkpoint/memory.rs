use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{Checkpoint, Checkpointer, check_thread_id};
use crate::errors::CheckpointError;

/// In-process checkpoint store.
///
/// Snapshots are kept serialized so a read always yields an independent copy
/// and goes through the same validation as the file store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    snapshots: DashMap<String, Vec<u8>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        check_thread_id(checkpoint.thread_id())?;
        let bytes = checkpoint.to_json()?;
        debug!(
            thread_id = checkpoint.thread_id(),
            step = checkpoint.step,
            bytes = bytes.len(),
            "Stored checkpoint in memory"
        );
        self.snapshots
            .insert(checkpoint.thread_id().to_string(), bytes);
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        check_thread_id(thread_id)?;
        match self.snapshots.get(thread_id) {
            Some(bytes) => Checkpoint::from_json(thread_id, bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        check_thread_id(thread_id)?;
        Ok(self.snapshots.remove(thread_id).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut threads: Vec<String> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        threads.sort();
        Ok(threads)
    }
}
