//! In-memory file sink

use crate::storage::{validate_segment, FileSink, StorageError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Keeps uploads in memory, keyed by file name
#[derive(Default)]
pub struct MemoryFileSink {
    files: RwLock<HashMap<String, Vec<u8>>>,
    /// When set, every write fails
    failing: AtomicBool,
}

impl MemoryFileSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get a stored file
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().get(name).cloned()
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl FileSink for MemoryFileSink {
    async fn write(&self, name: &str, content: &[u8]) -> Result<(), StorageError> {
        validate_segment(name)?;

        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory sink set to fail".to_string()));
        }

        self.files.write().insert(name.to_string(), content.to_vec());
        Ok(())
    }
}
