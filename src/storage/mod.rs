//! File sinks for uploaded content
//!
//! - Disk: writes uploads under a fixed root directory
//! - Memory: keeps uploads in a map (tests and embedding)

mod disk;
mod memory;

pub use disk::DiskFileSink;
pub use memory::MemoryFileSink;

pub use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file name '{0}'")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for uploaded files
///
/// `name` is a single path segment relative to the sink's root.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Store `content` under `name`, replacing anything already there
    async fn write(&self, name: &str, content: &[u8]) -> Result<(), StorageError>;
}

/// Reject names that would escape the upload root
pub(crate) fn validate_segment(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || std::path::Path::new(name).is_absolute();

    if invalid {
        return Err(StorageError::InvalidPath(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("notes.txt").is_ok());
        assert!(validate_segment("photo 1.png").is_ok());
        assert!(validate_segment("..hidden").is_ok());

        assert!(validate_segment("").is_err());
        assert!(validate_segment(".").is_err());
        assert!(validate_segment("..").is_err());
        assert!(validate_segment("../etc/passwd").is_err());
        assert!(validate_segment("dir/file").is_err());
        assert!(validate_segment("dir\\file").is_err());
        assert!(validate_segment("/abs").is_err());
    }
}
