//! Snapshot error type.

use std::fmt;

/// Errors from writing, reading or restoring snapshots.
#[derive(Debug)]
pub enum SnapshotError {
    /// Filesystem failure
    Io(std::io::Error),
    /// The file is not a well-formed record list
    Format(String),
    /// The snapshot's native tag table does not match this build
    NativeMismatch(String),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "snapshot I/O error: {}", e),
            SnapshotError::Format(msg) => write!(f, "snapshot format error: {}", msg),
            SnapshotError::NativeMismatch(msg) => {
                write!(f, "snapshot native table mismatch: {}", msg)
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Format(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_variants() {
        let e = SnapshotError::Format("bad record".to_string());
        assert_eq!(e.to_string(), "snapshot format error: bad record");
    }
}
