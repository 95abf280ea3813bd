//! Supervisor error type.

use core_types::FatalError;
use snapshot::SnapshotError;
use std::fmt;

/// Errors that end the supervisor with a nonzero exit.
#[derive(Debug)]
pub enum CliError {
    /// Missing or malformed configuration
    Config(String),
    /// The database directory is missing or unreadable
    Database(String),
    /// No snapshot and no startup sources were found
    MissingSources(String),
    /// A startup source failed to parse
    Parse(String),
    /// Snapshot read failure during startup
    Snapshot(SnapshotError),
    /// An unrecoverable interpreter error escaped the step loop
    Fatal(FatalError),
    /// Other filesystem failure
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "configuration error: {}", msg),
            CliError::Database(msg) => write!(f, "database error: {}", msg),
            CliError::MissingSources(msg) => write!(f, "no startup sources: {}", msg),
            CliError::Parse(msg) => write!(f, "startup parse error: {}", msg),
            CliError::Snapshot(e) => write!(f, "snapshot error: {}", e),
            CliError::Fatal(e) => write!(f, "interpreter error: {}", e),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Snapshot(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SnapshotError> for CliError {
    fn from(e: SnapshotError) -> Self {
        CliError::Snapshot(e)
    }
}

impl From<FatalError> for CliError {
    fn from(e: FatalError) -> Self {
        CliError::Fatal(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

/// Result type for supervisor operations.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = CliError::Config("missing file".to_string());
        assert_eq!(e.to_string(), "configuration error: missing file");
    }
}
