//! Failure taxonomy shared by the encoder tool and the runtime gate

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::controller::Stage;

pub type ProtectResult<T> = Result<T, ProtectError>;

#[derive(Error, Debug)]
pub enum ProtectError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File is empty: {}", path.display())]
    EmptyFile { path: PathBuf },

    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSize { expected: usize, actual: usize },

    #[error(
        "Checksum mismatch for {}: expected 0x{expected:08X}, actual 0x{actual:08X}",
        path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Step out of order: expected stage {expected:?}, controller is {actual:?}")]
    Sequence { expected: Stage, actual: Stage },

    #[error("Failed loading module {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Launcher '{0}' is not running, open the game with the launcher")]
    LauncherMissing(String),

    #[error("Another instance is already running ({0})")]
    InstanceRunning(String),
}

/// Coarse grouping used for exit codes and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    IoFailure,
    ValidationFailure,
    ConfigurationError,
    LoadFailure,
    PreconditionFailure,
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::IoFailure => 2,
            FailureKind::ValidationFailure => 3,
            FailureKind::ConfigurationError => 4,
            FailureKind::LoadFailure => 5,
            FailureKind::PreconditionFailure => 6,
        }
    }
}

impl ProtectError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProtectError::Io { .. }
            | ProtectError::EmptyFile { .. }
            | ProtectError::RecordSize { .. } => FailureKind::IoFailure,
            ProtectError::ChecksumMismatch { .. } => FailureKind::ValidationFailure,
            ProtectError::Configuration(_) | ProtectError::Sequence { .. } => {
                FailureKind::ConfigurationError
            }
            ProtectError::Load { .. } => FailureKind::LoadFailure,
            ProtectError::LauncherMissing(_) | ProtectError::InstanceRunning(_) => {
                FailureKind::PreconditionFailure
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// True when the file could not be checked at all, as opposed to
    /// being checked and found different
    pub fn is_unverifiable(&self) -> bool {
        matches!(self, ProtectError::Io { .. } | ProtectError::EmptyFile { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_kind() {
        let errors = [
            ProtectError::EmptyFile { path: "a".into() },
            ProtectError::ChecksumMismatch {
                path: "a".into(),
                expected: 1,
                actual: 2,
            },
            ProtectError::Configuration("x".into()),
            ProtectError::Load {
                path: "a".into(),
                reason: "x".into(),
            },
            ProtectError::InstanceRunning("x".into()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_mismatch_message_shows_both_values() {
        let err = ProtectError::ChecksumMismatch {
            path: "client.bin".into(),
            expected: 0xDEADBEEF,
            actual: 0x0000068E,
        };
        let msg = err.to_string();
        assert!(msg.contains("client.bin"));
        assert!(msg.contains("0xDEADBEEF"));
        assert!(msg.contains("0x0000068E"));
    }

    #[test]
    fn test_unverifiable_vs_mismatch() {
        let missing = ProtectError::io("x", io::Error::from(io::ErrorKind::NotFound));
        let mismatch = ProtectError::ChecksumMismatch {
            path: "x".into(),
            expected: 1,
            actual: 2,
        };
        assert!(missing.is_unverifiable());
        assert!(!mismatch.is_unverifiable());
    }
}
