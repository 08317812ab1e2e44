//! Companion file checksum validation

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::checksum::checksum;
use crate::error::{ProtectError, ProtectResult};

/// Longest accepted companion file name, in bytes
pub const MAX_FILE_NAME: usize = 260;

/// Resolves a record file name under `dir`; names may use either separator
pub fn companion_path(dir: &Path, name: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    for part in name.split(['\\', '/']).filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}

/// Outcome of a successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Expected value was the zero sentinel, file not read
    Skipped,
    /// File read and matched, carries the computed value
    Verified(u32),
}

/// Reads the whole file and checksums it. Empty files cannot be verified.
pub fn checksum_of_file(path: &Path) -> ProtectResult<u32> {
    let mut file = File::open(path).map_err(|e| ProtectError::io(path, e))?;

    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| ProtectError::io(path, e))?;

    if data.is_empty() {
        return Err(ProtectError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    Ok(checksum(&data))
}

/// Checks `path` against `expected`. Zero skips the check without any I/O.
pub fn verify(path: &Path, expected: u32) -> ProtectResult<Verification> {
    if expected == 0 {
        tracing::debug!("{}: no checksum stamped, skipping", path.display());
        return Ok(Verification::Skipped);
    }

    let actual = checksum_of_file(path)?;
    if actual != expected {
        return Err(ProtectError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }

    tracing::info!("{}: checksum 0x{:08X} OK", path.display(), actual);
    Ok(Verification::Verified(actual))
}

/// Pass/fail view of [`verify`]
pub fn validate(path: &Path, expected: u32) -> bool {
    verify(path, expected).is_ok()
}

/// Rejects names that are empty, too long or contain anything besides
/// ASCII alphanumerics and `. _ - \ /`
pub fn validate_file_name(name: &str) -> ProtectResult<()> {
    if name.is_empty() {
        return Err(ProtectError::Configuration("file name is empty".to_string()));
    }

    if name.len() >= MAX_FILE_NAME {
        return Err(ProtectError::Configuration(format!(
            "file name is {} bytes long, limit is {}",
            name.len(),
            MAX_FILE_NAME - 1
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '\\' | '/')))
    {
        return Err(ProtectError::Configuration(format!(
            "file name '{}' contains invalid character {:?}",
            name, bad
        )));
    }

    Ok(())
}
