use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use cig_core::{RecordCodec, SchemeKind};
use std::fs;
use std::path::{Path, PathBuf};

const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Timestamped copies of one record file, kept in `backup/` next to it.
///
/// Backups are named `<record stem>_<timestamp>[_<n>].bak`, so records
/// sharing a directory keep separate histories.
pub struct BackupManager {
    record_path: PathBuf,
    backup_dir: PathBuf,
    stem: String,
    scheme: SchemeKind,
}

#[derive(Clone, Debug)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub filename: String,
    pub timestamp: DateTime<Local>,
    pub size: u64,
    /// Decodes as a full record under the manager's scheme
    pub is_valid: bool,
}

impl BackupManager {
    pub fn new(record_path: PathBuf, scheme: SchemeKind) -> Self {
        let backup_dir = record_path
            .parent()
            .map(|p| p.join("backup"))
            .unwrap_or_else(|| PathBuf::from("backup"));
        let stem = record_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("record")
            .to_string();
        Self {
            record_path,
            backup_dir,
            stem,
            scheme,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn owns(&self, name: &str) -> bool {
        name.ends_with(".bak")
            && (name.starts_with(&format!("{}_", self.stem))
                || name.starts_with(&format!("emergency_{}_", self.stem)))
    }

    /// Backups of this record, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.backup_dir).with_context(|| {
            format!("Failed to read backup directory: {}", self.backup_dir.display())
        })?;

        let mut backups = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(filename) = path.file_name().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            if !path.is_file() || !self.owns(&filename) {
                continue;
            }

            let metadata = fs::metadata(&path)?;
            let is_valid = RecordCodec::new(self.scheme).read_file(&path).is_ok();
            backups.push(BackupInfo {
                timestamp: metadata.modified()?.into(),
                size: metadata.len(),
                is_valid,
                filename,
                path,
            });
        }

        // same-second backups tie on mtime, the name suffix breaks the tie
        backups.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(backups)
    }

    /// First free `<prefix>_<timestamp>[_<n>].bak` in the backup directory
    fn next_path(&self, prefix: &str) -> PathBuf {
        let base = format!("{}_{}", prefix, Local::now().format(STAMP_FORMAT));
        let mut path = self.backup_dir.join(format!("{base}.bak"));
        let mut n = 1;
        while path.exists() {
            path = self.backup_dir.join(format!("{base}_{n}.bak"));
            n += 1;
        }
        path
    }

    fn copy_record_to(&self, prefix: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir).context("Failed to create backup directory")?;
        let target = self.next_path(prefix);
        fs::copy(&self.record_path, &target)
            .with_context(|| format!("Failed to back up record to {}", target.display()))?;
        Ok(target)
    }

    /// Copies the current record into the backup directory
    pub fn create_backup(&self) -> Result<PathBuf> {
        if !self.record_path.exists() {
            bail!("Record file does not exist: {}", self.record_path.display());
        }
        self.copy_record_to(&self.stem)
    }

    /// Puts a backup back in place of the record.
    ///
    /// The backup must decode as a record; the record being replaced is kept
    /// as `emergency_<stem>_<timestamp>.bak`.
    pub fn restore_backup(&self, backup_path: &Path) -> Result<()> {
        if !backup_path.exists() {
            bail!("Backup file does not exist: {}", backup_path.display());
        }
        RecordCodec::new(self.scheme)
            .read_file(backup_path)
            .with_context(|| format!("Refusing to restore {}", backup_path.display()))?;

        if self.record_path.exists() {
            let saved = self.copy_record_to(&format!("emergency_{}", self.stem))?;
            tracing::info!("saved current record to {}", saved.display());
        }

        fs::copy(backup_path, &self.record_path).context("Failed to restore backup")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cig_core::{ConfigRecord, encode};
    use tempfile::TempDir;

    fn encoded(customer: &str) -> Vec<u8> {
        encode(&ConfigRecord {
            customer_name: customer.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_create_backup_named_after_record() {
        let temp_dir = TempDir::new().unwrap();
        let record_path = temp_dir.path().join("ClientInfo.bmd");
        fs::write(&record_path, b"record data").unwrap();

        let bm = BackupManager::new(record_path, SchemeKind::KeyedXor);
        let backup_path = bm.create_backup().unwrap();

        assert!(backup_path.starts_with(temp_dir.path().join("backup")));
        let name = backup_path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ClientInfo_"));
        assert_eq!(fs::read(backup_path).unwrap(), b"record data");
    }

    #[test]
    fn test_backups_in_same_second_do_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let record_path = temp_dir.path().join("ClientInfo.bmd");
        let bm = BackupManager::new(record_path.clone(), SchemeKind::KeyedXor);

        let mut paths = Vec::new();
        for round in 0..3u8 {
            fs::write(&record_path, [round]).unwrap();
            paths.push(bm.create_backup().unwrap());
        }

        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
        assert_eq!(bm.list_backups().unwrap().len(), 3);
    }

    #[test]
    fn test_create_backup_without_record_fails() {
        let temp_dir = TempDir::new().unwrap();
        let bm = BackupManager::new(temp_dir.path().join("ClientInfo.bmd"), SchemeKind::KeyedXor);
        assert!(bm.create_backup().is_err());
    }

    #[test]
    fn test_list_backups_only_this_record() {
        let temp_dir = TempDir::new().unwrap();
        let bm = BackupManager::new(temp_dir.path().join("ClientInfo.bmd"), SchemeKind::KeyedXor);
        fs::create_dir_all(bm.backup_dir()).unwrap();

        let dir = bm.backup_dir();
        fs::write(dir.join("ClientInfo_2024-01-01_12-00-00.bak"), encoded("a")).unwrap();
        fs::write(dir.join("ClientInfo_2024-01-02_12-00-00.bak"), b"short").unwrap();
        fs::write(dir.join("Other_2024-01-01_12-00-00.bak"), encoded("b")).unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let backups = bm.list_backups().unwrap();
        assert_eq!(backups.len(), 2);

        let valid: Vec<&str> = backups
            .iter()
            .filter(|b| b.is_valid)
            .map(|b| b.filename.as_str())
            .collect();
        assert_eq!(valid, vec!["ClientInfo_2024-01-01_12-00-00.bak"]);
    }

    #[test]
    fn test_restore_backup_keeps_replaced_record() {
        let temp_dir = TempDir::new().unwrap();
        let record_path = temp_dir.path().join("ClientInfo.bmd");
        let bm = BackupManager::new(record_path.clone(), SchemeKind::KeyedXor);

        let backup_path = temp_dir.path().join("old.bak");
        fs::write(&backup_path, encoded("old")).unwrap();
        fs::write(&record_path, encoded("current")).unwrap();

        bm.restore_backup(&backup_path).unwrap();

        let restored = RecordCodec::default().read_file(&record_path).unwrap();
        assert_eq!(restored.customer_name, "old");

        let saved = bm.list_backups().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].filename.starts_with("emergency_ClientInfo_"));
        assert!(saved[0].is_valid);
    }

    #[test]
    fn test_restore_rejects_undecodable_backup() {
        let temp_dir = TempDir::new().unwrap();
        let record_path = temp_dir.path().join("ClientInfo.bmd");
        fs::write(&record_path, encoded("current")).unwrap();
        let backup_path = temp_dir.path().join("broken.bak");
        fs::write(&backup_path, b"not a record").unwrap();

        let bm = BackupManager::new(record_path.clone(), SchemeKind::KeyedXor);
        assert!(bm.restore_backup(&backup_path).is_err());

        let current = RecordCodec::default().read_file(&record_path).unwrap();
        assert_eq!(current.customer_name, "current");
        assert!(!bm.backup_dir().exists());
    }
}
