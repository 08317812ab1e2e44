/// Handles the record encoding/decoding: fixed layout + scheme transform
use std::fs;
use std::path::Path;

use crate::error::{ProtectError, ProtectResult};
use crate::layout::RECORD_LEN;
use crate::record::ConfigRecord;
use crate::scheme::{ProtectionScheme, SchemeKind};

/// Layout: [scalar fields | pad | custom tables], RECORD_LEN bytes, transformed as one buffer
pub struct RecordCodec {
    scheme: Box<dyn ProtectionScheme>,
}

impl RecordCodec {
    pub fn new(kind: SchemeKind) -> Self {
        Self::with_scheme(kind.scheme())
    }

    pub fn with_scheme(scheme: Box<dyn ProtectionScheme>) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &dyn ProtectionScheme {
        self.scheme.as_ref()
    }

    /// Encode a record into its on-disk form
    pub fn encode(&self, record: &ConfigRecord) -> Vec<u8> {
        let mut buf = vec![0u8; RECORD_LEN];
        record.write_fields(&mut buf);
        self.scheme.encode(&mut buf);
        buf
    }

    /// Decode an on-disk record. The length is checked before anything else.
    pub fn decode(&self, data: &[u8]) -> ProtectResult<ConfigRecord> {
        if data.len() != RECORD_LEN {
            return Err(ProtectError::RecordSize {
                expected: RECORD_LEN,
                actual: data.len(),
            });
        }

        let mut buf = data.to_vec();
        self.scheme.decode(&mut buf);
        ConfigRecord::read_fields(&buf)
    }

    pub fn read_file(&self, path: &Path) -> ProtectResult<ConfigRecord> {
        let data = fs::read(path).map_err(|e| ProtectError::io(path, e))?;
        tracing::debug!("read {} ({} bytes)", path.display(), data.len());
        self.decode(&data)
    }

    pub fn write_file(&self, path: &Path, record: &ConfigRecord) -> ProtectResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ProtectError::io(parent, e))?;
            }
        }

        let enc = self.encode(record);
        fs::write(path, &enc).map_err(|e| ProtectError::io(path, e))?;
        tracing::debug!("wrote {} ({} bytes, {})", path.display(), enc.len(), self.scheme.name());
        Ok(())
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new(SchemeKind::default())
    }
}

/// Encode with the default keyed scheme
pub fn encode(record: &ConfigRecord) -> Vec<u8> {
    RecordCodec::default().encode(record)
}

/// Decode with the default keyed scheme
pub fn decode(data: &[u8]) -> ProtectResult<ConfigRecord> {
    RecordCodec::default().decode(data)
}
