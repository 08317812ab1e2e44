//! Protection schemes: a named forward/reverse transform pair plus checksum

use std::fmt;
use std::str::FromStr;

use crate::checksum::checksum;
use crate::transform::{RECORD_KEY, legacy_forward, legacy_reverse, scramble, xor_pass};

pub trait ProtectionScheme {
    /// Human-readable scheme name
    fn name(&self) -> &'static str;

    /// Forward pass applied by the encoder tool
    fn encode(&self, buf: &mut [u8]);

    /// Reverse pass applied when reading a record
    fn decode(&self, buf: &mut [u8]);

    fn checksum(&self, data: &[u8]) -> u32 {
        checksum(data)
    }
}

/// Keyed XOR transform with a repeating 20-byte key
pub struct KeyedXorScheme {
    key: [u8; 20],
}

impl KeyedXorScheme {
    pub fn new(key: [u8; 20]) -> Self {
        Self { key }
    }
}

impl Default for KeyedXorScheme {
    fn default() -> Self {
        Self::new(RECORD_KEY)
    }
}

impl ProtectionScheme for KeyedXorScheme {
    fn name(&self) -> &'static str {
        "keyed-xor"
    }

    fn encode(&self, buf: &mut [u8]) {
        scramble(buf, &self.key);
    }

    fn decode(&self, buf: &mut [u8]) {
        // add/sub steps of the forward pass cancel, only the xor is undone
        xor_pass(buf, &self.key);
    }
}

/// Older single-pass transform with fixed bytes, not symmetric
pub struct LegacyScheme;

impl ProtectionScheme for LegacyScheme {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn encode(&self, buf: &mut [u8]) {
        legacy_forward(buf);
    }

    fn decode(&self, buf: &mut [u8]) {
        legacy_reverse(buf);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemeKind {
    #[default]
    KeyedXor,
    Legacy,
}

impl SchemeKind {
    pub fn scheme(self) -> Box<dyn ProtectionScheme> {
        match self {
            SchemeKind::KeyedXor => Box::new(KeyedXorScheme::default()),
            SchemeKind::Legacy => Box::new(LegacyScheme),
        }
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme().name())
    }
}

impl FromStr for SchemeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyed-xor" => Ok(SchemeKind::KeyedXor),
            "legacy" => Ok(SchemeKind::Legacy),
            other => Err(format!("unknown scheme '{}' (expected keyed-xor or legacy)", other)),
        }
    }
}
