//! core functionality for stamping, encoding and verifying
//! the client info record of a game client add-on
//!
//! # Modules
//!
//! - `checksum`: rotate-and-add file checksum
//! - `transform`: keyed XOR and legacy byte transforms
//! - `scheme`: named transform pairs behind one trait
//! - `layout` / `record` / `codec`: fixed record layout and (de)serialization
//! - `integrity`: companion file validation
//! - `settings`: encoder settings file
//! - `controller`: startup gate state machine

pub mod checksum;
pub mod codec;
pub mod controller;
pub mod error;
pub mod integrity;
pub mod layout;
pub mod record;
pub mod scheme;
pub mod settings;
pub mod transform;

// Re-export commonly used items
pub use checksum::checksum;
pub use codec::{RecordCodec, decode, encode};
pub use controller::{Controller, LauncherCheck, LoadedModule, Platform, Stage};
pub use error::{FailureKind, ProtectError, ProtectResult};
pub use integrity::{
    Verification, checksum_of_file, companion_path, validate, validate_file_name, verify,
};
pub use layout::{RECORD_LEN, Table};
pub use record::{ConfigRecord, CustomTables, FileChecksums};
pub use scheme::{KeyedXorScheme, LegacyScheme, ProtectionScheme, SchemeKind};
pub use settings::Settings;
