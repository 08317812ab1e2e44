//! Startup gate: loads the record and walks the checks in a fixed order
//!
//! ```text
//! Unloaded -> ConfigLoaded -> LauncherChecked -> InstanceChecked
//!          -> ClientVerified -> PluginVerified -> Active
//! ```
//!
//! Any failure moves the controller to `Aborted` for good. OS specifics
//! (named locks, window lookup, dynamic loading) come from a [`Platform`].

use std::path::{Path, PathBuf};

use crate::codec::RecordCodec;
use crate::error::{ProtectError, ProtectResult};
use crate::integrity::{self, Verification};
use crate::record::ConfigRecord;

/// Symbol called in the plugin after it is loaded and verified
pub const ENTRY_SYMBOL: &str = "EntryProc";

/// Instance lock name is this prefix followed by the server address
pub const INSTANCE_LOCK_PREFIX: &str = "OPENMU_MAIN_09711_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unloaded,
    ConfigLoaded,
    LauncherChecked,
    InstanceChecked,
    ClientVerified,
    PluginVerified,
    Active,
    Aborted,
}

/// How the launcher announces itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherCheck {
    /// A named mutex created by the launcher
    Mutex(String),
    /// A top-level window with this title
    Window(String),
}

impl LauncherCheck {
    pub fn from_record(record: &ConfigRecord) -> ProtectResult<Option<Self>> {
        let name = record.launcher_name.clone();
        let check = match record.launcher_type {
            0 => return Ok(None),
            1 => LauncherCheck::Mutex(name),
            2 => LauncherCheck::Window(name),
            other => {
                return Err(ProtectError::Configuration(format!(
                    "unknown launcher type {}",
                    other
                )));
            }
        };

        if record.launcher_name.is_empty() {
            return Err(ProtectError::Configuration("launcher name is empty".to_string()));
        }
        Ok(Some(check))
    }

    pub fn name(&self) -> &str {
        match self {
            LauncherCheck::Mutex(name) | LauncherCheck::Window(name) => name,
        }
    }
}

/// A module mapped into the process
pub trait LoadedModule {
    /// File the module was actually loaded from
    fn file_path(&self) -> &Path;

    /// Calls `symbol` if the module exports it. Ok(false) when it does not.
    fn invoke_entry(&self, symbol: &str) -> ProtectResult<bool>;
}

pub trait Platform {
    type Module: LoadedModule;

    fn launcher_running(&self, launcher: &LauncherCheck) -> bool;

    /// Claims the named instance lock for the rest of the process.
    /// Ok(false) when another process already holds it.
    fn claim_instance(&mut self, lock_name: &str) -> ProtectResult<bool>;

    fn module_loaded(&self, path: &Path) -> bool;

    fn load_module(&mut self, path: &Path) -> ProtectResult<Self::Module>;
}

pub struct Controller<P: Platform> {
    platform: P,
    codec: RecordCodec,
    client_dir: PathBuf,
    stage: Stage,
    record: Option<ConfigRecord>,
    plugin: Option<P::Module>,
}

impl<P: Platform> Controller<P> {
    /// Companion file names in the record are resolved against `client_dir`
    pub fn new(platform: P, codec: RecordCodec, client_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            codec,
            client_dir: client_dir.into(),
            stage: Stage::Unloaded,
            record: None,
            plugin: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn record(&self) -> Option<&ConfigRecord> {
        self.record.as_ref()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn plugin(&self) -> Option<&P::Module> {
        self.plugin.as_ref()
    }

    /// Runs every step in order and returns the decoded record
    pub fn run(&mut self, record_path: &Path) -> ProtectResult<&ConfigRecord> {
        self.load_config(record_path)?;
        self.check_launcher()?;
        self.check_instance()?;
        self.verify_client()?;
        self.verify_plugin()?;
        self.activate()?;
        self.loaded()
    }

    pub fn load_config(&mut self, record_path: &Path) -> ProtectResult<()> {
        self.step(Stage::Unloaded, Stage::ConfigLoaded, |this| {
            let record = this.codec.read_file(record_path)?;
            tracing::info!(
                "loaded {} ({} scheme)",
                record_path.display(),
                this.codec.scheme().name()
            );
            this.record = Some(record);
            Ok(())
        })
    }

    pub fn check_launcher(&mut self) -> ProtectResult<()> {
        self.step(Stage::ConfigLoaded, Stage::LauncherChecked, |this| {
            let Some(launcher) = LauncherCheck::from_record(this.loaded()?)? else {
                tracing::debug!("no launcher required");
                return Ok(());
            };

            if !this.platform.launcher_running(&launcher) {
                return Err(ProtectError::LauncherMissing(launcher.name().to_string()));
            }
            Ok(())
        })
    }

    pub fn check_instance(&mut self) -> ProtectResult<()> {
        self.step(Stage::LauncherChecked, Stage::InstanceChecked, |this| {
            let record = this.loaded()?;
            if record.multi_instance_block == 0 {
                tracing::debug!("multiple instances allowed");
                return Ok(());
            }

            let lock_name = format!("{}{}", INSTANCE_LOCK_PREFIX, record.ip_address);
            if !this.platform.claim_instance(&lock_name)? {
                return Err(ProtectError::InstanceRunning(lock_name));
            }
            Ok(())
        })
    }

    pub fn verify_client(&mut self) -> ProtectResult<()> {
        self.step(Stage::InstanceChecked, Stage::ClientVerified, |this| {
            let record = this.loaded()?;
            if record.client_checksum == 0 {
                tracing::debug!("client checksum not stamped, skipping");
                return Ok(());
            }
            if record.client_name.is_empty() {
                return Err(ProtectError::Configuration("client name is empty".to_string()));
            }

            integrity::validate_file_name(&record.client_name)?;
            let path = this.companion_path(&record.client_name);
            integrity::verify(&path, record.client_checksum)?;
            Ok(())
        })
    }

    /// Pre-load check of the plugin file; a zero checksum skips it
    pub fn verify_plugin(&mut self) -> ProtectResult<()> {
        self.step(Stage::ClientVerified, Stage::PluginVerified, |this| {
            let record = this.loaded()?;
            if record.plugin_name.is_empty() {
                if record.plugin_checksum != 0 {
                    return Err(ProtectError::Configuration(
                        "plugin checksum is stamped but plugin name is empty".to_string(),
                    ));
                }
                tracing::debug!("no plugin configured");
                return Ok(());
            }

            integrity::validate_file_name(&record.plugin_name)?;
            let path = this.companion_path(&record.plugin_name);
            integrity::verify(&path, record.plugin_checksum)?;
            Ok(())
        })
    }

    /// Loads the plugin, re-checks the loaded file and calls its entry point.
    ///
    /// Post-load verification follows the checksum sentinel; loading and the
    /// entry call only depend on a plugin being named.
    pub fn activate(&mut self) -> ProtectResult<()> {
        self.step(Stage::PluginVerified, Stage::Active, |this| {
            let record = this.loaded()?;
            if record.plugin_name.is_empty() {
                return Ok(());
            }
            let expected = record.plugin_checksum;
            let path = this.companion_path(&record.plugin_name);

            if this.platform.module_loaded(&path) {
                return Err(ProtectError::Load {
                    path,
                    reason: "plugin is already loaded".to_string(),
                });
            }

            let module = this.platform.load_module(&path)?;

            match integrity::verify(module.file_path(), expected) {
                Ok(Verification::Skipped) => {
                    tracing::debug!("plugin checksum not stamped, post-load check skipped")
                }
                Ok(Verification::Verified(_)) => {}
                Err(e) => {
                    return Err(ProtectError::Load {
                        path: module.file_path().to_path_buf(),
                        reason: format!("loaded file failed verification: {e}"),
                    });
                }
            }

            if module.invoke_entry(ENTRY_SYMBOL)? {
                tracing::info!("called {} in {}", ENTRY_SYMBOL, path.display());
            } else {
                tracing::debug!("{} does not export {}", path.display(), ENTRY_SYMBOL);
            }

            this.plugin = Some(module);
            Ok(())
        })
    }

    fn step<F>(&mut self, expected: Stage, next: Stage, f: F) -> ProtectResult<()>
    where
        F: FnOnce(&mut Self) -> ProtectResult<()>,
    {
        if self.stage != expected {
            let err = ProtectError::Sequence {
                expected,
                actual: self.stage,
            };
            return Err(self.abort(err));
        }

        match f(self) {
            Ok(()) => {
                tracing::debug!("{:?} -> {:?}", expected, next);
                self.stage = next;
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn abort(&mut self, err: ProtectError) -> ProtectError {
        tracing::error!("aborting in {:?}: {}", self.stage, err);
        self.stage = Stage::Aborted;
        err
    }

    fn loaded(&self) -> ProtectResult<&ConfigRecord> {
        self.record.as_ref().ok_or(ProtectError::Sequence {
            expected: Stage::ConfigLoaded,
            actual: self.stage,
        })
    }

    fn companion_path(&self, name: &str) -> PathBuf {
        integrity::companion_path(&self.client_dir, name)
    }
}
