//! OS side of the startup gate: named locks, window lookup and module loading

use std::path::{Path, PathBuf};

use cig_core::{LauncherCheck, LoadedModule, Platform, ProtectError, ProtectResult};
use libloading::{Library, Symbol};

/// Plugin mapped through `libloading`. Unmapped on drop.
#[derive(Debug)]
pub struct NativeModule {
    path: PathBuf,
    lib: Library,
}

impl LoadedModule for NativeModule {
    fn file_path(&self) -> &Path {
        &self.path
    }

    fn invoke_entry(&self, symbol: &str) -> ProtectResult<bool> {
        let mut name = symbol.as_bytes().to_vec();
        name.push(0);

        // SAFETY: the entry point is a plain no-argument C function
        let entry: Symbol<unsafe extern "C" fn()> = match unsafe { self.lib.get(&name) } {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("{}: {}", self.path.display(), e);
                return Ok(false);
            }
        };

        unsafe { entry() };
        Ok(true)
    }
}

/// Platform backed by the running OS.
///
/// Locks claimed here stay held until the value is dropped, so the gate
/// keeps it alive for as long as the client runs.
#[derive(Default)]
pub struct NativePlatform {
    held: Vec<imp::HeldLock>,
    loaded: Vec<PathBuf>,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held_locks(&self) -> usize {
        self.held.len()
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn same_module_name(a: &Path, b: &Path) -> bool {
    match (a.file_name(), b.file_name()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

impl Platform for NativePlatform {
    type Module = NativeModule;

    fn launcher_running(&self, launcher: &LauncherCheck) -> bool {
        let running = match launcher {
            LauncherCheck::Mutex(name) => imp::named_lock_held(name),
            LauncherCheck::Window(title) => imp::window_exists(title),
        };
        tracing::debug!("launcher {:?} running: {}", launcher, running);
        running
    }

    fn claim_instance(&mut self, lock_name: &str) -> ProtectResult<bool> {
        match imp::claim_named_lock(lock_name)? {
            Some(lock) => {
                tracing::info!("holding instance lock {}", lock_name);
                self.held.push(lock);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The loader keys modules by name, so a plugin of the same file name
    /// mapped from another directory counts as loaded too.
    fn module_loaded(&self, path: &Path) -> bool {
        let path = canonical(path);
        self.loaded.iter().any(|p| same_module_name(p, &path))
            || imp::module_mapped(&path)
            || path.file_name().is_some_and(|name| imp::module_mapped(Path::new(name)))
    }

    fn load_module(&mut self, path: &Path) -> ProtectResult<NativeModule> {
        let path = canonical(path);

        // SAFETY: running the plugin's initialisers is the point of loading it
        let lib = unsafe { Library::new(&path) }.map_err(|e| ProtectError::Load {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // re-verification reads the file the loader mapped, not the one asked for
        let mapped = imp::mapped_file(&path).unwrap_or_else(|| path.clone());
        if canonical(&mapped) != path {
            tracing::warn!("{} was mapped from {}", path.display(), mapped.display());
        }

        tracing::info!("loaded {}", mapped.display());
        self.loaded.push(path);
        Ok(NativeModule { path: mapped, lib })
    }
}

#[cfg(windows)]
mod imp {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use cig_core::{ProtectError, ProtectResult};
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use std::path::PathBuf;

    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE};
    use windows_sys::Win32::System::LibraryLoader::{GetModuleFileNameW, GetModuleHandleW};
    use windows_sys::Win32::System::Threading::{CreateMutexW, OpenMutexW};
    use windows_sys::Win32::UI::WindowsAndMessaging::FindWindowW;

    const SYNCHRONIZE: u32 = 0x0010_0000;

    /// Open mutex handle, closed on drop
    pub struct HeldLock(HANDLE);

    impl Drop for HeldLock {
        fn drop(&mut self) {
            unsafe { CloseHandle(self.0) };
        }
    }

    fn wide(s: impl AsRef<OsStr>) -> Vec<u16> {
        s.as_ref().encode_wide().chain(Some(0)).collect()
    }

    pub fn named_lock_held(name: &str) -> bool {
        let name = wide(name);
        let handle = unsafe { OpenMutexW(SYNCHRONIZE, 0, name.as_ptr()) };
        if handle.is_null() {
            return false;
        }
        unsafe { CloseHandle(handle) };
        true
    }

    pub fn claim_named_lock(name: &str) -> ProtectResult<Option<HeldLock>> {
        let wname = wide(name);
        let handle = unsafe { CreateMutexW(std::ptr::null(), 1, wname.as_ptr()) };
        if handle.is_null() {
            return Err(ProtectError::io(name, std::io::Error::last_os_error()));
        }

        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe { CloseHandle(handle) };
            return Ok(None);
        }
        Ok(Some(HeldLock(handle)))
    }

    pub fn window_exists(title: &str) -> bool {
        let title = wide(title);
        let hwnd = unsafe { FindWindowW(std::ptr::null(), title.as_ptr()) };
        !hwnd.is_null()
    }

    pub fn module_mapped(path: &Path) -> bool {
        let path = wide(path.as_os_str());
        let module = unsafe { GetModuleHandleW(path.as_ptr()) };
        !module.is_null()
    }

    /// File the loader mapped for the module registered under `path`
    pub fn mapped_file(path: &Path) -> Option<PathBuf> {
        // verbatim (\\?\) paths may not match, the bare name always does
        let module = [Some(path.as_os_str()), path.file_name()]
            .into_iter()
            .flatten()
            .map(|name| {
                let name = wide(name);
                unsafe { GetModuleHandleW(name.as_ptr()) }
            })
            .find(|module| !module.is_null())?;

        let mut buf = vec![0u16; 32 * 1024];
        let len = unsafe { GetModuleFileNameW(module, buf.as_mut_ptr(), buf.len() as u32) };
        if len == 0 || len as usize >= buf.len() {
            return None;
        }
        Some(PathBuf::from(OsString::from_wide(&buf[..len as usize])))
    }
}

/// Named primitives become advisory locks on files in the temp directory
#[cfg(not(windows))]
mod imp {
    use std::fs::{File, OpenOptions, TryLockError};
    use std::path::{Path, PathBuf};

    use cig_core::{ProtectError, ProtectResult};

    pub struct HeldLock {
        _file: File,
    }

    pub fn lock_path(name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        std::env::temp_dir().join(format!("{file}.lock"))
    }

    pub fn named_lock_held(name: &str) -> bool {
        let Ok(file) = File::open(lock_path(name)) else {
            return false;
        };
        matches!(file.try_lock_shared(), Err(TryLockError::WouldBlock))
    }

    pub fn claim_named_lock(name: &str) -> ProtectResult<Option<HeldLock>> {
        let path = lock_path(name);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| ProtectError::io(&path, e))?;

        match file.try_lock() {
            Ok(()) => Ok(Some(HeldLock { _file: file })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => Err(ProtectError::io(&path, e)),
        }
    }

    pub fn window_exists(title: &str) -> bool {
        tracing::warn!("window lookup is not available here, '{}' not found", title);
        false
    }

    pub fn module_mapped(_path: &Path) -> bool {
        false
    }

    /// The dynamic loader maps the canonical path it was given
    pub fn mapped_file(_path: &Path) -> Option<PathBuf> {
        None
    }
}


#[cfg(all(test, windows))]
mod windows_tests {
    use super::*;

    #[test]
    fn test_module_path_comes_from_loader() {
        let mut platform = NativePlatform::new();
        let module = platform.load_module(Path::new("kernel32.dll")).unwrap();

        // resolved through the search path, reported where it was mapped
        assert!(module.file_path().is_absolute());
        assert!(same_module_name(module.file_path(), Path::new("KERNEL32.DLL")));
        assert!(platform.module_loaded(Path::new("kernel32.dll")));
    }
}
