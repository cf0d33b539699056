pub mod handle;
pub mod mount;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::Arc;

use anyhow::Context as _;

use crate::config::MachineConfig;
use crate::error::{FsError, FsResult};

pub use handle::{FileHandle, OpenMode};
use handle::HandleBudget;
pub use mount::{combine as combine_paths, MountTable, ROM_PREFIX};
use mount::split_virtual;

/// Host junk that never shows up in listings or wildcard matches.
const IGNORED_ENTRIES: [&str; 2] = [".DS_Store", "desktop.ini"];

/// The virtual filesystem sandbox: every persistent-storage operation the
/// guest performs goes through here. Virtual paths are resolved against the
/// mount table by pure segment arithmetic, so no input, however many `..`
/// segments it stacks, reaches storage outside the configured mounts.
pub struct Sandbox {
    mounts: Mutex<MountTable>,
    budget: Arc<HandleBudget>,
}

impl Sandbox {
    pub fn new(table: MountTable, max_open_handles: usize) -> Self {
        Self {
            mounts: Mutex::new(table),
            budget: Arc::new(HandleBudget::new(max_open_handles)),
        }
    }

    /// Builds the sandbox a config describes: creates the root directory,
    /// applies the mount list (the boot phase may claim the `rom` prefix),
    /// then freezes it.
    pub fn from_config(config: &MachineConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.root)
            .with_context(|| format!("create machine root {}", config.root.display()))?;
        let mut table = MountTable::new(config.root.clone());
        for spec in &config.mounts {
            if !table.mount(&spec.real_path, &spec.virtual_path, spec.read_only) {
                anyhow::bail!(
                    "cannot mount {} at {} (source must be a usable directory, prefix must be free)",
                    spec.real_path.display(),
                    spec.virtual_path
                );
            }
        }
        table.finish_init();
        Ok(Self::new(table, config.max_open_handles))
    }

    fn table(&self) -> MutexGuard<'_, MountTable> {
        self.mounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_handles(&self) -> usize {
        self.budget.open_count()
    }

    /// Maps a virtual path to its real location. This is the containment
    /// boundary: escape attempts come back as `InvalidPath`, never as a host
    /// path.
    pub fn resolve(&self, vpath: &str) -> FsResult<PathBuf> {
        self.table()
            .resolve(vpath)
            .ok_or_else(|| FsError::InvalidPath(vpath.to_string()))
    }

    pub fn open(&self, vpath: &str, mode: OpenMode) -> FsResult<FileHandle> {
        let guard = self.budget.acquire().ok_or(FsError::ResourceExhausted)?;
        let (real, read_only) = {
            let table = self.table();
            let real = table
                .resolve(vpath)
                .ok_or_else(|| FsError::InvalidPath(vpath.to_string()))?;
            let ro = table.read_only(vpath).unwrap_or(false);
            (real, ro)
        };
        if mode.writes() && read_only {
            return Err(FsError::PermissionDenied(vpath.to_string()));
        }
        let file = open_host(&real, mode).map_err(|e| FsError::from_io(vpath, e))?;
        Ok(FileHandle::new(vpath.to_string(), mode, file, guard))
    }

    /// Directory listing: host entries merged with mount points synthesized
    /// directly under the path, junk skipped, deduplicated, sorted.
    pub fn list(&self, vpath: &str) -> FsResult<Vec<String>> {
        let (real, synthesized) = {
            let table = self.table();
            let real = table
                .resolve(vpath)
                .ok_or_else(|| FsError::InvalidPath(vpath.to_string()))?;
            (real, table.mounts_under(vpath))
        };
        let rd = std::fs::read_dir(&real).map_err(|e| FsError::from_io(vpath, e))?;
        let mut names = std::collections::BTreeSet::new();
        for entry in rd {
            let entry = entry.map_err(|e| FsError::from_io(vpath, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if IGNORED_ENTRIES.contains(&name.as_str()) {
                continue;
            }
            names.insert(name);
        }
        names.extend(synthesized);
        Ok(names.into_iter().collect())
    }

    /// True under a read-only mount, or when the host itself denies writes.
    pub fn is_read_only(&self, vpath: &str) -> FsResult<bool> {
        let (real, mounted_ro) = {
            let table = self.table();
            let ro = table
                .read_only(vpath)
                .ok_or_else(|| FsError::InvalidPath(vpath.to_string()))?;
            let real = table
                .resolve(vpath)
                .ok_or_else(|| FsError::InvalidPath(vpath.to_string()))?;
            (real, ro)
        };
        if mounted_ro {
            return Ok(true);
        }
        match std::fs::metadata(&real) {
            Ok(meta) => Ok(meta.permissions().readonly()),
            Err(_) => Ok(false),
        }
    }

    /// Pure join + normalization; see [`mount::combine`].
    pub fn combine(&self, base: &str, local: &str) -> FsResult<String> {
        combine_paths(base, local)
            .ok_or_else(|| FsError::InvalidPath(format!("{base}/{local}")))
    }

    pub fn exists(&self, vpath: &str) -> FsResult<bool> {
        let real = self.resolve(vpath)?;
        Ok(real.symlink_metadata().is_ok())
    }

    pub fn is_dir(&self, vpath: &str) -> FsResult<bool> {
        let real = self.resolve(vpath)?;
        Ok(real.metadata().map(|m| m.is_dir()).unwrap_or(false))
    }

    pub fn size(&self, vpath: &str) -> FsResult<u64> {
        let real = self.resolve(vpath)?;
        let meta = std::fs::metadata(&real).map_err(|e| FsError::from_io(vpath, e))?;
        Ok(meta.len())
    }

    /// Free space on the host filesystem backing the resolved mount.
    pub fn free_space(&self, vpath: &str) -> FsResult<u64> {
        let real = self.resolve(vpath)?;
        // statvfs needs an existing path; back off to the nearest existing
        // ancestor of the resolved location.
        let mut probe: &Path = &real;
        while !probe.exists() {
            match probe.parent() {
                Some(parent) => probe = parent,
                None => break,
            }
        }
        host_free_space(probe).map_err(|e| FsError::from_io(vpath, e))
    }

    pub fn make_dir(&self, vpath: &str) -> FsResult<()> {
        let real = self.resolve_writable(vpath)?;
        std::fs::create_dir_all(&real).map_err(|e| FsError::from_io(vpath, e))
    }

    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let src = self.resolve_writable(from)?;
        let dst = self.resolve_writable(to)?;
        std::fs::rename(&src, &dst).map_err(|e| FsError::from_io(from, e))
    }

    pub fn copy(&self, from: &str, to: &str) -> FsResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve_writable(to)?;
        let meta = std::fs::metadata(&src).map_err(|e| FsError::from_io(from, e))?;
        if meta.is_dir() {
            return Err(FsError::unsupported(from, "cannot copy a directory"));
        }
        let mut input = File::open(&src).map_err(|e| FsError::from_io(from, e))?;
        let mut output = File::create(&dst).map_err(|e| FsError::from_io(to, e))?;
        io::copy(&mut input, &mut output).map_err(|e| FsError::from_io(to, e))?;
        Ok(())
    }

    /// Removes a file or a directory tree.
    pub fn delete(&self, vpath: &str) -> FsResult<()> {
        let real = self.resolve_writable(vpath)?;
        let meta = real
            .symlink_metadata()
            .map_err(|e| FsError::from_io(vpath, e))?;
        let res = if meta.is_dir() {
            std::fs::remove_dir_all(&real)
        } else {
            std::fs::remove_file(&real)
        };
        res.map_err(|e| FsError::from_io(vpath, e))
    }

    /// Name of the mount a path lives on (`"hdd"` for the root mount).
    pub fn drive(&self, vpath: &str) -> FsResult<String> {
        self.table()
            .drive(vpath)
            .ok_or_else(|| FsError::InvalidPath(vpath.to_string()))
    }

    /// `*`-per-segment wildcard search over the merged virtual tree. Results
    /// are canonical virtual paths, sorted.
    pub fn find(&self, pattern: &str) -> FsResult<Vec<String>> {
        let segs =
            split_virtual(pattern).ok_or_else(|| FsError::InvalidPath(pattern.to_string()))?;
        if segs.is_empty() {
            return Ok(Vec::new());
        }
        let mut options: Vec<String> = vec!["/".to_string()];
        for seg in &segs {
            let mut next = Vec::new();
            for opt in &options {
                // Non-directories simply stop matching.
                let Ok(entries) = self.list(opt) else {
                    continue;
                };
                for name in entries {
                    if seg.as_str() == "*" || name == seg.as_str() {
                        if opt == "/" {
                            next.push(format!("/{name}"));
                        } else {
                            next.push(format!("{opt}/{name}"));
                        }
                    }
                }
            }
            options = next;
        }
        options.sort();
        Ok(options)
    }

    /// Mounts `real` at `vpath` at runtime. The `rom` prefix is frozen after
    /// boot.
    pub fn mount(&self, real: &Path, vpath: &str, read_only: bool) -> bool {
        self.table().mount(real, vpath, read_only)
    }

    pub fn unmount(&self, vpath: &str) -> bool {
        self.table().unmount(vpath)
    }

    /// Snapshot of the mount table: (virtual path, real path, read-only).
    pub fn mounts(&self) -> Vec<(String, PathBuf, bool)> {
        self.table()
            .list()
            .iter()
            .map(|m| {
                (
                    m.virtual_path(),
                    m.real_path().to_path_buf(),
                    m.is_read_only(),
                )
            })
            .collect()
    }

    fn resolve_writable(&self, vpath: &str) -> FsResult<PathBuf> {
        let table = self.table();
        let real = table
            .resolve(vpath)
            .ok_or_else(|| FsError::InvalidPath(vpath.to_string()))?;
        if table.read_only(vpath).unwrap_or(false) {
            return Err(FsError::PermissionDenied(vpath.to_string()));
        }
        Ok(real)
    }
}

/// Last segment of a virtual path; `"/"` for the root itself.
pub fn base_name(vpath: &str) -> Option<String> {
    let segs = split_virtual(vpath)?;
    Some(segs.last().cloned().unwrap_or_else(|| "/".to_string()))
}

/// Canonical parent of a virtual path.
pub fn parent_dir(vpath: &str) -> Option<String> {
    let mut segs = split_virtual(vpath)?;
    segs.pop();
    Some(format!("/{}", segs.join("/")))
}

fn open_host(real: &Path, mode: OpenMode) -> io::Result<File> {
    match mode {
        OpenMode::ReadText | OpenMode::ReadBinary => OpenOptions::new().read(true).open(real),
        OpenMode::WriteText | OpenMode::WriteBinary => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(real),
        OpenMode::AppendText | OpenMode::AppendBinary => {
            OpenOptions::new().append(true).create(true).open(real)
        }
    }
}

#[cfg(unix)]
fn host_free_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt as _;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(st.f_bavail as u64 * st.f_frsize as u64)
}

#[cfg(not(unix))]
fn host_free_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free-space query not supported on this host",
    ))
}

#[cfg(test)]
mod tests {
    use super::{base_name, parent_dir};

    #[test]
    fn virtual_basename_and_dirname() {
        assert_eq!(base_name("/rom/programs").as_deref(), Some("programs"));
        assert_eq!(base_name("rom").as_deref(), Some("rom"));
        assert_eq!(base_name("/").as_deref(), Some("/"));
        assert_eq!(base_name("/.."), None);
        assert_eq!(parent_dir("/rom/programs/ls").as_deref(), Some("/rom/programs"));
        assert_eq!(parent_dir("/rom").as_deref(), Some("/"));
    }
}
