use std::path::{Path, PathBuf};

/// Mount prefix reserved for the system image; guests cannot mount or
/// unmount it once the machine is up.
pub const ROM_PREFIX: &str = "rom";

/// Splits a virtual path into canonical segments: empty and `.` segments
/// drop, `..` pops. Popping past the root is an escape attempt and yields
/// `None`; containment never consults the host filesystem.
pub fn split_virtual(path: &str) -> Option<Vec<String>> {
    let mut segs: Vec<String> = Vec::new();
    for raw in path.split('/') {
        match raw {
            "" | "." => {}
            ".." => {
                if segs.pop().is_none() {
                    return None;
                }
            }
            seg => segs.push(seg.to_string()),
        }
    }
    Some(segs)
}

/// Canonical display form of a virtual path: leading separator, one
/// separator per join.
pub fn canonical(path: &str) -> Option<String> {
    let segs = split_virtual(path)?;
    Some(format!("/{}", segs.join("/")))
}

/// Joins two virtual paths and canonicalizes the result. Never produces a
/// doubled or missing separator regardless of how the inputs are decorated.
pub fn combine(base: &str, local: &str) -> Option<String> {
    canonical(&format!("{base}/{local}"))
}

#[derive(Debug, Clone)]
pub struct Mount {
    prefix: Vec<String>,
    real: PathBuf,
    read_only: bool,
}

impl Mount {
    pub fn virtual_path(&self) -> String {
        format!("/{}", self.prefix.join("/"))
    }

    pub fn real_path(&self) -> &Path {
        &self.real
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// Ordered bindings from virtual prefixes to real paths, plus the implicit
/// writable root mount. Longest matching prefix wins; among equal lengths the
/// earliest mount wins.
#[derive(Debug)]
pub struct MountTable {
    root: PathBuf,
    mounts: Vec<Mount>,
    initializing: bool,
}

impl MountTable {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            mounts: Vec::new(),
            initializing: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ends the boot phase; from here on the `rom` prefix is frozen.
    pub fn finish_init(&mut self) {
        self.initializing = false;
    }

    fn best_match<'a>(&'a self, segs: &[String]) -> (usize, &'a Path, bool) {
        let mut best: (usize, &Path, bool) = (0, &self.root, false);
        for m in &self.mounts {
            if m.prefix.len() > best.0
                && segs.len() >= m.prefix.len()
                && m.prefix.iter().zip(segs.iter()).all(|(a, b)| a == b)
            {
                best = (m.prefix.len(), &m.real, m.read_only);
            }
        }
        best
    }

    /// Maps a virtual path to the real path behind the longest matching
    /// mount. `None` on escape attempts.
    pub fn resolve(&self, vpath: &str) -> Option<PathBuf> {
        let segs = split_virtual(vpath)?;
        let (matched, base, _) = self.best_match(&segs);
        let mut real = base.to_path_buf();
        for seg in &segs[matched..] {
            real.push(seg);
        }
        Some(real)
    }

    /// Whether the mount owning the path is read-only. `None` on escape.
    pub fn read_only(&self, vpath: &str) -> Option<bool> {
        let segs = split_virtual(vpath)?;
        Some(self.best_match(&segs).2)
    }

    /// Drive label for the path: the owning mount's virtual prefix, or
    /// `"hdd"` for the root mount.
    pub fn drive(&self, vpath: &str) -> Option<String> {
        let segs = split_virtual(vpath)?;
        let (matched, _, _) = self.best_match(&segs);
        if matched == 0 {
            return Some("hdd".to_string());
        }
        Some(segs[..matched].join("/"))
    }

    /// Names of mount points sitting directly under `vpath`. These exist
    /// only in the table, never on the host disk, and get merged into
    /// directory listings.
    pub fn mounts_under(&self, vpath: &str) -> Vec<String> {
        let Some(segs) = split_virtual(vpath) else {
            return Vec::new();
        };
        self.mounts
            .iter()
            .filter(|m| {
                m.prefix.len() == segs.len() + 1
                    && segs.iter().zip(m.prefix.iter()).all(|(a, b)| a == b)
            })
            .map(|m| m.prefix[segs.len()].clone())
            .collect()
    }

    /// Binds `real` at `vpath`. Refuses escapes, the bare root, a real path
    /// that is not a usable directory, and (after boot) the reserved `rom`
    /// prefix. Re-mounting an existing prefix succeeds only if it names the
    /// same real path.
    pub fn mount(&mut self, real: &Path, vpath: &str, read_only: bool) -> bool {
        let Ok(meta) = std::fs::metadata(real) else {
            return false;
        };
        if !meta.is_dir() || std::fs::read_dir(real).is_err() {
            return false;
        }
        if !read_only && meta.permissions().readonly() {
            return false;
        }
        let Some(segs) = split_virtual(vpath) else {
            return false;
        };
        if segs.is_empty() {
            return false;
        }
        if segs[0] == ROM_PREFIX && !self.initializing {
            return false;
        }
        for m in &self.mounts {
            if m.prefix == segs {
                return m.real == real;
            }
        }
        self.mounts.push(Mount {
            prefix: segs,
            real: real.to_path_buf(),
            read_only,
        });
        true
    }

    /// Removes the mount at `vpath`. The `rom` prefix stays.
    pub fn unmount(&mut self, vpath: &str) -> bool {
        let Some(segs) = split_virtual(vpath) else {
            return false;
        };
        if segs.first().map(String::as_str) == Some(ROM_PREFIX) {
            return false;
        }
        let before = self.mounts.len();
        self.mounts.retain(|m| m.prefix != segs);
        self.mounts.len() != before
    }

    pub fn list(&self) -> &[Mount] {
        &self.mounts
    }
}
