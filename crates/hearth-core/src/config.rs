use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const ENV_ROOT: &str = "HEARTH_ROOT";
pub const ENV_MAX_OPEN_HANDLES: &str = "HEARTH_MAX_OPEN_HANDLES";
pub const ENV_HTTP_ENABLE: &str = "HEARTH_HTTP_ENABLE";

fn default_max_open_handles() -> usize {
    128
}

fn default_true() -> bool {
    true
}

fn default_abort_timeout_ms() -> u64 {
    7000
}

/// One extra mount binding: a real directory surfaced at a virtual prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
    pub real_path: PathBuf,
    pub virtual_path: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Everything a machine instance is built from. JSON on disk, `HEARTH_*`
/// environment variables on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Real directory backing the implicit root mount.
    pub root: PathBuf,
    #[serde(default = "default_max_open_handles")]
    pub max_open_handles: usize,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub http_enable: bool,
    /// Budget the external watchdog grants between yields; the machine only
    /// carries the value.
    #[serde(default = "default_abort_timeout_ms")]
    pub abort_timeout_ms: u64,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
}

impl MachineConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_open_handles: default_max_open_handles(),
            label: None,
            http_enable: default_true(),
            abort_timeout_ms: default_abort_timeout_ms(),
            mounts: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let mut config: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse JSON: {}", path.display()))?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(root) = std::env::var(ENV_ROOT) {
            if !root.trim().is_empty() {
                self.root = PathBuf::from(root);
            }
        }
        if let Some(max) = env_usize(ENV_MAX_OPEN_HANDLES)? {
            self.max_open_handles = max;
        }
        if let Some(enable) = env_bool(ENV_HTTP_ENABLE)? {
            self.http_enable = enable;
        }
        Ok(())
    }

    /// Rejects configurations a machine cannot be built from: a root that is
    /// neither an existing directory nor creatable, a zero handle budget, or
    /// a mount source that is not a readable directory.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_open_handles == 0 {
            anyhow::bail!("max_open_handles must be at least 1");
        }
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => anyhow::bail!("root {} is not a directory", self.root.display()),
            Err(_) => {
                let parent = self.root.parent().filter(|p| !p.as_os_str().is_empty());
                let Some(parent) = parent else {
                    anyhow::bail!("root {} does not exist", self.root.display());
                };
                if !parent.is_dir() {
                    anyhow::bail!(
                        "root {} cannot be created: {} is not a directory",
                        self.root.display(),
                        parent.display()
                    );
                }
            }
        }
        for spec in &self.mounts {
            let ok = spec.real_path.is_dir() && std::fs::read_dir(&spec.real_path).is_ok();
            if !ok {
                anyhow::bail!(
                    "mount source {} (for {}) is not a readable directory",
                    spec.real_path.display(),
                    spec.virtual_path
                );
            }
        }
        Ok(())
    }
}

fn env_bool(name: &str) -> anyhow::Result<Option<bool>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(Some(true)),
        "0" | "false" | "FALSE" | "no" | "NO" => Ok(Some(false)),
        other => anyhow::bail!(
            "invalid environment variable {name}={other:?} (expected one of: 1, 0, true, false, yes, no)"
        ),
    }
}

fn env_usize(name: &str) -> anyhow::Result<Option<usize>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let value: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid environment variable {name}={raw:?}"))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{MachineConfig, ENV_HTTP_ENABLE, ENV_MAX_OPEN_HANDLES};

    #[test]
    fn defaults_fill_omitted_fields() {
        let config: MachineConfig = serde_json::from_str(r#"{"root": "/tmp/hearth"}"#).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/hearth"));
        assert_eq!(config.max_open_handles, 128);
        assert!(config.http_enable);
        assert_eq!(config.abort_timeout_ms, 7000);
        assert!(config.mounts.is_empty());
        assert!(config.label.is_none());
    }

    #[test]
    fn env_overrides_apply_and_reject_garbage() {
        // Single test so the process-global env is touched from one place.
        let mut config = MachineConfig::with_root("/tmp/hearth");

        std::env::set_var(ENV_MAX_OPEN_HANDLES, "7");
        std::env::set_var(ENV_HTTP_ENABLE, "no");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.max_open_handles, 7);
        assert!(!config.http_enable);

        std::env::set_var(ENV_HTTP_ENABLE, "maybe");
        assert!(config.apply_env_overrides().is_err());

        std::env::remove_var(ENV_MAX_OPEN_HANDLES);
        std::env::remove_var(ENV_HTTP_ENABLE);
    }

    #[test]
    fn validate_rejects_bad_roots_and_mounts() {
        let dir = tempfile::tempdir().unwrap();

        let config = MachineConfig::with_root(dir.path());
        config.validate().unwrap();

        // creatable: parent exists
        let config = MachineConfig::with_root(dir.path().join("fresh"));
        config.validate().unwrap();

        // not creatable: parent missing
        let config = MachineConfig::with_root(dir.path().join("a/b/c"));
        assert!(config.validate().is_err());

        let mut config = MachineConfig::with_root(dir.path());
        config.max_open_handles = 0;
        assert!(config.validate().is_err());

        let mut config = MachineConfig::with_root(dir.path());
        config.mounts.push(super::MountSpec {
            real_path: dir.path().join("missing"),
            virtual_path: "rom".to_string(),
            read_only: true,
        });
        assert!(config.validate().is_err());
    }
}
