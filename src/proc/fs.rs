//! Filesystem handle for `/proc` and `/sys` reads.
//!
//! All kernel-file access goes through [`ProcFs`] so the roots can be pointed
//! at a temporary directory in tests. Read failures on per-PID files are
//! folded into the three cases the sampler cares about: the file vanished
//! (a normal race with process exit), permission was denied, or something
//! unexpected happened.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Why a per-PID file could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ProcReadError {
    /// The file (or the whole PID directory) is gone; expected race.
    #[error("file missing")]
    Missing,

    /// Not permitted to read this process.
    #[error("permission denied")]
    Denied,

    /// Anything else; logged by the caller, the PID is skipped.
    #[error("i/o error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for ProcReadError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ProcReadError::Missing,
            io::ErrorKind::PermissionDenied => ProcReadError::Denied,
            _ => ProcReadError::Io(err),
        }
    }
}

/// Handle on the proc and sys filesystem roots.
#[derive(Debug, Clone)]
pub struct ProcFs {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    /// Handle on the real `/proc` and `/sys`.
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Handle on substitute roots; used by tests with a tempdir tree.
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// All numeric entries under the proc root, sorted ascending so reports
    /// are reproducible for identical inputs.
    pub fn list_pids(&self) -> io::Result<Vec<u32>> {
        let mut pids = Vec::new();
        for entry in fs::read_dir(&self.proc_root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(pid) = name.parse::<u32>() {
                pids.push(pid);
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }

    /// Path of a per-PID file; used for diagnostics.
    pub fn pid_path(&self, pid: u32, name: &str) -> PathBuf {
        self.proc_root.join(pid.to_string()).join(name)
    }

    /// Reads a per-PID text file such as `smaps`, `smaps_rollup` or `stat`.
    pub fn read_pid_file(&self, pid: u32, name: &str) -> Result<String, ProcReadError> {
        Ok(fs::read_to_string(self.pid_path(pid, name))?)
    }

    /// Reads a per-PID binary file; `cmdline` is NUL-separated.
    pub fn read_pid_bytes(&self, pid: u32, name: &str) -> Result<Vec<u8>, ProcReadError> {
        Ok(fs::read(self.pid_path(pid, name))?)
    }

    /// Reads a top-level proc file such as `meminfo` or `stat`.
    pub fn read_root_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.proc_root.join(name))
    }

    /// Names of `zram*` block devices, sorted. Empty when the block directory
    /// does not exist or holds no zram entries.
    pub fn zram_devices(&self) -> Vec<String> {
        let mut devices = Vec::new();
        if let Ok(entries) = fs::read_dir(self.sys_root.join("block")) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with("zram") {
                        devices.push(name.to_string());
                    }
                }
            }
        }
        devices.sort_unstable();
        devices
    }

    /// Reads one attribute of a zram device, e.g. `mm_stat` or `disksize`.
    pub fn read_zram_attr(&self, device: &str, attr: &str) -> Option<String> {
        fs::read_to_string(self.sys_root.join("block").join(device).join(attr)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_pids_numeric_only() {
        let dir = tempdir().expect("tempdir");
        for name in ["12", "7", "self", "meminfo", "120"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        let fs = ProcFs::with_roots(dir.path(), dir.path());
        assert_eq!(fs.list_pids().unwrap(), vec![7, 12, 120]);
    }

    #[test]
    fn test_read_pid_file_missing_maps_to_missing() {
        let dir = tempdir().expect("tempdir");
        let fs = ProcFs::with_roots(dir.path(), dir.path());
        match fs.read_pid_file(1, "smaps") {
            Err(ProcReadError::Missing) => {}
            other => panic!("expected Missing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_zram_devices_sorted() {
        let dir = tempdir().expect("tempdir");
        for name in ["zram1", "zram0", "sda"] {
            fs::create_dir_all(dir.path().join("block").join(name)).unwrap();
        }
        let fs = ProcFs::with_roots(dir.path(), dir.path());
        assert_eq!(fs.zram_devices(), vec!["zram0", "zram1"]);
    }
}
