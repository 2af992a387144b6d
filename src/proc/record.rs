//! Per-PID identity, filtering and lifecycle state.
//!
//! Identity comes from the NUL-separated cmdline: an empty cmdline is a
//! kernel thread, otherwise the first argument's basename names the
//! executable, with a `python->script.py` style rewrite when the executable
//! is a known script interpreter running a script.

use ahash::AHashSet as HashSet;
use once_cell::sync::Lazy;

use crate::proc::cpu::CpuBaseline;
use crate::summary::Summary;

/// Grouping modes for collapsing processes into report rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Exe,
    Cmd,
    Pid,
}

impl GroupBy {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Exe => "exe",
            GroupBy::Cmd => "cmd",
            GroupBy::Pid => "pid",
        }
    }
}

/// Why a PID is excluded from the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disqualify {
    /// Empty cmdline; excluded from the PID totals as well.
    KernelProcess,
    /// Not in the caller's allow-list.
    FilteredByArgs,
    /// Rollup/detail/stat unreadable for this user.
    PermissionDenied,
    /// Race with process exit; retried next tick.
    FileMissing,
}

impl Disqualify {
    /// Identity-derived reasons stick for the record's lifetime; read
    /// failures are re-probed every tick.
    pub fn is_transient(self) -> bool {
        matches!(self, Disqualify::PermissionDenied | Disqualify::FileMissing)
    }
}

/// Script interpreters whose first argument names the real program.
static INTERPRETERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "python", "python2", "python3", "perl", "bash", "sh", "ksh", "zsh", "ruby",
    ]
    .into_iter()
    .collect()
});

/// Resolved identity of one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Executable basename, possibly rewritten to `interpreter->script`.
    pub exe_basename: String,
    /// Space-joined command string, truncated to the configured length.
    pub cmdline: String,
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn strip_non_word(s: &str) -> &str {
    s.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
}

/// Resolves identity from the raw cmdline bytes. Pure so the rewrite rules
/// are testable without a live process.
pub fn resolve_identity(raw: &[u8], cmd_len: usize) -> Result<Identity, Disqualify> {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    let mut args = text.split('\0');

    let first = args.next().unwrap_or("");
    if first.is_empty() {
        return Err(Disqualify::KernelProcess);
    }

    // The first argument is occasionally several words packed together.
    let mut words: Vec<String> = basename(first)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    words.extend(args.map(str::to_string));
    if words.is_empty() {
        // Degenerate all-whitespace argv[0].
        return Err(Disqualify::KernelProcess);
    }

    let mut exe = strip_non_word(&words.remove(0)).to_string();
    if INTERPRETERS.contains(exe.as_str()) && !words.is_empty() {
        let script = basename(&words.remove(0)).to_string();
        exe = format!("{exe}->{script}");
    }

    let mut cmdline = exe.clone();
    for word in &words {
        cmdline.push(' ');
        cmdline.push_str(word);
    }
    let cmdline = cmdline.chars().take(cmd_len).collect();

    Ok(Identity {
        exe_basename: exe,
        cmdline,
    })
}

/// True when a non-empty allow-list matches neither the PID nor the
/// executable basename.
pub fn filtered_by_args(pid: u32, exe_basename: &str, allow: &[String]) -> bool {
    if allow.is_empty() {
        return false;
    }
    let pid = pid.to_string();
    !allow.iter().any(|a| a == &pid || a == exe_basename)
}

/// Per-live-PID state owned by the sampling loop.
#[derive(Debug)]
pub struct ProcessRecord {
    pub pid: u32,
    /// Reset at tick start; only re-observed PIDs become true again.
    pub alive: bool,
    pub identity: Option<Identity>,
    pub group_key: Option<String>,
    pub whynot: Option<Disqualify>,
    /// Last tier-1 rollup summary for this PID.
    pub rollup: Option<Summary>,
    pub cpu: CpuBaseline,
}

impl ProcessRecord {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            alive: true,
            identity: None,
            group_key: None,
            whynot: None,
            rollup: None,
            cpu: CpuBaseline::default(),
        }
    }

    /// Group key under the given mode. Identity must be resolved.
    pub fn derive_group_key(&self, group_by: GroupBy) -> Option<String> {
        let identity = self.identity.as_ref()?;
        Some(match group_by {
            GroupBy::Exe => identity.exe_basename.clone(),
            GroupBy::Cmd => identity.cmdline.clone(),
            GroupBy::Pid => self.pid.to_string(),
        })
    }

    /// Row label shown in the key/info column. In pid grouping the PID is
    /// prefixed to the truncated command so the row stays readable.
    pub fn row_label(&self, group_by: GroupBy) -> Option<String> {
        let identity = self.identity.as_ref()?;
        Some(match group_by {
            GroupBy::Exe => identity.exe_basename.clone(),
            GroupBy::Cmd => identity.cmdline.clone(),
            GroupBy::Pid => format!("{} {}", self.pid, identity.cmdline),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmdline(args: &[&str]) -> Vec<u8> {
        let mut raw = Vec::new();
        for a in args {
            raw.extend_from_slice(a.as_bytes());
            raw.push(0);
        }
        raw
    }

    // -------------------------------------------------------------------------
    // Tests for resolve_identity
    // -------------------------------------------------------------------------

    #[test]
    fn test_plain_executable() {
        let id = resolve_identity(&cmdline(&["/usr/bin/foo", "-x"]), 64).unwrap();
        assert_eq!(id.exe_basename, "foo");
        assert_eq!(id.cmdline, "foo -x");
    }

    #[test]
    fn test_kernel_thread_is_empty_cmdline() {
        assert_eq!(resolve_identity(b"", 64), Err(Disqualify::KernelProcess));
        assert_eq!(resolve_identity(&[0], 64), Err(Disqualify::KernelProcess));
    }

    #[test]
    fn test_interpreter_rewrite() {
        let id = resolve_identity(&cmdline(&["/usr/bin/python3", "/opt/tool/main.py", "-v"]), 64)
            .unwrap();
        assert_eq!(id.exe_basename, "python3->main.py");
        assert_eq!(id.cmdline, "python3->main.py -v");
    }

    #[test]
    fn test_interpreter_rewrite_bare_script_name() {
        // A further argument is all it takes, directory component or not.
        let id = resolve_identity(&cmdline(&["bash", "backup.sh"]), 64).unwrap();
        assert_eq!(id.exe_basename, "bash->backup.sh");
    }

    #[test]
    fn test_interpreter_without_script_kept() {
        let id = resolve_identity(&cmdline(&["bash"]), 64).unwrap();
        assert_eq!(id.exe_basename, "bash");
    }

    #[test]
    fn test_non_interpreter_not_rewritten() {
        let id = resolve_identity(&cmdline(&["/usr/bin/vim", "notes.txt"]), 64).unwrap();
        assert_eq!(id.exe_basename, "vim");
    }

    #[test]
    fn test_non_word_chars_stripped_from_basename() {
        let id = resolve_identity(&cmdline(&["-(sd-pam)"]), 64).unwrap();
        assert_eq!(id.exe_basename, "sd-pam");
    }

    #[test]
    fn test_cmdline_truncated_to_length() {
        let id = resolve_identity(&cmdline(&["/bin/longname", "aaaa", "bbbb"]), 10).unwrap();
        assert_eq!(id.cmdline, "longname a");
    }

    #[test]
    fn test_packed_first_argument_splits() {
        let id = resolve_identity(&cmdline(&["/opt/run daemon --fg"]), 64).unwrap();
        assert_eq!(id.exe_basename, "run");
        assert_eq!(id.cmdline, "run daemon --fg");
    }

    // -------------------------------------------------------------------------
    // Tests for filtering and key derivation
    // -------------------------------------------------------------------------

    #[test]
    fn test_filter_empty_allows_everything() {
        assert!(!filtered_by_args(1, "foo", &[]));
    }

    #[test]
    fn test_filter_matches_pid_or_exe() {
        let allow = vec!["42".to_string(), "chrome".to_string()];
        assert!(!filtered_by_args(42, "foo", &allow));
        assert!(!filtered_by_args(7, "chrome", &allow));
        assert!(filtered_by_args(7, "foo", &allow));
    }

    #[test]
    fn test_group_key_per_mode() {
        let mut record = ProcessRecord::new(99);
        record.identity = Some(Identity {
            exe_basename: "chrome".into(),
            cmdline: "chrome --type=renderer".into(),
        });
        assert_eq!(record.derive_group_key(GroupBy::Exe).unwrap(), "chrome");
        assert_eq!(
            record.derive_group_key(GroupBy::Cmd).unwrap(),
            "chrome --type=renderer"
        );
        assert_eq!(record.derive_group_key(GroupBy::Pid).unwrap(), "99");
        assert_eq!(
            record.row_label(GroupBy::Pid).unwrap(),
            "99 chrome --type=renderer"
        );
    }
}
