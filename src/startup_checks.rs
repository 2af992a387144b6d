//! Startup privilege probe.
//!
//! Reading other users' smaps requires root (or CAP_DAC_READ_SEARCH +
//! CAP_SYS_PTRACE). The tool still works without, it just sees fewer PIDs,
//! so this only warns.

use nix::unistd::geteuid;
use std::fs;
use std::io;
use tracing::{debug, warn};

pub fn report_privileges() {
    if !geteuid().is_root() {
        warn!("not running as root; only user-owned processes will be visible");
    }

    match fs::metadata("/proc/1/smaps_rollup") {
        Ok(_) => debug!("/proc access: can read all processes"),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!("cannot read /proc/1/smaps_rollup; run with sudo to inspect all PIDs");
        }
        Err(e) => debug!("could not probe /proc/1/smaps_rollup: {}", e),
    }
}
