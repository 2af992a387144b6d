//! System-wide vitals from /proc and /sys.
//!
//! One read per tick: the meminfo fields the report leader needs, the
//! aggregate CPU tick counter used as the wall-clock base for per-PID CPU
//! percentages, and compressed-swap (zRAM) statistics when such devices are
//! active. A missing meminfo field is fatal for the tick.

use std::io;

use crate::proc::maps::parse_kb_value;
use crate::proc::ProcFs;

/// Required memory vitals, kilobytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vitals {
    pub mem_total_kb: i64,
    pub mem_avail_kb: i64,
    pub shmem_kb: i64,
    pub dirty_kb: i64,
}

/// Cumulative CPU ticks normalized to one CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTotals {
    pub wall_ticks: u64,
}

/// Aggregate statistics over all active zram devices, bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZramStats {
    /// Uncompressed size of the stored data.
    pub orig_data_size: u64,
    /// Compressed size of the stored data.
    pub compr_data_size: u64,
    /// RAM actually consumed to store it.
    pub mem_used_total: u64,
    pub disksize: u64,
}

impl ZramStats {
    /// Compression ratio; 0 when nothing is stored yet.
    pub fn ratio(&self) -> f64 {
        if self.compr_data_size > 0 {
            self.orig_data_size as f64 / self.compr_data_size as f64
        } else {
            0.0
        }
    }
}

/// Everything the sampling loop needs to know about the system per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysFacts {
    pub vitals: Vitals,
    pub cpu: CpuTotals,
    pub zram: Option<ZramStats>,
}

/// Vitals failures abort the tick and surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum VitalsError {
    #[error("cannot read /proc/{file}: {source}")]
    Io {
        file: &'static str,
        source: io::Error,
    },

    #[error("missing {0}: in /proc/meminfo")]
    MissingField(&'static str),

    #[error("no cpu line in /proc/stat")]
    NoCpuTotals,
}

const MEMINFO_FIELDS: [&str; 4] = ["MemTotal", "MemAvailable", "Shmem", "Dirty"];

/// Parses the four required fields out of meminfo text.
pub fn parse_meminfo(text: &str) -> Result<Vitals, VitalsError> {
    let mut values = [None; MEMINFO_FIELDS.len()];
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        if let Some(slot) = MEMINFO_FIELDS.iter().position(|f| *f == key) {
            values[slot] = parse_kb_value(rest);
        }
        if values.iter().all(Option::is_some) {
            break;
        }
    }
    let field = |idx: usize| values[idx].ok_or(VitalsError::MissingField(MEMINFO_FIELDS[idx]));
    Ok(Vitals {
        mem_total_kb: field(0)?,
        mem_avail_kb: field(1)?,
        shmem_kb: field(2)?,
        dirty_kb: field(3)?,
    })
}

/// Parses the aggregate `cpu` line of /proc/stat and normalizes the tick sum
/// by the number of per-CPU lines, yielding wall ticks of a single CPU.
pub fn parse_cpu_totals(text: &str) -> Result<CpuTotals, VitalsError> {
    let mut aggregate: Option<u64> = None;
    let mut cpu_count = 0u64;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("cpu") {
            let Some(first) = rest.chars().next() else {
                continue;
            };
            if first == ' ' {
                let sum = rest
                    .split_whitespace()
                    .filter_map(|v| v.parse::<u64>().ok())
                    .sum();
                aggregate = Some(sum);
            } else if first.is_ascii_digit() {
                cpu_count += 1;
            }
        }
    }

    let total = aggregate.ok_or(VitalsError::NoCpuTotals)?;
    Ok(CpuTotals {
        wall_ticks: total / cpu_count.max(1),
    })
}

/// Parses the first line of a zram `mm_stat` file:
/// `orig_data_size compr_data_size mem_used_total mem_limit mem_used_max …`.
pub fn parse_mm_stat(text: &str) -> Option<(u64, u64, u64)> {
    let line = text.lines().next()?;
    let mut fields = line.split_whitespace();
    let orig = fields.next()?.parse().ok()?;
    let compr = fields.next()?.parse().ok()?;
    let used = fields.next()?.parse().ok()?;
    Some((orig, compr, used))
}

fn read_zram(fs: &ProcFs) -> Option<ZramStats> {
    let mut stats = ZramStats::default();
    let mut active = 0;
    for device in fs.zram_devices() {
        // A device without mm_stat is present but not active.
        let Some(mm_stat) = fs.read_zram_attr(&device, "mm_stat") else {
            continue;
        };
        let Some((orig, compr, used)) = parse_mm_stat(&mm_stat) else {
            continue;
        };
        stats.orig_data_size += orig;
        stats.compr_data_size += compr;
        stats.mem_used_total += used;
        if let Some(disksize) = fs.read_zram_attr(&device, "disksize") {
            stats.disksize += disksize.trim().parse().unwrap_or(0);
        }
        active += 1;
    }
    (active > 0).then_some(stats)
}

/// One call per tick.
pub fn read_sys_facts(fs: &ProcFs) -> Result<SysFacts, VitalsError> {
    let meminfo = fs
        .read_root_file("meminfo")
        .map_err(|source| VitalsError::Io {
            file: "meminfo",
            source,
        })?;
    let vitals = parse_meminfo(&meminfo)?;

    let stat = fs.read_root_file("stat").map_err(|source| VitalsError::Io {
        file: "stat",
        source,
    })?;
    let cpu = parse_cpu_totals(&stat)?;

    Ok(SysFacts {
        vitals,
        cpu,
        zram: read_zram(fs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::tempdir;

    const MEMINFO: &str = "MemTotal:       16384000 kB\n\
                           MemFree:         1024000 kB\n\
                           MemAvailable:    8192000 kB\n\
                           Buffers:          200000 kB\n\
                           Shmem:            300000 kB\n\
                           Dirty:              4096 kB\n";

    // -------------------------------------------------------------------------
    // Tests for parse_meminfo
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_meminfo() {
        let vitals = parse_meminfo(MEMINFO).expect("vitals");
        assert_eq!(vitals.mem_total_kb, 16_384_000);
        assert_eq!(vitals.mem_avail_kb, 8_192_000);
        assert_eq!(vitals.shmem_kb, 300_000);
        assert_eq!(vitals.dirty_kb, 4096);
    }

    #[test]
    fn test_parse_meminfo_missing_field_is_fatal() {
        let text = "MemTotal: 100 kB\nMemAvailable: 50 kB\nShmem: 1 kB\n";
        match parse_meminfo(text) {
            Err(VitalsError::MissingField("Dirty")) => {}
            other => panic!("expected MissingField(Dirty), got {other:?}"),
        }
    }

    // -------------------------------------------------------------------------
    // Tests for parse_cpu_totals
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_cpu_totals_normalizes_per_cpu() {
        let text = "cpu  100 0 100 700 50 0 50 0 0 0\n\
                    cpu0 50 0 50 350 25 0 25 0 0 0\n\
                    cpu1 50 0 50 350 25 0 25 0 0 0\n\
                    ctxt 12345\n\
                    btime 1700000000\n";
        let totals = parse_cpu_totals(text).expect("totals");
        assert_eq!(totals.wall_ticks, 500);
    }

    #[test]
    fn test_parse_cpu_totals_requires_aggregate_line() {
        match parse_cpu_totals("ctxt 1\n") {
            Err(VitalsError::NoCpuTotals) => {}
            other => panic!("expected NoCpuTotals, got {other:?}"),
        }
    }

    // -------------------------------------------------------------------------
    // Tests for zram
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_mm_stat() {
        let line = "4194304 1048576 1310720 0 1310720 0 0 0\n";
        assert_eq!(parse_mm_stat(line), Some((4_194_304, 1_048_576, 1_310_720)));
        assert_eq!(parse_mm_stat(""), None);
    }

    #[test]
    fn test_zram_ratio() {
        let stats = ZramStats {
            orig_data_size: 4_000_000,
            compr_data_size: 1_000_000,
            ..ZramStats::default()
        };
        assert!((stats.ratio() - 4.0).abs() < 1e-9);
        assert_eq!(ZramStats::default().ratio(), 0.0);
    }

    #[test]
    fn test_read_sys_facts_with_zram_device() {
        let dir = tempdir().expect("tempdir");
        stdfs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        stdfs::write(
            dir.path().join("stat"),
            "cpu  10 0 10 80 0 0 0 0 0 0\ncpu0 10 0 10 80 0 0 0 0 0 0\n",
        )
        .unwrap();
        let zram = dir.path().join("block").join("zram0");
        stdfs::create_dir_all(&zram).unwrap();
        stdfs::write(zram.join("mm_stat"), "4194304 1048576 1310720 0 0 0 0 0\n").unwrap();
        stdfs::write(zram.join("disksize"), "8589934592\n").unwrap();

        let fs = ProcFs::with_roots(dir.path(), dir.path());
        let facts = read_sys_facts(&fs).expect("facts");
        let zram = facts.zram.expect("zram present");
        assert_eq!(zram.orig_data_size, 4_194_304);
        assert_eq!(zram.compr_data_size, 1_048_576);
        assert_eq!(zram.disksize, 8_589_934_592);
    }

    #[test]
    fn test_read_sys_facts_without_zram() {
        let dir = tempdir().expect("tempdir");
        stdfs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        stdfs::write(dir.path().join("stat"), "cpu  1 0 1 8 0 0 0 0 0 0\n").unwrap();
        let fs = ProcFs::with_roots(dir.path(), dir.path());
        let facts = read_sys_facts(&fs).expect("facts");
        assert!(facts.zram.is_none());
    }
}
