//! Per-PID CPU tick accounting.
//!
//! `utime + stime` comes from `/proc/<pid>/stat`; the comm field may contain
//! spaces and parentheses, so parsing resumes after the last `)`. Percentages
//! are deltas against the system-wide wall ticks read once per tick, so the
//! value is the share of one CPU.

/// Extracts cumulative user+system ticks from a stat line.
pub fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let after_comm = stat.rfind(')')?;
    let mut fields = stat[after_comm + 1..].split_whitespace();
    let _state = fields.next()?;
    // utime and stime are fields 14 and 15 of the full line.
    let utime: u64 = fields.nth(10)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

/// Tick baseline for one process. The first observation yields 0 percent.
#[derive(Debug, Default)]
pub struct CpuBaseline {
    ticks: u64,
    wall_ticks: u64,
    primed: bool,
}

impl CpuBaseline {
    /// Feeds a new observation and returns the percentage of one CPU spent
    /// since the previous one.
    pub fn update(&mut self, ticks: u64, wall_ticks: u64) -> f64 {
        let percent = if self.primed && wall_ticks > self.wall_ticks && ticks >= self.ticks {
            let delta_ticks = (ticks - self.ticks) as f64;
            let delta_wall = (wall_ticks - self.wall_ticks) as f64;
            100.0 * delta_ticks / delta_wall
        } else {
            0.0
        };
        self.ticks = ticks;
        self.wall_ticks = wall_ticks;
        self.primed = true;
        percent
    }
}
