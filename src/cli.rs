//! CLI arguments for pmemstat, built with clap derive.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Output format for --show-config.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Grouping mode choices.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GroupByArg {
    Exe,
    Cmd,
    Pid,
}

impl GroupByArg {
    pub fn as_config_str(self) -> &'static str {
        match self {
            GroupByArg::Exe => "exe",
            GroupByArg::Cmd => "cmd",
            GroupByArg::Pid => "pid",
        }
    }
}

/// Memory unit choices; names match the column header exactly.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UnitsArg {
    #[value(name = "KB")]
    Kb,
    #[value(name = "MB")]
    Mb,
    #[value(name = "mB")]
    MbDecimal,
    #[value(name = "human")]
    Human,
}

impl UnitsArg {
    pub fn as_config_str(self) -> &'static str {
        match self {
            UnitsArg::Kb => "KB",
            UnitsArg::Mb => "MB",
            UnitsArg::MbDecimal => "mB",
            UnitsArg::Human => "human",
        }
    }
}

/// Main CLI arguments structure.
#[derive(Parser, Debug)]
#[command(
    name = "pmemstat",
    about = "Proportional per-process memory and CPU inspector for Linux",
    long_about = "Aggregates the memory of processes into categories (heap, stack, text, \
                  shared, swap) using PSS so shared pages are split fairly across sharers, \
                  and rolls related processes into one report row per executable, command \
                  or PID.",
    version
)]
pub struct Args {
    /// Grouping method for report rows
    #[arg(short = 'g', long, value_enum)]
    pub group_by: Option<GroupByArg>,

    /// Minimum delta in KB before a group's detail is re-read; negative
    /// values trigger on movement in either direction
    #[arg(short = 'k', long, allow_hyphen_values = true)]
    pub min_delta_kb: Option<i64>,

    /// Loop interval in seconds; 0 or less runs one report and exits
    #[arg(short = 'l', long = "loop", value_name = "SECS")]
    pub loop_interval_s: Option<i64>,

    /// Maximum shown command length
    #[arg(short = 'L', long)]
    pub cmd_len: Option<usize>,

    /// Report groups contributing to the top percentage of ptotal; the tail
    /// collapses into OTHERS on the first report
    #[arg(short = 't', long)]
    pub top_pct: Option<i64>,

    /// Collapse shSYSV, shOth, stack and text into a single "other" column
    #[arg(short = 'o', long)]
    pub collapse_other: bool,

    /// Memory units
    #[arg(short = 'u', long, value_enum)]
    pub units: Option<UnitsArg>,

    /// Include the per-group CPU column
    #[arg(long)]
    pub cpu: bool,

    /// Show the rollup pss column as well
    #[arg(long)]
    pub debug: bool,

    /// Log level (logs go to stderr)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// PIDs or executable names to include (none means every accessible PID)
    pub pids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_short_options() {
        let args = Args::parse_from(["pmemstat", "-g", "cmd", "-u", "KB", "-l", "5", "-k", "-200"]);
        assert!(matches!(args.group_by, Some(GroupByArg::Cmd)));
        assert!(matches!(args.units, Some(UnitsArg::Kb)));
        assert_eq!(args.loop_interval_s, Some(5));
        assert_eq!(args.min_delta_kb, Some(-200));
    }

    #[test]
    fn test_units_names_are_case_sensitive() {
        let args = Args::parse_from(["pmemstat", "-u", "mB"]);
        assert!(matches!(args.units, Some(UnitsArg::MbDecimal)));
        assert!(Args::try_parse_from(["pmemstat", "-u", "gb"]).is_err());
    }

    #[test]
    fn test_positional_pid_filter() {
        let args = Args::parse_from(["pmemstat", "1234", "chrome"]);
        assert_eq!(args.pids, vec!["1234", "chrome"]);
    }
}
