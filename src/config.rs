//! Configuration loading, merging and validation.
//!
//! Precedence is CLI > config file > defaults. Files may be YAML, JSON or
//! TOML, selected by extension; a handful of default locations are probed
//! when no path is given.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::{Args, ConfigFormat};
use crate::proc::record::GroupBy;
use crate::report::Units;
use crate::sampler::Options;

pub const DEFAULT_GROUP_BY: &str = "exe";
pub const DEFAULT_UNITS: &str = "MB";
pub const DEFAULT_CMD_LEN: usize = 36;
pub const DEFAULT_TOP_PCT: i64 = 100;

/// Effective configuration; every field optional so file and CLI layers can
/// be merged without clobbering unset values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// "exe" | "cmd" | "pid"
    #[serde(alias = "group-by", alias = "groupby")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,

    /// Tier-2 threshold in KB; may be negative (absolute-value semantics).
    /// Unset derives 100 for KB units, 1000 otherwise.
    #[serde(alias = "min-delta-kb")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_delta_kb: Option<i64>,

    /// Seconds between ticks; <= 0 runs a single tick.
    #[serde(alias = "loop-interval-s", alias = "loop")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_interval_s: Option<i64>,

    /// Command-string truncation length.
    #[serde(alias = "cmd-len", alias = "cmdlen")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd_len: Option<usize>,

    /// Report groups contributing to this percentage of ptotal; the rest
    /// collapses into OTHERS on the first tick.
    #[serde(alias = "top-pct")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_pct: Option<i64>,

    /// "KB" | "MB" | "mB" | "human"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,

    /// Allow-list of PID strings or executable basenames.
    #[serde(alias = "pid-filter", alias = "pids")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_filter: Option<Vec<String>>,

    /// Merge shSYSV/shOth/stack/text into one `other` column.
    #[serde(alias = "collapse-other", alias = "others")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_other: Option<bool>,

    /// Include the CPU column.
    #[serde(alias = "show-cpu", alias = "cpu")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_cpu: Option<bool>,

    /// Show the rollup pss column as well.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    #[serde(alias = "log-level")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_by: Some(DEFAULT_GROUP_BY.to_string()),
            min_delta_kb: None,
            loop_interval_s: Some(0),
            cmd_len: Some(DEFAULT_CMD_LEN),
            top_pct: Some(DEFAULT_TOP_PCT),
            units: Some(DEFAULT_UNITS.to_string()),
            pid_filter: None,
            collapse_other: Some(false),
            show_cpu: Some(false),
            debug: Some(false),
            log_level: Some("warn".into()),
        }
    }
}

impl Config {
    pub fn effective_units(&self) -> Units {
        self.units
            .as_deref()
            .and_then(Units::parse)
            .unwrap_or(Units::Mb)
    }

    pub fn effective_group_by(&self) -> GroupBy {
        match self.group_by.as_deref() {
            Some("cmd") => GroupBy::Cmd,
            Some("pid") => GroupBy::Pid,
            _ => GroupBy::Exe,
        }
    }

    /// The original default: 100 KB when displaying KB, 1000 KB otherwise.
    pub fn effective_min_delta_kb(&self) -> i64 {
        self.min_delta_kb
            .unwrap_or(if self.effective_units() == Units::Kb {
                100
            } else {
                1000
            })
    }

    /// Projects the merged config onto the sampler's option set.
    pub fn to_options(&self) -> Options {
        Options {
            group_by: self.effective_group_by(),
            min_delta_kb: self.effective_min_delta_kb(),
            cmd_len: self.cmd_len.unwrap_or(DEFAULT_CMD_LEN),
            top_pct: self.top_pct.unwrap_or(DEFAULT_TOP_PCT),
            pid_filter: self.pid_filter.clone().unwrap_or_default(),
            show_cpu: self.show_cpu.unwrap_or(false),
        }
    }
}

/// Validate effective config (used by --check-config and at startup).
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(group_by) = cfg.group_by.as_deref() {
        if !matches!(group_by, "exe" | "cmd" | "pid") {
            return Err(format!(
                "Invalid group_by '{}', expected 'exe', 'cmd' or 'pid'",
                group_by
            )
            .into());
        }
    }

    if let Some(units) = cfg.units.as_deref() {
        if Units::parse(units).is_none() {
            return Err(format!(
                "Invalid units '{}', expected 'KB', 'MB', 'mB' or 'human'",
                units
            )
            .into());
        }
    }

    if let Some(top_pct) = cfg.top_pct {
        if !(0..=100).contains(&top_pct) {
            return Err(format!("top_pct {} out of range 0..=100", top_pct).into());
        }
    }

    if let Some(cmd_len) = cfg.cmd_len {
        if cmd_len == 0 {
            return Err("cmd_len must be at least 1".into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    if let Some(group_by) = args.group_by {
        config.group_by = Some(group_by.as_config_str().to_string());
    }
    if args.min_delta_kb.is_some() {
        config.min_delta_kb = args.min_delta_kb;
    }
    if args.loop_interval_s.is_some() {
        config.loop_interval_s = args.loop_interval_s;
    }
    if args.cmd_len.is_some() {
        config.cmd_len = args.cmd_len;
    }
    if args.top_pct.is_some() {
        config.top_pct = args.top_pct;
    }
    if let Some(units) = args.units {
        config.units = Some(units.as_config_str().to_string());
    }
    if args.collapse_other {
        config.collapse_other = Some(true);
    }
    if args.cpu {
        config.show_cpu = Some(true);
    }
    if args.debug {
        config.debug = Some(true);
    }
    if !args.pids.is_empty() {
        config.pid_filter = Some(args.pids.clone());
    }

    Ok(config)
}

/// Configuration loading with multiple format support.
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        let defaults = [
            "/etc/pmemstat/pmemstat.yaml",
            "/etc/pmemstat/pmemstat.yml",
            "/etc/pmemstat/pmemstat.toml",
            "./pmemstat.yaml",
            "./pmemstat.yml",
            "./pmemstat.toml",
        ];
        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_default()
    };

    if path.to_string_lossy().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in the requested format.
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    println!("{output}");
    Ok(())
}
