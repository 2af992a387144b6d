//! The per-tick sampling loop.
//!
//! One tick: read system vitals, enumerate PIDs, update per-process records
//! and tier-1 rollups, let the aggregator settle the tier-2 decision per
//! group, then project everything into an immutable [`Report`]. Per-PID
//! failures never abort a tick; only vitals or enumeration failures do.

use std::io;

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::aggregate::Aggregator;
use crate::proc::{
    classify_chunks, filtered_by_args, parse_cpu_ticks, parse_rollup, parse_smaps,
    resolve_identity, summarize_chunks, Disqualify, GroupBy, ProcFs, ProcReadError, ProcessRecord,
};
use crate::report::{Annotation, Report, Row};
use crate::summary::Summary;
use crate::system::{read_sys_facts, VitalsError};

/// Core engine options, resolved from CLI and config by the caller.
#[derive(Debug, Clone)]
pub struct Options {
    pub group_by: GroupBy,
    /// Tier-2 trigger threshold; non-positive means absolute-value semantics.
    pub min_delta_kb: i64,
    /// Command-string truncation.
    pub cmd_len: usize,
    /// Tail cutoff percentage for the first-tick OTHERS bucket.
    pub top_pct: i64,
    /// Allow-list of PID strings or executable names; empty allows all.
    pub pid_filter: Vec<String>,
    pub show_cpu: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            group_by: GroupBy::Exe,
            min_delta_kb: 1000,
            cmd_len: 36,
            top_pct: 100,
            pid_filter: Vec::new(),
            show_cpu: false,
        }
    }
}

/// Failures that abort a whole tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Vitals(#[from] VitalsError),

    #[error("cannot enumerate processes: {0}")]
    Enumerate(io::Error),
}

/// Owns the PID table and the group table; drives one tick at a time.
pub struct Sampler {
    fs: ProcFs,
    opts: Options,
    records: HashMap<u32, ProcessRecord>,
    groups: Aggregator,
    is_first: bool,
}

impl Sampler {
    pub fn new(fs: ProcFs, opts: Options) -> Self {
        let groups = Aggregator::new(opts.min_delta_kb);
        Self {
            fs,
            opts,
            records: HashMap::new(),
            groups,
            is_first: true,
        }
    }

    /// Resolves identity once per record and applies the allow-list.
    fn resolve_record(fs: &ProcFs, opts: &Options, record: &mut ProcessRecord) {
        match fs.read_pid_bytes(record.pid, "cmdline") {
            Ok(raw) => match resolve_identity(&raw, opts.cmd_len) {
                Ok(identity) => {
                    if filtered_by_args(record.pid, &identity.exe_basename, &opts.pid_filter) {
                        record.whynot = Some(Disqualify::FilteredByArgs);
                    }
                    record.identity = Some(identity);
                    record.group_key = record.derive_group_key(opts.group_by);
                }
                Err(reason) => record.whynot = Some(reason),
            },
            // Exit race; the record stays unresolved and is retried next tick.
            Err(ProcReadError::Missing) => {}
            Err(ProcReadError::Denied) => record.whynot = Some(Disqualify::PermissionDenied),
            Err(ProcReadError::Io(err)) => {
                debug!("skip pid {}: cmdline: {}", record.pid, err);
            }
        }
    }

    /// One sampling tick.
    pub fn tick(&mut self, now: DateTime<Local>) -> Result<Report, TickError> {
        let facts = read_sys_facts(&self.fs)?;
        let pids = self.fs.list_pids().map_err(TickError::Enumerate)?;

        // Sweep state from the previous tick.
        self.groups.prep_new_tick();
        self.records.retain(|_, record| record.alive);
        for record in self.records.values_mut() {
            record.alive = false;
            if record.whynot.is_some_and(Disqualify::is_transient) {
                record.whynot = None;
            }
        }

        let mut pids_total = 0usize;
        let mut pids_wanted = 0usize;

        for pid in pids {
            let record = self
                .records
                .entry(pid)
                .or_insert_with(|| ProcessRecord::new(pid));
            record.alive = true;

            if record.whynot.is_none() && record.identity.is_none() {
                Self::resolve_record(&self.fs, &self.opts, record);
            }
            if record.whynot != Some(Disqualify::KernelProcess) {
                pids_total += 1;
            }
            if record.whynot.is_some() || record.identity.is_none() {
                continue;
            }

            // Tier 1: the cheap rollup, every tick.
            let rollup_text = match self.fs.read_pid_file(pid, "smaps_rollup") {
                Ok(text) => text,
                Err(ProcReadError::Missing) => {
                    record.whynot = Some(Disqualify::FileMissing);
                    continue;
                }
                Err(ProcReadError::Denied) => {
                    record.whynot = Some(Disqualify::PermissionDenied);
                    continue;
                }
                Err(ProcReadError::Io(err)) => {
                    warn!("skip pid {}: smaps_rollup: {}", pid, err);
                    record.whynot = Some(Disqualify::FileMissing);
                    continue;
                }
            };
            let origin = self.fs.pid_path(pid, "smaps_rollup");
            let mut summary = parse_rollup(&rollup_text, &origin.display().to_string()).to_summary();

            if self.opts.show_cpu {
                if let Ok(stat) = self.fs.read_pid_file(pid, "stat") {
                    if let Some(ticks) = parse_cpu_ticks(&stat) {
                        summary.cpu_pct = record.cpu.update(ticks, facts.cpu.wall_ticks);
                    }
                }
            }

            let (Some(key), Some(info)) = (
                record.group_key.clone(),
                record.row_label(self.opts.group_by),
            ) else {
                continue;
            };
            record.rollup = Some(summary.clone());
            pids_wanted += 1;
            self.groups.observe(&key, pid, &summary, &info);
        }

        // Tier 2: detail re-parse where the aggregator decides it is due.
        let fs = &self.fs;
        self.groups.settle(|pid| {
            let text = fs.read_pid_file(pid, "smaps")?;
            let origin = fs.pid_path(pid, "smaps");
            let (mut chunks, _) = parse_smaps(&text, &origin.display().to_string());
            classify_chunks(&mut chunks);
            Ok(summarize_chunks(pid, &chunks))
        });

        // Project into the report.
        let live = self.groups.live_groups_sorted();
        let mut grand = Summary::default();
        for group in &live {
            if let Some(detail) = &group.detail {
                grand.accumulate(detail);
            }
        }

        let ptotal_limit = (grand.ptotal as f64) * (self.opts.top_pct as f64) / 100.0 * 1.001;
        let mut rows = Vec::new();
        let mut others: Option<Summary> = None;
        let mut running = 0i64;
        for group in live {
            let Some(detail) = &group.detail else { continue };
            running += detail.ptotal;
            if self.is_first && (running as f64) > ptotal_limit {
                others
                    .get_or_insert_with(|| Summary::with_info("---- OTHERS ----"))
                    .accumulate(detail);
                continue;
            }
            let annotation = if group.is_new {
                Annotation::New
            } else if group.is_changed {
                Annotation::Delta(group.delta_pss)
            } else {
                Annotation::Unchanged
            };
            rows.push(Row {
                annotation,
                summary: detail.clone(),
            });
        }
        if let Some(others) = others {
            rows.push(Row {
                annotation: Annotation::Others,
                summary: others,
            });
        }
        for group in self.groups.gone_groups() {
            if let Some(last) = &group.last_detail {
                rows.push(Row {
                    annotation: Annotation::Gone,
                    summary: last.clone(),
                });
            }
        }

        self.is_first = false;
        Ok(Report {
            time: now,
            vitals: facts.vitals,
            zram: facts.zram,
            pids_wanted,
            pids_total,
            group_by: self.opts.group_by,
            grand,
            rows,
        })
    }
}
