//! Group bookkeeping and the two-tier sampling strategy.
//!
//! Every qualified PID lands in exactly one group per tick and its cheap
//! rollup summary is always accumulated (tier 1). The expensive detail file
//! is re-read for a group's members only when the group is new or its rollup
//! moved past the delta threshold (tier 2); otherwise the previously promoted
//! detail summary keeps being shown with rollup-sourced `pss`/`pswap`/CPU
//! refreshed on top.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use tracing::debug;

use crate::proc::ProcReadError;
use crate::summary::Summary;

/// One report row's worth of processes, keyed by the grouping mode.
#[derive(Debug)]
pub struct Group {
    pub key: String,
    /// Display label; refreshed from the last member observed.
    pub info: String,
    /// First appearance, annotated `A`.
    pub is_new: bool,
    /// Reset at tick start; true once a member is observed this tick.
    pub alive: bool,
    /// Crossed the delta threshold (or changed membership) this tick.
    pub is_changed: bool,
    /// Signed KB against the previously promoted summary.
    pub delta_pss: i64,
    pub members: HashSet<u32>,
    pub prev_members: HashSet<u32>,
    /// Tier-1 accumulation of this tick.
    pub rollup: Summary,
    /// Rollup as of the last tier-2 run; the delta test measures against
    /// this, so slow growth still accumulates into a trigger.
    pub baseline_rollup: Option<Summary>,
    /// What the report shows for this group this tick.
    pub detail: Option<Summary>,
    /// Last promoted detail summary; baseline for the delta test and the
    /// body of the final `x` row when the group dies.
    pub last_detail: Option<Summary>,
}

impl Group {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            info: String::new(),
            is_new: true,
            alive: false,
            is_changed: false,
            delta_pss: 0,
            members: HashSet::new(),
            prev_members: HashSet::new(),
            rollup: Summary::default(),
            baseline_rollup: None,
            detail: None,
            last_detail: None,
        }
    }
}

/// The delta test gating tier 2.
///
/// `d` is the signed pss+pswap movement. A non-positive threshold triggers on
/// `|d| >= -threshold` (any direction); a positive one only on growth
/// `d >= threshold`.
pub fn test_delta(threshold: i64, now: &Summary, prev: &Summary) -> (bool, i64) {
    let delta_pss = (now.pss - prev.pss) + (now.pswap - prev.pswap);
    let over = if threshold <= 0 {
        delta_pss.abs() >= -threshold
    } else {
        delta_pss >= threshold
    };
    (over, delta_pss)
}

/// Owns the group table across ticks.
pub struct Aggregator {
    groups: HashMap<String, Group>,
    min_delta_kb: i64,
}

impl Aggregator {
    pub fn new(min_delta_kb: i64) -> Self {
        Self {
            groups: HashMap::new(),
            min_delta_kb,
        }
    }

    /// Rotates current state into previous and drops groups that were not
    /// re-observed. Call at tick start, before scanning PIDs.
    pub fn prep_new_tick(&mut self) {
        self.groups.retain(|_, group| group.alive);
        for group in self.groups.values_mut() {
            group.is_new = false;
            group.alive = false;
            if !group.members.is_empty() {
                group.prev_members = std::mem::take(&mut group.members);
            }
            group.is_changed = false;
            group.delta_pss = 0;
        }
    }

    /// Tier 1: folds one PID's rollup summary into its group, creating the
    /// group lazily on first observation.
    pub fn observe(&mut self, key: &str, pid: u32, pid_rollup: &Summary, info: &str) {
        let group = self
            .groups
            .entry(key.to_string())
            .or_insert_with(|| Group::new(key));
        if !group.alive {
            group.alive = true;
            group.rollup = Summary::with_info(info);
        }
        group.info = info.to_string();
        group.rollup.info = info.to_string();
        group.rollup.accumulate(pid_rollup);
        group.members.insert(pid);
    }

    /// Runs the tier-2 decision for every live group. `read_detail` produces
    /// the freshly classified detail summary for one member, or an error when
    /// the PID vanished mid-tick, in which case the member is dropped without
    /// failing the group.
    pub fn settle<F>(&mut self, mut read_detail: F)
    where
        F: FnMut(u32) -> Result<Summary, ProcReadError>,
    {
        for group in self.groups.values_mut() {
            if !group.alive {
                continue;
            }

            let rollup_delta = group
                .baseline_rollup
                .as_ref()
                .map(|prev| test_delta(self.min_delta_kb, &group.rollup, prev));
            let do_detail = rollup_delta.map_or(true, |(over, _)| over);

            if do_detail {
                let mut fresh = Summary::with_info(group.info.clone());
                let mut members: Vec<u32> = group.members.iter().copied().collect();
                members.sort_unstable();
                for pid in members {
                    match read_detail(pid) {
                        Ok(summary) => fresh.accumulate(&summary),
                        Err(err) => {
                            debug!("dropping pid {} from group {}: {}", pid, group.key, err);
                            group.members.remove(&pid);
                        }
                    }
                }
                if group.members.is_empty() {
                    group.alive = false;
                    continue;
                }
                group.baseline_rollup = Some(group.rollup.clone());

                // Displayed pss/pswap/cpu always come from the rollup.
                fresh.pss = group.rollup.ptotal;
                fresh.pswap = group.rollup.pswap;
                fresh.cpu_pct = group.rollup.cpu_pct;

                let (changed, delta) = match &group.last_detail {
                    Some(prev) => test_delta(self.min_delta_kb, &fresh, prev),
                    None => (true, 0),
                };
                group.is_changed = changed;
                group.delta_pss = delta;
                if changed {
                    group.last_detail = Some(fresh.clone());
                    group.detail = Some(fresh);
                } else {
                    // Below threshold: keep showing the promoted summary so
                    // rows do not jitter, with rollup fields refreshed.
                    let mut shown = group.last_detail.clone().unwrap_or(fresh);
                    shown.pss = group.rollup.ptotal;
                    shown.pswap = group.rollup.pswap;
                    shown.cpu_pct = group.rollup.cpu_pct;
                    shown.info = group.info.clone();
                    group.detail = Some(shown);
                }
            } else {
                let mut shown = group
                    .last_detail
                    .clone()
                    .unwrap_or_else(|| Summary::with_info(group.info.clone()));
                shown.pss = group.rollup.ptotal;
                shown.pswap = group.rollup.pswap;
                shown.cpu_pct = group.rollup.cpu_pct;
                shown.info = group.info.clone();
                group.detail = Some(shown);
                group.is_changed = false;
                group.delta_pss = rollup_delta.map_or(0, |(_, d)| d);
            }

            // A changed member set marks the group even below threshold.
            if !group.is_new && group.members != group.prev_members {
                group.is_changed = true;
            }
        }
    }

    /// Live groups in report order: current ptotal descending, key ascending
    /// for ties so identical inputs render identically.
    pub fn live_groups_sorted(&self) -> Vec<&Group> {
        let mut live: Vec<&Group> = self.groups.values().filter(|g| g.alive).collect();
        live.sort_by(|a, b| {
            let pa = a.detail.as_ref().map_or(0, |s| s.ptotal);
            let pb = b.detail.as_ref().map_or(0, |s| s.ptotal);
            pb.cmp(&pa).then_with(|| a.key.cmp(&b.key))
        });
        live
    }

    /// Groups that died this tick and still have a summary to show once.
    pub fn gone_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups
            .values()
            .filter(|g| !g.alive && g.last_detail.is_some())
    }

    #[cfg(test)]
    pub fn group(&self, key: &str) -> Option<&Group> {
        self.groups.get(key)
    }
}
