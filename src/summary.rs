//! Additive category roll-ups for processes and groups.
//!
//! A [`Summary`] is one row of the report before formatting: the per-category
//! kilobyte totals plus the contributor count and display label. Summaries
//! for a single PID carry the negated PID in `number`; accumulating any
//! summary into a running total turns that into a plain count.

/// Category totals in kilobytes for one PID, one group, or a grand total.
///
/// `ptotal` is the sum of all category fields except `pswap`. `pss` mirrors
/// the rollup-file proportional total and is only shown in debug output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub cpu_pct: f64,
    pub pswap: i64,
    pub sh_sysv: i64,
    pub sh_oth: i64,
    pub stack: i64,
    pub text: i64,
    pub data: i64,
    pub ptotal: i64,
    pub pss: i64,
    /// Count of contributing processes if positive; negated PID for a
    /// single-process summary; 0 for an empty accumulator.
    pub number: i64,
    /// Display label (group key, or PID plus command in pid grouping).
    pub info: String,
}

impl Summary {
    /// Empty accumulator carrying a display label.
    pub fn with_info(info: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            ..Self::default()
        }
    }

    /// Summary for a single PID; `number` holds the negated PID so the
    /// formatter can tell singletons from counts.
    pub fn for_pid(pid: u32) -> Self {
        Self {
            number: -i64::from(pid),
            ..Self::default()
        }
    }

    /// Adds `other` into `self`. `info` is left alone; `number` adds the
    /// count, treating non-positive values (empty or single-PID) as one
    /// contributor.
    pub fn accumulate(&mut self, other: &Summary) {
        self.cpu_pct += other.cpu_pct;
        self.pswap += other.pswap;
        self.sh_sysv += other.sh_sysv;
        self.sh_oth += other.sh_oth;
        self.stack += other.stack;
        self.text += other.text;
        self.data += other.data;
        self.ptotal += other.ptotal;
        self.pss += other.pss;
        self.number += if other.number <= 0 { 1 } else { other.number };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_sums_categories() {
        let mut total = Summary::with_info("totals");
        let mut a = Summary::for_pid(10);
        a.data = 100;
        a.text = 40;
        a.ptotal = 140;
        let mut b = Summary::for_pid(11);
        b.data = 300;
        b.ptotal = 300;

        total.accumulate(&a);
        total.accumulate(&b);

        assert_eq!(total.data, 400);
        assert_eq!(total.text, 40);
        assert_eq!(total.ptotal, 440);
        assert_eq!(total.info, "totals");
    }

    #[test]
    fn test_accumulate_number_counts_singletons() {
        let mut group = Summary::default();
        group.accumulate(&Summary::for_pid(42));
        group.accumulate(&Summary::for_pid(43));
        assert_eq!(group.number, 2);

        // Folding a group into a grand total adds its count, not 1.
        let mut grand = Summary::default();
        grand.accumulate(&group);
        assert_eq!(grand.number, 2);
    }

    #[test]
    fn test_for_pid_is_negated() {
        assert_eq!(Summary::for_pid(1234).number, -1234);
    }
}
