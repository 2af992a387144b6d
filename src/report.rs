//! Report snapshot types and the pure text formatter.
//!
//! A [`Report`] is an immutable projection of one tick: system vitals, PID
//! counts, the grand total and the ordered, annotated group rows. The
//! [`Formatter`] turns it into the table text; it holds only presentation
//! choices (units, column toggles) and never touches `/proc`.

use chrono::{DateTime, Local};

use crate::proc::record::GroupBy;
use crate::summary::Summary;
use crate::system::{Vitals, ZramStats};

/// Numeric presentation of memory columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Kb,
    Mb,
    /// Decimal megabytes.
    MbDecimal,
    Human,
}

impl Units {
    pub fn parse(s: &str) -> Option<Units> {
        match s {
            "KB" => Some(Units::Kb),
            "MB" => Some(Units::Mb),
            "mB" => Some(Units::MbDecimal),
            "human" => Some(Units::Human),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Units::Kb => "KB",
            Units::Mb => "MB",
            Units::MbDecimal => "mB",
            Units::Human => "human",
        }
    }

    fn divisor(self) -> i64 {
        match self {
            Units::Kb => 1024,
            Units::Mb => 1024 * 1024,
            Units::MbDecimal => 1_000_000,
            Units::Human => 1,
        }
    }

    fn width(self) -> usize {
        match self {
            Units::Kb => 11,
            Units::Mb | Units::MbDecimal => 8,
            Units::Human => 7,
        }
    }
}

/// Per-row marker in the annotation column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// Grand total.
    Total,
    /// Newly appeared group.
    New,
    /// Tail overflow bucket.
    Others,
    /// Group that vanished this tick; shown once.
    Gone,
    /// Crossed the delta threshold; signed KB since the prior summary.
    Delta(i64),
    /// Live and unchanged.
    Unchanged,
}

impl Annotation {
    pub fn label(self) -> String {
        match self {
            Annotation::Total => "T".to_string(),
            Annotation::New => "A".to_string(),
            Annotation::Others => "O".to_string(),
            Annotation::Gone => "x".to_string(),
            Annotation::Delta(d) => format!("{}K", signed_thousands(d)),
            Annotation::Unchanged => " ".to_string(),
        }
    }
}

/// One annotated group row.
#[derive(Debug, Clone)]
pub struct Row {
    pub annotation: Annotation,
    pub summary: Summary,
}

/// Immutable result of one tick, handed to the rendering layer.
#[derive(Debug, Clone)]
pub struct Report {
    pub time: DateTime<Local>,
    pub vitals: Vitals,
    pub zram: Option<ZramStats>,
    /// Qualified PIDs this tick.
    pub pids_wanted: usize,
    /// All non-kernel PIDs this tick.
    pub pids_total: usize,
    pub group_by: GroupBy,
    pub grand: Summary,
    pub rows: Vec<Row>,
}

/// Concise byte count: repeated /1024 with K/M/G/T suffixes.
pub fn human(bytes: f64) -> String {
    if bytes <= 0.0 {
        return "0".to_string();
    }
    let mut n = bytes;
    for suffix in ["K", "M", "G"] {
        n /= 1024.0;
        if n < 999.95 {
            return format!("{n:.1}{suffix}");
        }
    }
    format!("{:.1}T", n / 1024.0)
}

/// Groups digits in threes: 1234567 -> "1,234,567".
pub fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    let lead = digits.len() % 3;
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && idx % 3 == lead % 3 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn signed_thousands(n: i64) -> String {
    if n >= 0 {
        format!("+{}", thousands(n))
    } else {
        thousands(n)
    }
}

/// Pure renderer from a [`Report`] to table text.
#[derive(Debug, Clone)]
pub struct Formatter {
    pub units: Units,
    pub group_by: GroupBy,
    pub show_cpu: bool,
    /// Merge shSYSV, shOth, stack and text into one `other` column.
    pub collapse_other: bool,
    /// Also show the rollup `pss` column.
    pub debug: bool,
}

impl Formatter {
    pub fn new(units: Units, group_by: GroupBy) -> Self {
        Self {
            units,
            group_by,
            show_cpu: false,
            collapse_other: false,
            debug: false,
        }
    }

    fn cell(&self, kb: i64) -> String {
        let width = self.units.width();
        let divisor = self.units.divisor();
        if divisor > 1 {
            let scaled = ((kb as f64) * 1024.0 / divisor as f64).round() as i64;
            format!("{:>width$}", thousands(scaled))
        } else {
            format!("{:>width$}", human((kb as f64) * 1024.0))
        }
    }

    fn label_cell(&self, label: &str) -> String {
        format!("{:>width$}", label, width = self.units.width())
    }

    /// Header line matching the row layout.
    pub fn header(&self) -> String {
        let mut head = String::new();
        if self.show_cpu {
            head.push_str(&self.label_cell("cpu_pct"));
        }
        head.push_str(&self.label_cell("pswap"));
        if self.collapse_other {
            head.push_str(&self.label_cell("other"));
        } else {
            for label in ["shSYSV", "shOth", "stack", "text"] {
                head.push_str(&self.label_cell(label));
            }
        }
        head.push_str(&self.label_cell("data"));
        head.push_str(&self.label_cell("ptotal"));
        if self.debug {
            head.push_str(&self.label_cell("pss"));
        }
        format!("{head}   key/info ({} by mem)", self.group_by.as_str())
    }

    /// One table row: numeric cells, annotation, count and label.
    pub fn format_row(&self, annotation: &str, summary: &Summary) -> String {
        let mut body = String::new();
        if self.show_cpu {
            body.push_str(&format!(
                "{:>width$.1}",
                summary.cpu_pct,
                width = self.units.width()
            ));
        }
        body.push_str(&self.cell(summary.pswap));
        if self.collapse_other {
            let other = summary.sh_sysv + summary.sh_oth + summary.stack + summary.text;
            body.push_str(&self.cell(other));
        } else {
            for value in [summary.sh_sysv, summary.sh_oth, summary.stack, summary.text] {
                body.push_str(&self.cell(value));
            }
        }
        body.push_str(&self.cell(summary.data));
        body.push_str(&self.cell(summary.ptotal));
        if self.debug {
            body.push_str(&self.cell(summary.pss));
        }

        let count = if summary.number <= 0 {
            (-summary.number).to_string()
        } else {
            format!("{}x", summary.number)
        };
        format!("{body} {annotation} {count} {}", summary.info)
    }

    fn leader(&self, report: &Report) -> String {
        let v = &report.vitals;
        let used = v.mem_total_kb - v.mem_avail_kb;
        let mut line = format!("--- {}", report.time.format("%H:%M:%S"));
        line.push_str(&format!(" Tot={}", human((v.mem_total_kb * 1024) as f64)));
        line.push_str(&format!(" Used={}", human((used * 1024) as f64)));
        line.push_str(&format!(" Avail={}", human((v.mem_avail_kb * 1024) as f64)));
        if report.grand.ptotal > 0 {
            let other = v.mem_total_kb - report.grand.ptotal - v.mem_avail_kb - v.shmem_kb;
            line.push_str(&format!(" Oth={}", human((other * 1024) as f64)));
        }
        line.push_str(&format!(" Sh+Tmp={}", human((v.shmem_kb * 1024) as f64)));
        if report.pids_wanted < report.pids_total {
            line.push_str(&format!(
                " PIDs={}/{}",
                report.pids_wanted, report.pids_total
            ));
        } else {
            line.push_str(&format!(" PIDs={}", report.pids_total));
        }
        line
    }

    /// Renders the complete per-tick block, trailing newline included.
    pub fn render(&self, report: &Report) -> String {
        let mut out = String::new();
        out.push_str(&self.leader(report));
        out.push('\n');

        if let Some(zram) = &report.zram {
            out.push_str(&format!(
                " zRAM={} orig={} compr={} ratio={:.1}\n",
                human(zram.mem_used_total as f64),
                human(zram.orig_data_size as f64),
                human(zram.compr_data_size as f64),
                zram.ratio()
            ));
        }

        out.push_str(&self.header());
        out.push('\n');

        let mut grand = report.grand.clone();
        grand.info = format!("--TOTALS in {} --", self.units.label());
        out.push_str(&self.format_row(&Annotation::Total.label(), &grand));
        out.push('\n');

        for row in &report.rows {
            out.push_str(&self.format_row(&row.annotation.label(), &row.summary));
            out.push('\n');
        }
        out
    }
}
