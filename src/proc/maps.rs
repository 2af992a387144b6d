//! Parsers for the per-PID `smaps` and `smaps_rollup` files.
//!
//! `smaps` is a repeating sequence of section lines (address range,
//! permissions, offset, device, inode, optional backing path) each followed
//! by item lines of the form `<Tag>: <uint> kB`. `smaps_rollup` carries item
//! lines only, preceded by one section-like header that is skipped.
//!
//! Unknown item tags are skipped silently. Lines matching neither grammar are
//! diagnostic errors: the parse continues, the first offender per file is
//! logged at warn level and the rest at debug.

use crate::proc::classify::Category;
use crate::summary::Summary;
use tracing::{debug, warn};

/// One virtual memory mapping from the detailed map file.
///
/// Quantities are kilobytes. `category` and `e_size` are filled in by the
/// classifier, not the parser.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub begin: u64,
    pub end: u64,
    /// 4-character permission token, e.g. `r-xp`; position 3 is `s`/`p`.
    pub perms: String,
    pub offset: u64,
    /// Backing identifier: path, `[stack]`, `SYSV…`, or empty for anonymous.
    pub backing: String,
    pub size: i64,
    pub rss: i64,
    pub pss: i64,
    pub shared: i64,
    pub private: i64,
    pub swap: i64,
    pub category: Option<Category>,
    pub e_size: i64,
}

/// One parse of the per-PID rollup file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollup {
    pub pss_anon: i64,
    pub pss_file: i64,
    pub pss_shmem: i64,
    pub swap_pss: i64,
}

impl Rollup {
    /// Semantic mapping onto report categories: anonymous pages are `data`,
    /// file-backed pages are `text`, shmem is `shOth`, SwapPss is `pswap`.
    pub fn to_summary(self) -> Summary {
        let ptotal = self.pss_anon + self.pss_file + self.pss_shmem;
        Summary {
            data: self.pss_anon,
            text: self.pss_file,
            sh_oth: self.pss_shmem,
            pswap: self.swap_pss,
            ptotal,
            pss: ptotal,
            ..Summary::default()
        }
    }
}

/// Item lines that are expected not to match the `<Tag>: <uint> kB` grammar.
const JUNK_PREFIXES: [&str; 3] = ["VmFlags", "THPeligible", "ProtectionKey"];

/// Parses `<kilobyte-count>` from the value part of a meminfo/smaps style
/// line, tolerating the trailing `kB`.
pub fn parse_kb_value(v: &str) -> Option<i64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Parses a section line into an empty chunk, or `None` if the line does not
/// match the section grammar.
fn parse_section_line(line: &str) -> Option<Chunk> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let (begin, end) = range.split_once('-')?;
    let begin = u64::from_str_radix(begin, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    let perms = fields.next()?;
    if perms.len() < 4 || !perms.chars().all(|c| "rwxsp-".contains(c)) {
        return None;
    }

    let offset = u64::from_str_radix(fields.next()?, 16).ok()?;
    let _device = fields.next()?;
    let inode = fields.next()?;
    if !inode.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let backing = fields.collect::<Vec<&str>>().join(" ");
    Some(Chunk {
        begin,
        end,
        perms: perms.to_string(),
        offset,
        backing,
        ..Chunk::default()
    })
}

/// Parses an `<Tag>: <uint> kB` item line into (tag, kilobytes).
fn parse_item_line(line: &str) -> Option<(&str, i64)> {
    let (tag, rest) = line.split_once(':')?;
    if tag.is_empty() || !tag.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let rest = rest.trim();
    let value = rest
        .strip_suffix("kB")
        .or_else(|| rest.strip_suffix("KB"))?
        .trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((tag, value.parse().ok()?))
}

fn report_parse_error(count: &mut u32, origin: &str, lineno: usize, line: &str) {
    if *count == 0 {
        warn!("cannot parse \"{}\" [{}:{}]", line, origin, lineno);
    } else {
        debug!("cannot parse \"{}\" [{}:{}]", line, origin, lineno);
    }
    *count += 1;
}

/// Parses the full detailed map file into an ordered chunk sequence.
///
/// Returns the chunks and the number of lines that matched neither grammar.
pub fn parse_smaps(text: &str, origin: &str) -> (Vec<Chunk>, u32) {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Option<Chunk> = None;
    let mut errors = 0u32;

    for (idx, line) in text.lines().enumerate() {
        if let Some(chunk) = parse_section_line(line) {
            if let Some(done) = current.take() {
                chunks.push(done);
            }
            current = Some(chunk);
            continue;
        }
        if let Some((tag, value)) = parse_item_line(line) {
            let Some(chunk) = current.as_mut() else {
                report_parse_error(&mut errors, origin, idx + 1, line);
                continue;
            };
            match tag {
                "Size" => chunk.size = value,
                "Rss" => chunk.rss = value,
                "Pss" => chunk.pss = value,
                "Swap" => chunk.swap = value,
                _ if tag.starts_with("Shared") => chunk.shared += value,
                _ if tag.starts_with("Private") => chunk.private += value,
                _ => {} // recognized grammar, uninteresting tag
            }
            continue;
        }
        if JUNK_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        report_parse_error(&mut errors, origin, idx + 1, line);
    }
    if let Some(done) = current.take() {
        chunks.push(done);
    }
    (chunks, errors)
}

/// Parses the rollup file. Lines not ending in `kB` (including the leading
/// header line) are skipped; unknown `kB` tags are ignored.
pub fn parse_rollup(text: &str, origin: &str) -> Rollup {
    let mut rollup = Rollup::default();
    let mut errors = 0u32;

    for (idx, line) in text.lines().enumerate() {
        if !line.ends_with("kB") {
            continue;
        }
        let Some((tag, value)) = parse_item_line(line) else {
            report_parse_error(&mut errors, origin, idx + 1, line);
            continue;
        };
        match tag {
            "Pss_Anon" => rollup.pss_anon += value,
            "Pss_File" => rollup.pss_file += value,
            "Pss_Shmem" => rollup.pss_shmem += value,
            "SwapPss" => rollup.swap_pss += value,
            _ => {}
        }
    }
    rollup
}
