//! Per-PID reading, parsing and classification.

pub mod classify;
pub mod cpu;
pub mod fs;
pub mod maps;
pub mod record;

pub use classify::{classify_chunks, summarize_chunks, Category};
pub use cpu::{parse_cpu_ticks, CpuBaseline};
pub use fs::{ProcFs, ProcReadError};
pub use maps::{parse_kb_value, parse_rollup, parse_smaps, Chunk, Rollup};
pub use record::{
    filtered_by_args, resolve_identity, Disqualify, GroupBy, Identity, ProcessRecord,
};
