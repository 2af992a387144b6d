//! pmemstat — proportional per-process memory and CPU inspection.
//!
//! The core is a periodic `/proc` sampling engine: it discovers live
//! processes, parses their memory maps, classifies every mapping into a
//! category (heap, stack, text, SysV shared, other shared, swap), splits
//! shared memory fairly across sharers via PSS, and rolls related processes
//! into one report row per executable, command line or PID.
//!
//! Sampling is two-tiered: the cheap `smaps_rollup` file is read for every
//! qualified PID on every tick, while the expensive full `smaps` parse runs
//! only for groups whose rollup moved past a configurable delta threshold.
//!
//! The [`sampler::Sampler`] produces an immutable [`report::Report`] per
//! tick; [`report::Formatter`] projects it into the table text. All `/proc`
//! access goes through [`proc::ProcFs`], whose roots tests point at a fake
//! tree.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod proc;
pub mod report;
pub mod sampler;
pub mod startup_checks;
pub mod summary;
pub mod system;

pub use proc::{GroupBy, ProcFs};
pub use report::{Formatter, Report, Units};
pub use sampler::{Options, Sampler};
pub use summary::Summary;
