//! Chunk categorization.
//!
//! Each mapping is assigned a category and an effective size by a fixed
//! decision procedure, first match wins:
//!
//! 1. shared mappings split into SYSV and other shared, charged at PSS;
//! 2. the named `[stack]` mapping, charged at its private pages;
//! 3. the guard-page pair: a one-page inaccessible anonymous mapping whose
//!    offset equals its start, immediately followed by an anonymous writable
//!    mapping sharing its end address with a size in the 10000..=20000 kB
//!    band, is a thread stack whose kernel-reported size is bogus — the guard
//!    becomes zero-cost data, the follower becomes stack charged at
//!    private + swap;
//! 4. remaining inaccessible mappings are zero-cost data;
//! 5. writable mappings are data charged at RSS + swap;
//! 6. everything else is text charged at PSS + swap.
//!
//! The procedure is a pure function of the chunk sequence: re-running it over
//! the same chunks yields the same assignment.

use crate::proc::maps::Chunk;
use crate::summary::Summary;

/// Closed set of report categories for one mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// SYSV shared memory segment.
    ShSysv,
    /// Other shared mapping, e.g. a memory-mapped file.
    ShOth,
    /// Stack, main or thread.
    Stack,
    /// Read-only / executable pages.
    Text,
    /// Writable pages (heap and friends) plus zero-cost placeholders.
    Data,
}

/// Size band (kB) of the writable region following a thread-stack guard page.
/// Empirical; revisit if thread-stack layouts change.
const STACK_BAND_KB: std::ops::RangeInclusive<i64> = 10_000..=20_000;

fn is_guard_page(chunk: &Chunk) -> bool {
    chunk.size == 4
        && chunk.perms.contains("---p")
        && chunk.backing.is_empty()
        && chunk.offset == chunk.begin
}

fn is_stack_follower(guard: &Chunk, next: &Chunk) -> bool {
    guard.end == next.end
        && next.perms.contains('w')
        && next.backing.is_empty()
        && next.offset == next.begin
        && STACK_BAND_KB.contains(&next.size)
}

/// Assigns `category` and `e_size` to every chunk in order. Chunks already
/// categorized (the follower of a guard page) are left untouched.
pub fn classify_chunks(chunks: &mut [Chunk]) {
    for idx in 0..chunks.len() {
        if chunks[idx].category.is_some() {
            continue;
        }

        let chunk = &chunks[idx];
        let (category, e_size) = if chunk.perms.contains('s') {
            if chunk.backing.contains("SYSV") {
                (Category::ShSysv, chunk.pss)
            } else {
                (Category::ShOth, chunk.pss)
            }
        } else if chunk.backing.contains("[stack]") {
            (Category::Stack, chunk.private)
        } else if is_guard_page(chunk)
            && idx + 1 < chunks.len()
            && is_stack_follower(chunk, &chunks[idx + 1])
        {
            let next = &chunks[idx + 1];
            let next_e_size = next.private + next.swap;
            chunks[idx + 1].category = Some(Category::Stack);
            chunks[idx + 1].e_size = next_e_size;
            (Category::Data, 0)
        } else if chunk.perms.contains("---") {
            (Category::Data, 0)
        } else if chunk.perms.contains('w') {
            (Category::Data, chunk.rss + chunk.swap)
        } else {
            (Category::Text, chunk.pss + chunk.swap)
        };

        chunks[idx].category = Some(category);
        chunks[idx].e_size = e_size;
    }
}

/// Sums categorized chunks into the per-PID contribution to its group.
pub fn summarize_chunks(pid: u32, chunks: &[Chunk]) -> Summary {
    let mut summary = Summary::for_pid(pid);
    for chunk in chunks {
        let Some(category) = chunk.category else {
            continue;
        };
        match category {
            Category::ShSysv => summary.sh_sysv += chunk.e_size,
            Category::ShOth => summary.sh_oth += chunk.e_size,
            Category::Stack => summary.stack += chunk.e_size,
            Category::Text => summary.text += chunk.e_size,
            Category::Data => summary.data += chunk.e_size,
        }
        summary.ptotal += chunk.e_size;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(perms: &str, backing: &str) -> Chunk {
        Chunk {
            perms: perms.to_string(),
            backing: backing.to_string(),
            ..Chunk::default()
        }
    }

    fn guard_pair() -> Vec<Chunk> {
        let guard = Chunk {
            begin: 0x1000,
            end: 0x2000,
            offset: 0x1000,
            size: 4,
            ..chunk("---p", "")
        };
        let follower = Chunk {
            begin: 0x2000,
            end: 0x2000, // shares `end` with the guard
            offset: 0x2000,
            size: 10240,
            private: 20,
            swap: 0,
            ..chunk("rw-p", "")
        };
        vec![guard, follower]
    }

    // -------------------------------------------------------------------------
    // Tests for the decision procedure
    // -------------------------------------------------------------------------

    #[test]
    fn test_shared_sysv_charged_at_pss() {
        let mut chunks = vec![Chunk {
            pss: 512,
            rss: 1024,
            ..chunk("rw-s", "/SYSV00000000 (deleted)")
        }];
        classify_chunks(&mut chunks);
        assert_eq!(chunks[0].category, Some(Category::ShSysv));
        assert_eq!(chunks[0].e_size, 512);
    }

    #[test]
    fn test_shared_other_charged_at_pss() {
        let mut chunks = vec![Chunk {
            pss: 40,
            ..chunk("r--s", "/usr/lib/locale/locale-archive")
        }];
        classify_chunks(&mut chunks);
        assert_eq!(chunks[0].category, Some(Category::ShOth));
        assert_eq!(chunks[0].e_size, 40);
    }

    #[test]
    fn test_named_stack_charged_at_private() {
        let mut chunks = vec![Chunk {
            private: 132,
            rss: 140,
            ..chunk("rw-p", "[stack]")
        }];
        classify_chunks(&mut chunks);
        assert_eq!(chunks[0].category, Some(Category::Stack));
        assert_eq!(chunks[0].e_size, 132);
    }

    #[test]
    fn test_writable_is_data_rss_plus_swap() {
        let mut chunks = vec![Chunk {
            rss: 1000,
            swap: 200,
            ..chunk("rw-p", "")
        }];
        classify_chunks(&mut chunks);
        assert_eq!(chunks[0].category, Some(Category::Data));
        assert_eq!(chunks[0].e_size, 1200);
    }

    #[test]
    fn test_readonly_is_text_pss_plus_swap() {
        let mut chunks = vec![Chunk {
            pss: 40,
            rss: 80,
            swap: 1,
            ..chunk("r-xp", "/usr/bin/foo")
        }];
        classify_chunks(&mut chunks);
        assert_eq!(chunks[0].category, Some(Category::Text));
        assert_eq!(chunks[0].e_size, 41);
    }

    #[test]
    fn test_inaccessible_is_zero_cost_data() {
        let mut chunks = vec![Chunk {
            size: 1024,
            rss: 4,
            ..chunk("---p", "/usr/lib/libfoo.so")
        }];
        classify_chunks(&mut chunks);
        assert_eq!(chunks[0].category, Some(Category::Data));
        assert_eq!(chunks[0].e_size, 0);
    }

    // -------------------------------------------------------------------------
    // Tests for the pseudo-stack guard
    // -------------------------------------------------------------------------

    #[test]
    fn test_guard_pair_promotes_follower_to_stack() {
        let mut chunks = guard_pair();
        classify_chunks(&mut chunks);
        assert_eq!(chunks[0].category, Some(Category::Data));
        assert_eq!(chunks[0].e_size, 0);
        assert_eq!(chunks[1].category, Some(Category::Stack));
        assert_eq!(chunks[1].e_size, 20);
    }

    #[test]
    fn test_guard_requires_every_condition() {
        // Violating any one condition leaves the pair in its unguarded
        // categorization: guard still data/0, follower becomes plain data.
        let break_guard: &[fn(&mut Vec<Chunk>)] = &[
            |c| c[0].size = 8,
            |c| c[0].perms = "r--p".into(),
            |c| c[0].backing = "/x".into(),
            |c| c[0].offset = 0,
            |c| c[1].end = 0x9999,
            |c| c[1].perms = "r--p".into(),
            |c| c[1].backing = "[heap]".into(),
            |c| c[1].offset = 0,
            |c| c[1].size = 9_999,
            |c| c[1].size = 20_001,
        ];
        for mutate in break_guard {
            let mut chunks = guard_pair();
            mutate(&mut chunks);
            classify_chunks(&mut chunks);
            assert_ne!(
                chunks[1].category,
                Some(Category::Stack),
                "follower must not be stack after violating a guard condition"
            );
        }
    }

    #[test]
    fn test_guard_band_boundaries_inclusive() {
        for size in [10_000, 20_000] {
            let mut chunks = guard_pair();
            chunks[1].size = size;
            classify_chunks(&mut chunks);
            assert_eq!(chunks[1].category, Some(Category::Stack));
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        let mut chunks = guard_pair();
        chunks.push(Chunk {
            pss: 40,
            ..chunk("r-xp", "/usr/bin/foo")
        });
        classify_chunks(&mut chunks);
        let first = chunks.clone();
        classify_chunks(&mut chunks);
        for (a, b) in first.iter().zip(chunks.iter()) {
            assert_eq!(a.category, b.category);
            assert_eq!(a.e_size, b.e_size);
        }
    }

    // -------------------------------------------------------------------------
    // Tests for summarize_chunks
    // -------------------------------------------------------------------------

    #[test]
    fn test_summarize_adds_e_size_per_category() {
        let mut chunks = guard_pair();
        chunks.push(Chunk {
            pss: 40,
            ..chunk("r-xp", "/usr/bin/foo")
        });
        chunks.push(Chunk {
            rss: 100,
            swap: 10,
            ..chunk("rw-p", "[heap]")
        });
        classify_chunks(&mut chunks);
        let summary = summarize_chunks(77, &chunks);

        assert_eq!(summary.stack, 20);
        assert_eq!(summary.text, 40);
        assert_eq!(summary.data, 110);
        assert_eq!(summary.ptotal, 170);
        assert_eq!(summary.number, -77);
        assert_eq!(summary.pswap, 0); // pswap comes from the rollup, never chunks
    }
}
