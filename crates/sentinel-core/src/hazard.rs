use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::tick::Tick;

// MemoryChecker — Debug-mode use history of one storage region
//
// Autograd saves tensors for the backward pass and assumes nobody writes to
// them in place before backward runs. The MemoryChecker lets that assumption
// be verified: every instrumented operation records how it used the bytes of
// a region (read, write, invalidate, ...) together with a Tick, and the
// autograd engine later asks "has this region been mutated since tick t?".
//
// The checker lives on the storage region, not on the tensor: views alias
// the same bytes, so they must share one history.
//
// STATE
//
//   Unused ──record_use──▶ Recorded ──record_use──▶ Recorded ...
//
// HISTORY
//
//   Each record holds the exact bytes a use touched, as sorted disjoint
//   intervals (a stride-2 view touches every other element, not the span
//   between its first and last byte). Records are appended in tick order. A
//   new record that repeats the kind of the previous record and covers all
//   of its bytes replaces it. At most `history_limit` records are retained;
//   older ones are evicted, but the last-read and last-mutation ticks are
//   kept exactly, so region-level checks never lose precision. Byte-level
//   checks fall back to the region-level answer once the history no longer
//   reaches back far enough.
//
//   The limit is fixed once: at construction, by the first `configure_history_limit`,
//   or by the first recorded use (DEFAULT_HISTORY_LIMIT).
//
// FAILURES
//
//   Detection only. Every check returns a bool or a `Result<(), Hazard>`;
//   whether a hazard aborts, warns or raises is the caller's decision.

/// Default number of use records retained per region.
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

/// How an operation uses the memory of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorUse {
    /// Contents are read and not modified.
    Read,
    /// Contents are fully overwritten; prior contents are irrelevant.
    Write,
    /// Contents are read and then modified.
    ReadWrite,
    /// Contents are read, and are not expected to survive the operation.
    ReadInvalidate,
    /// Contents are not expected to survive; nothing is read.
    Invalidate,
}

impl TensorUse {
    pub fn reads(self) -> bool {
        matches!(
            self,
            TensorUse::Read | TensorUse::ReadWrite | TensorUse::ReadInvalidate
        )
    }

    /// Leaves the bytes holding defined, newly produced values.
    pub fn writes(self) -> bool {
        matches!(self, TensorUse::Write | TensorUse::ReadWrite)
    }

    /// Leaves the bytes holding undefined values.
    pub fn invalidates(self) -> bool {
        matches!(self, TensorUse::ReadInvalidate | TensorUse::Invalidate)
    }

    /// Anything but a plain read counts as a change of the region.
    pub fn mutates(self) -> bool {
        self != TensorUse::Read
    }
}

impl fmt::Display for TensorUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TensorUse::Read => "read",
            TensorUse::Write => "write",
            TensorUse::ReadWrite => "read-write",
            TensorUse::ReadInvalidate => "read-invalidate",
            TensorUse::Invalidate => "invalidate",
        };
        write!(f, "{}", s)
    }
}

/// One recorded use: when, how, and which bytes of the region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseRecord {
    pub tick: Tick,
    pub kind: TensorUse,
    /// Sorted, disjoint byte intervals.
    pub footprint: Vec<Range<usize>>,
}

impl UseRecord {
    /// Smallest interval containing the footprint.
    pub fn span(&self) -> Range<usize> {
        hull(&self.footprint)
    }
}

/// A memory hazard found by a [`MemoryChecker`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Hazard {
    /// The region was mutated after the tick at which it was assumed stable.
    #[error("storage region modified at {modified_at}, after {since}")]
    ChangedSince { since: Tick, modified_at: Tick },

    /// Bytes are read whose contents were invalidated and never rewritten.
    #[error("bytes {range:?} read after being invalidated at {invalidated_at}")]
    ReadAfterInvalidate {
        range: Range<usize>,
        invalidated_at: Tick,
    },
}

/// Whether a region has seen any recorded use yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerState {
    Unused,
    Recorded,
}

#[derive(Debug)]
struct History {
    records: VecDeque<UseRecord>,
    history_limit: Option<usize>,
    /// Highest tick among evicted records.
    evicted_through: Option<Tick>,
    last_read: Option<Tick>,
    last_mutation: Option<Tick>,
    uses: u64,
}

/// Per-region record of memory uses, consulted in debug mode.
#[derive(Debug)]
pub struct MemoryChecker {
    history: Mutex<History>,
}

impl Default for MemoryChecker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

// Footprints: sorted, disjoint, non-empty byte intervals.

fn normalize(ranges: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut sorted: Vec<Range<usize>> = ranges.iter().filter(|r| r.start < r.end).cloned().collect();
    sorted.sort_unstable_by_key(|r| r.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(sorted.len());
    for r in sorted {
        match merged.last_mut() {
            Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
            _ => merged.push(r),
        }
    }
    merged
}

fn hull(footprint: &[Range<usize>]) -> Range<usize> {
    match (footprint.first(), footprint.last()) {
        (Some(first), Some(last)) => first.start..last.end,
        _ => 0..0,
    }
}

fn intersect(a: &[Range<usize>], b: &[Range<usize>]) -> Vec<Range<usize>> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        let start = a[i].start.max(b[j].start);
        let end = a[i].end.min(b[j].end);
        if start < end {
            out.push(start..end);
        }
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn overlaps(a: &[Range<usize>], b: &[Range<usize>]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].start < b[j].end && b[j].start < a[i].end {
            return true;
        }
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    false
}

/// True if every byte of `target` lies inside `cover`.
fn covers(cover: &[Range<usize>], target: &[Range<usize>]) -> bool {
    let mut j = 0;
    for t in target {
        while j < cover.len() && cover[j].end <= t.start {
            j += 1;
        }
        match cover.get(j) {
            Some(c) if c.start <= t.start && t.end <= c.end => {}
            _ => return false,
        }
    }
    true
}

impl MemoryChecker {
    /// A checker retaining at most `history_limit` use records.
    pub fn new(history_limit: usize) -> Self {
        Self::with_limit(Some(history_limit))
    }

    /// A checker whose history limit is fixed later, see
    /// [`MemoryChecker::configure_history_limit`].
    pub fn unconfigured() -> Self {
        Self::with_limit(None)
    }

    fn with_limit(history_limit: Option<usize>) -> Self {
        MemoryChecker {
            history: Mutex::new(History {
                records: VecDeque::new(),
                history_limit,
                evicted_through: None,
                last_read: None,
                last_mutation: None,
                uses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fix the history limit if it is not fixed yet. Returns the limit in effect.
    pub fn configure_history_limit(&self, history_limit: usize) -> usize {
        *self.lock().history_limit.get_or_insert(history_limit)
    }

    pub fn history_limit(&self) -> Option<usize> {
        self.lock().history_limit
    }

    /// Record one use of the bytes `footprint` (intervals of the region, in
    /// any order) at `tick`.
    ///
    /// Never fails. Callers are expected to skip this entirely outside debug
    /// mode (see [`crate::debug::DebugGate`]).
    pub fn record_use(&self, kind: TensorUse, footprint: &[Range<usize>], tick: Tick) {
        let footprint = normalize(footprint);
        let mut h = self.lock();
        let limit = *h.history_limit.get_or_insert(DEFAULT_HISTORY_LIMIT);
        h.uses += 1;
        if kind.reads() {
            h.last_read = Some(h.last_read.map_or(tick, |t| t.max(tick)));
        }
        if kind.mutates() {
            h.last_mutation = Some(h.last_mutation.map_or(tick, |t| t.max(tick)));
        }
        let span = hull(&footprint);
        tracing::trace!(
            %kind,
            start = span.start,
            end = span.end,
            intervals = footprint.len(),
            %tick,
            "record use"
        );

        let superseded = h
            .records
            .back()
            .is_some_and(|last| last.kind == kind && covers(&footprint, &last.footprint));
        if superseded {
            h.records.pop_back();
        }
        h.records.push_back(UseRecord {
            tick,
            kind,
            footprint,
        });
        while h.records.len() > limit {
            if let Some(old) = h.records.pop_front() {
                h.evicted_through = Some(h.evicted_through.map_or(old.tick, |t| t.max(old.tick)));
            }
        }
    }

    pub fn state(&self) -> CheckerState {
        if self.lock().uses == 0 {
            CheckerState::Unused
        } else {
            CheckerState::Recorded
        }
    }

    /// Number of uses recorded since creation (including merged ones).
    pub fn use_count(&self) -> u64 {
        self.lock().uses
    }

    pub fn last_read(&self) -> Option<Tick> {
        self.lock().last_read
    }

    /// Tick of the latest mutating use (write, read-write or invalidate).
    pub fn last_write(&self) -> Option<Tick> {
        self.lock().last_mutation
    }

    /// Snapshot of the retained history, oldest first.
    pub fn records(&self) -> Vec<UseRecord> {
        self.lock().records.iter().cloned().collect()
    }

    /// Forget all history and return to the unused state. The history limit stays.
    pub fn clear(&self) {
        let mut h = self.lock();
        h.records.clear();
        h.evicted_through = None;
        h.last_read = None;
        h.last_mutation = None;
        h.uses = 0;
    }

    /// True if nothing mutated the region with a tick strictly after `tick`.
    pub fn unchanged_since(&self, tick: Tick) -> bool {
        self.lock().last_mutation.map_or(true, |m| m <= tick)
    }

    /// Like [`MemoryChecker::unchanged_since`], restricted to the bytes `footprint`.
    pub fn range_unchanged_since(&self, tick: Tick, footprint: &[Range<usize>]) -> bool {
        self.ensure_range_unchanged_since(tick, footprint).is_ok()
    }

    /// `Result` form of [`MemoryChecker::range_unchanged_since`].
    pub fn ensure_range_unchanged_since(
        &self,
        tick: Tick,
        footprint: &[Range<usize>],
    ) -> Result<(), Hazard> {
        let query = normalize(footprint);
        let h = self.lock();
        let modified = if h.evicted_through.is_some_and(|e| e > tick) {
            h.last_mutation
        } else {
            h.records
                .iter()
                .filter(|r| r.kind.mutates() && overlaps(&r.footprint, &query))
                .map(|r| r.tick)
                .max()
        };
        match modified {
            Some(modified_at) if modified_at > tick => {
                tracing::debug!(%tick, %modified_at, span = ?hull(&query), "bytes changed since saved tick");
                Err(Hazard::ChangedSince {
                    since: tick,
                    modified_at,
                })
            }
            _ => Ok(()),
        }
    }

    /// `Result` form of [`MemoryChecker::unchanged_since`].
    pub fn ensure_unchanged_since(&self, tick: Tick) -> Result<(), Hazard> {
        match self.lock().last_mutation {
            Some(modified_at) if modified_at > tick => {
                tracing::debug!(%tick, %modified_at, "region changed since saved tick");
                Err(Hazard::ChangedSince {
                    since: tick,
                    modified_at,
                })
            }
            _ => Ok(()),
        }
    }

    /// Validate a prospective use of the bytes `footprint` before it happens.
    ///
    /// A use that reads bytes whose latest state is "invalidated" (an
    /// invalidating use not followed by a write of those bytes) is a hazard.
    pub fn check_use(&self, kind: TensorUse, footprint: &[Range<usize>]) -> Result<(), Hazard> {
        let query = normalize(footprint);
        if !kind.reads() || query.is_empty() {
            return Ok(());
        }
        let h = self.lock();
        let mut rewritten: Vec<Range<usize>> = Vec::new();
        for record in h.records.iter().rev() {
            let part = intersect(&record.footprint, &query);
            if part.is_empty() {
                continue;
            }
            if record.kind.invalidates() && !covers(&rewritten, &part) {
                tracing::debug!(%kind, invalidated_at = %record.tick, "read after invalidate");
                return Err(Hazard::ReadAfterInvalidate {
                    range: hull(&part),
                    invalidated_at: record.tick,
                });
            }
            if record.kind.writes() {
                rewritten.extend(part);
                rewritten = normalize(&rewritten);
                if covers(&rewritten, &query) {
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_checker_is_unused() {
        let c = MemoryChecker::default();
        assert_eq!(c.state(), CheckerState::Unused);
        assert!(c.unchanged_since(Tick::ZERO));
        assert_eq!(c.last_write(), None);
    }

    #[test]
    fn test_write_at_five() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Write, &[0..16], Tick(5));
        assert_eq!(c.state(), CheckerState::Recorded);
        assert!(!c.unchanged_since(Tick(3)));
        assert!(c.unchanged_since(Tick(5)));
        assert!(c.unchanged_since(Tick(6)));
        assert_eq!(
            c.ensure_unchanged_since(Tick(3)),
            Err(Hazard::ChangedSince {
                since: Tick(3),
                modified_at: Tick(5)
            })
        );
    }

    #[test]
    fn test_reads_do_not_count_as_changes() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Read, &[0..8], Tick(10));
        assert!(c.unchanged_since(Tick(1)));
        assert_eq!(c.last_read(), Some(Tick(10)));
    }

    #[test]
    fn test_every_mutating_kind_changes_region() {
        for kind in [
            TensorUse::Write,
            TensorUse::ReadWrite,
            TensorUse::ReadInvalidate,
            TensorUse::Invalidate,
        ] {
            let c = MemoryChecker::default();
            c.record_use(kind, &[0..4], Tick(2));
            assert!(!c.unchanged_since(Tick(1)), "{kind} should count as a change");
        }
    }

    #[test]
    fn test_range_precise_check() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Write, &[0..16], Tick(2));
        c.record_use(TensorUse::Write, &[32..48], Tick(7));
        assert!(c.range_unchanged_since(Tick(3), &[0..16]));
        assert!(!c.range_unchanged_since(Tick(3), &[40..44]));
        assert!(!c.unchanged_since(Tick(3)));
        assert_eq!(
            c.ensure_range_unchanged_since(Tick(1), &[0..40]),
            Err(Hazard::ChangedSince {
                since: Tick(1),
                modified_at: Tick(7)
            })
        );
    }

    #[test]
    fn test_interleaved_footprints_are_independent() {
        // Even and odd f32 elements of an 8-element region.
        let even = [0..4, 8..12, 16..20, 24..28];
        let odd = [4..8, 12..16, 20..24, 28..32];
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Invalidate, &even, Tick(3));
        assert!(c.check_use(TensorUse::Read, &odd).is_ok());
        assert!(c.range_unchanged_since(Tick(1), &odd));
        assert!(!c.range_unchanged_since(Tick(1), &even));
        assert_eq!(
            c.check_use(TensorUse::Read, &[0..32]),
            Err(Hazard::ReadAfterInvalidate {
                range: 0..28,
                invalidated_at: Tick(3)
            })
        );
    }

    #[test]
    fn test_range_check_falls_back_after_eviction() {
        let c = MemoryChecker::new(1);
        c.record_use(TensorUse::Write, &[0..8], Tick(4));
        c.record_use(TensorUse::Read, &[100..108], Tick(5));
        assert_eq!(c.records().len(), 1);
        // The write to 0..8 was evicted; the answer must stay conservative.
        assert!(!c.range_unchanged_since(Tick(3), &[200..208]));
        assert!(c.range_unchanged_since(Tick(4), &[0..8]));
    }

    #[test]
    fn test_superseding_record_replaces_previous() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Read, &[4..8], Tick(1));
        c.record_use(TensorUse::Read, &[0..16], Tick(2));
        c.record_use(TensorUse::Write, &[0..16], Tick(3));
        let records = c.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].footprint, vec![0..16]);
        assert_eq!(records[0].tick, Tick(2));
        assert_eq!(c.use_count(), 3);
    }

    #[test]
    fn test_footprint_is_normalized() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Read, &[8..12, 0..4, 4..6, 20..20], Tick(1));
        let records = c.records();
        assert_eq!(records[0].footprint, vec![0..6, 8..12]);
        assert_eq!(records[0].span(), 0..12);
    }

    #[test]
    fn test_read_after_invalidate() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::ReadInvalidate, &[0..16], Tick(1));
        let err = c.check_use(TensorUse::Read, &[8..24]).unwrap_err();
        assert_eq!(
            err,
            Hazard::ReadAfterInvalidate {
                range: 8..16,
                invalidated_at: Tick(1)
            }
        );
        // Writing needs no prior contents.
        assert!(c.check_use(TensorUse::Write, &[0..16]).is_ok());
        assert!(c.check_use(TensorUse::Read, &[16..24]).is_ok());
    }

    #[test]
    fn test_rewrite_clears_invalidation() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Invalidate, &[0..16], Tick(1));
        c.record_use(TensorUse::Write, &[0..8], Tick(2));
        assert!(c.check_use(TensorUse::Read, &[0..8]).is_ok());
        // Bytes 8..16 are still undefined.
        assert!(c.check_use(TensorUse::ReadWrite, &[0..16]).is_err());
        c.record_use(TensorUse::Write, &[8..16], Tick(3));
        assert!(c.check_use(TensorUse::ReadWrite, &[0..16]).is_ok());
    }

    #[test]
    fn test_clear_resets_state() {
        let c = MemoryChecker::default();
        c.record_use(TensorUse::Invalidate, &[0..4], Tick(9));
        c.clear();
        assert_eq!(c.state(), CheckerState::Unused);
        assert!(c.unchanged_since(Tick::ZERO));
        assert!(c.check_use(TensorUse::Read, &[0..4]).is_ok());
    }

    #[test]
    fn test_history_limit_fixed_once() {
        let c = MemoryChecker::unconfigured();
        assert_eq!(c.history_limit(), None);
        assert_eq!(c.configure_history_limit(2), 2);
        assert_eq!(c.configure_history_limit(10), 2);

        let d = MemoryChecker::unconfigured();
        d.record_use(TensorUse::Read, &[0..4], Tick(1));
        assert_eq!(d.history_limit(), Some(DEFAULT_HISTORY_LIMIT));
    }

    #[test]
    fn test_use_classification() {
        assert!(TensorUse::ReadInvalidate.reads());
        assert!(TensorUse::ReadInvalidate.invalidates());
        assert!(!TensorUse::Invalidate.reads());
        assert!(TensorUse::ReadWrite.writes());
        assert!(!TensorUse::Read.mutates());
    }

    #[test]
    fn test_footprint_helpers() {
        assert!(covers(&[0..8], &[1..3, 4..7]));
        assert!(!covers(&[0..4, 5..8], &[1..7]));
        assert_eq!(intersect(&[0..4, 8..12], &[2..10]), vec![2..4, 8..10]);
        assert!(!overlaps(&[0..4, 8..12], &[4..8, 12..16]));
        assert!(overlaps(&[0..4, 8..12], &[11..13]));
    }
}
