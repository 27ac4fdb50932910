//! Per-consultant interval index. Each consultant owns one
//! [`ConsultantState`]: the entity records plus a sorted interval partition
//! supporting overlap queries in O(log n + k). Partitions are fully
//! independent, so different consultants never contend on a lock.

use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone)]
pub struct ConsultantState {
    pub id: Ulid,
    /// Availability windows owned by this consultant.
    pub windows: HashMap<Ulid, AvailabilityWindow>,
    /// Assignments where this consultant is the subject.
    pub assignments: HashMap<Ulid, Assignment>,
    /// Derived intervals (window occurrences + active bookings),
    /// sorted by `span.start`.
    entries: Vec<IndexEntry>,
}

impl ConsultantState {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            windows: HashMap::new(),
            assignments: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Insert one entry, maintaining sort order by `span.start`.
    pub fn insert_entry(&mut self, entry: IndexEntry) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    /// Remove every entry derived from `ref_id`. Returns how many were removed.
    pub fn remove_ref(&mut self, ref_id: Ulid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.ref_id != ref_id);
        before - self.entries.len()
    }

    /// Atomically replace all entries of one source entity — cheaper than
    /// incremental updates when a recurring window's occurrences change.
    pub fn rebuild_ref(&mut self, ref_id: Ulid, entries: Vec<IndexEntry>) {
        self.remove_ref(ref_id);
        for e in entries {
            debug_assert_eq!(e.ref_id, ref_id);
            self.insert_entry(e);
        }
    }

    /// Entries whose span overlaps `query` (half-open semantics). Binary
    /// search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &IndexEntry> {
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }

    /// True when a single `available` occurrence fully contains `span`.
    /// Abutting occurrences never combine to authorize a booking.
    pub fn covered_by_one(&self, span: &Span, exclude: Option<Ulid>) -> bool {
        self.overlapping(span)
            .filter(|e| Some(e.ref_id) != exclude)
            .any(|e| {
                e.kind == EntryKind::Availability(AvailabilityType::Available)
                    && e.span.contains_span(span)
            })
    }

    /// Merged `available` spans overlapping `query`, clamped to it.
    /// Entries derived from `exclude` are ignored (self-exclusion on
    /// updates and hypothetical-removal checks on deletes).
    pub fn available_spans(&self, query: &Span, exclude: Option<Ulid>) -> Vec<Span> {
        let mut spans: Vec<Span> = self
            .overlapping(query)
            .filter(|e| Some(e.ref_id) != exclude)
            .filter(|e| e.kind == EntryKind::Availability(AvailabilityType::Available))
            .filter_map(|e| e.span.clamp_to(query))
            .collect();
        spans.sort_by_key(|s| s.start);
        merge_overlapping(&spans)
    }
}

// ── Span algebra ─────────────────────────────────────────────────

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Subtract `to_remove` (sorted) from `base` (sorted, disjoint).
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avail(start: Ms, end: Ms) -> IndexEntry {
        IndexEntry {
            ref_id: Ulid::new(),
            span: Span::new(start, end),
            kind: EntryKind::Availability(AvailabilityType::Available),
        }
    }

    fn booking(start: Ms, end: Ms) -> IndexEntry {
        IndexEntry {
            ref_id: Ulid::new(),
            span: Span::new(start, end),
            kind: EntryKind::Booking(AssignmentStatus::Confirmed),
        }
    }

    #[test]
    fn entries_stay_sorted() {
        let mut cs = ConsultantState::new(Ulid::new());
        cs.insert_entry(avail(300, 400));
        cs.insert_entry(avail(100, 200));
        cs.insert_entry(booking(200, 300));
        let starts: Vec<Ms> = cs.overlapping(&Span::new(0, 1000)).map(|e| e.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlap_query_is_half_open() {
        let mut cs = ConsultantState::new(Ulid::new());
        cs.insert_entry(avail(100, 200));
        // Adjacent query window — no overlap.
        assert_eq!(cs.overlapping(&Span::new(200, 300)).count(), 0);
        // One-ms overlap counts.
        assert_eq!(cs.overlapping(&Span::new(199, 300)).count(), 1);
    }

    #[test]
    fn remove_ref_drops_all_occurrences() {
        let mut cs = ConsultantState::new(Ulid::new());
        let rid = Ulid::new();
        for i in 0..4 {
            cs.insert_entry(IndexEntry {
                ref_id: rid,
                span: Span::new(i * 100, i * 100 + 50),
                kind: EntryKind::Availability(AvailabilityType::Available),
            });
        }
        cs.insert_entry(booking(1000, 1100));
        assert_eq!(cs.remove_ref(rid), 4);
        assert_eq!(cs.entry_count(), 1);
    }

    #[test]
    fn rebuild_ref_replaces_atomically() {
        let mut cs = ConsultantState::new(Ulid::new());
        let rid = Ulid::new();
        cs.insert_entry(IndexEntry {
            ref_id: rid,
            span: Span::new(0, 100),
            kind: EntryKind::Availability(AvailabilityType::Available),
        });
        cs.rebuild_ref(
            rid,
            vec![
                IndexEntry {
                    ref_id: rid,
                    span: Span::new(500, 600),
                    kind: EntryKind::Availability(AvailabilityType::Available),
                },
                IndexEntry {
                    ref_id: rid,
                    span: Span::new(200, 300),
                    kind: EntryKind::Availability(AvailabilityType::Available),
                },
            ],
        );
        let starts: Vec<Ms> = cs.overlapping(&Span::new(0, 1000)).map(|e| e.span.start).collect();
        assert_eq!(starts, vec![200, 500]);
    }

    #[test]
    fn available_spans_merges_and_clamps() {
        let mut cs = ConsultantState::new(Ulid::new());
        cs.insert_entry(avail(100, 300));
        cs.insert_entry(avail(250, 400));
        cs.insert_entry(booking(100, 200)); // not availability — ignored
        let spans = cs.available_spans(&Span::new(150, 1000), None);
        assert_eq!(spans, vec![Span::new(150, 400)]);
    }

    #[test]
    fn covered_by_one_needs_a_single_containing_occurrence() {
        let mut cs = ConsultantState::new(Ulid::new());
        let first = avail(100, 200);
        let first_id = first.ref_id;
        cs.insert_entry(first);
        cs.insert_entry(avail(200, 300));

        assert!(cs.covered_by_one(&Span::new(120, 180), None));
        assert!(cs.covered_by_one(&Span::new(200, 300), None));
        // Spanning the shared boundary is not contained in either.
        assert!(!cs.covered_by_one(&Span::new(150, 250), None));
        // Excluding the containing occurrence removes the cover.
        assert!(!cs.covered_by_one(&Span::new(120, 180), Some(first_id)));
    }

    #[test]
    fn available_spans_excludes_ref() {
        let mut cs = ConsultantState::new(Ulid::new());
        let keep = avail(100, 200);
        let dropped = avail(300, 400);
        let excluded = dropped.ref_id;
        cs.insert_entry(keep);
        cs.insert_entry(dropped);
        let spans = cs.available_spans(&Span::new(0, 1000), Some(excluded));
        assert_eq!(spans, vec![Span::new(100, 200)]);
    }

    // ── span algebra ─────────────────────────────────────

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![Span::new(100, 300), Span::new(200, 400), Span::new(500, 600)];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(100, 400), Span::new(500, 600)]
        );
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300)];
        assert_eq!(merge_overlapping(&spans), vec![Span::new(100, 300)]);
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![Span::new(100, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn subtract_full_cover() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 250)];
        assert!(subtract_intervals(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        assert_eq!(subtract_intervals(&base, &remove), base);
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![Span::new(0, 1000)];
        let remove = vec![Span::new(100, 200), Span::new(400, 500), Span::new(800, 900)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 800),
                Span::new(900, 1000),
            ]
        );
    }
}
