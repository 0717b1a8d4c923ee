//! Overlap resolution shared by every detector and by the pipeline.
//!
//! The policy is a greedy sweep: sort by `(start ascending, length
//! descending)` and keep a span iff it starts at or after the end of the last
//! kept span. Among spans that start at the same offset the longest wins; ties
//! on both keys keep input order (the sort is stable).
//!
//! This is interval scheduling by earliest start, not maximum coverage. A
//! short early span can block two longer later spans that a coverage-optimal
//! scheduler would have kept.

use masque_core::Span;

/// Remove overlapping spans, preferring the earliest and then the longest.
///
/// The output is sorted by `start`, pairwise non-overlapping, and every
/// element comes from the input.
#[must_use]
pub fn resolve_overlaps(mut spans: Vec<Span>) -> Vec<Span> {
    if spans.len() < 2 {
        return spans;
    }

    spans.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.len().cmp(&a.len())));

    let mut kept = Vec::with_capacity(spans.len());
    let mut last_end = 0;
    for span in spans {
        if span.start >= last_end {
            last_end = span.end;
            kept.push(span);
        }
    }
    kept
}
