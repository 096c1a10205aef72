//! Day-boundary resolution.
//!
//! Decides where one partition's reading for a day ends: wraps past the
//! partition's last index, detects completion, and nudges the end onto a
//! nearby chapter break.

use crate::catalog::{OrderingKind, OrderingView};
use crate::params::PartitionParams;
use crate::tracker::TrackerState;

/// Outcome of resolving one day's end
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DayBoundary {
    pub day_end_index: i64,
    pub is_end: bool,
    pub has_looped: bool,
    pub verse_overflow: f64,
}

/// Wrap and completion check.
///
/// A first crossing of `max_index` wraps the end back to the start of the
/// partition. Once wrapped, landing within `buffer` of `end_index` finishes
/// the partition. The result is always inside `[least_index, max_index]`.
pub fn check_end(
    day_end_index: i64,
    partition: &PartitionParams,
    end_index: i64,
    verse_overflow: f64,
    has_looped: bool,
) -> DayBoundary {
    let least = partition.least_index as i64;
    let max = partition.max_index as i64;
    let mut day_end = day_end_index;
    let mut looped = has_looped;
    let mut is_end = false;

    if !looped && day_end >= max {
        day_end = day_end - max - 1 + least;
        looped = true;
    }
    if looped && day_end >= end_index - partition.buffer {
        day_end = if end_index >= least { end_index } else { max };
        is_end = true;
    }
    if day_end < least || day_end > max {
        day_end = max;
    }

    DayBoundary {
        day_end_index: day_end,
        is_end,
        has_looped: looped,
        verse_overflow: if is_end { 0.0 } else { verse_overflow },
    }
}

/// Resolve the end of today's reading for one partition.
///
/// `tentative` is the rounded budget end and `overflow` the rounding
/// remainder. Smoothing adjustments move from the overflow into the end
/// index so the next day absorbs the difference.
pub fn resolve_day_end(
    view: &OrderingView<'_>,
    partition: &PartitionParams,
    state: &TrackerState,
    tentative: i64,
    overflow: f64,
) -> DayBoundary {
    let first = check_end(
        tentative,
        partition,
        state.end_index,
        overflow,
        state.has_looped,
    );
    if first.is_end {
        return first;
    }
    // Landing exactly on max wraps to max itself; the second lap starts
    // tomorrow and must not be mistaken for the end of it.
    let freshly_looped = first.has_looped && !state.has_looped;
    if freshly_looped && first.day_end_index == partition.max_index as i64 {
        return first;
    }

    let adjustment = match view.kind() {
        OrderingKind::Sequential => {
            sequential_adjustment(view, state.pointer, first.day_end_index, partition.buffer)
        }
        OrderingKind::Chronological | OrderingKind::Thematic => {
            scan_adjustment(view, partition, state.pointer, first.day_end_index)
        }
    };

    check_end(
        first.day_end_index + adjustment,
        partition,
        state.end_index,
        first.verse_overflow - adjustment as f64,
        first.has_looped,
    )
}

/// Chapter snap in canonical order, computed from the chapter's index range.
///
/// Snaps back to the previous chapter's end when the day only just entered
/// a chapter, or forward to this chapter's end when it nearly finished it.
/// A backward snap never lands before the day's own start.
fn sequential_adjustment(
    view: &OrderingView<'_>,
    day_start: i64,
    day_end: i64,
    buffer: i64,
) -> i64 {
    if buffer <= 0 {
        return 0;
    }
    let (first, last) = view.catalog().chapter_bounds(day_end as usize);
    let (first, last) = (first as i64, last as i64);
    if day_end == last {
        return 0;
    }

    let into_chapter = day_end - first + 1;
    let wrapped = day_end < day_start;
    if into_chapter < buffer && (wrapped || first - 1 >= day_start) {
        first - 1 - day_end
    } else if last - day_end < buffer {
        last - day_end
    } else {
        0
    }
}

/// Chapter snap for permuted orderings: scan outward up to `buffer`
/// positions for a change of chapter and take the closer hit, preferring
/// the backward one on a tie.
///
/// A backward hit that would fall before the day's start means today began
/// inside the chapter it is now reading, so it is dropped. If that chapter
/// also ends within the window, the whole chapter fits in the buffer and is
/// taken as already consumed: the end stays where it is.
fn scan_adjustment(
    view: &OrderingView<'_>,
    partition: &PartitionParams,
    day_start: i64,
    day_end: i64,
) -> i64 {
    let buffer = partition.buffer;
    if buffer <= 0 {
        return 0;
    }
    let least = partition.least_index as i64;
    let max = partition.max_index as i64;
    let breaks_after = |i: i64| -> bool {
        !view
            .get(i as usize)
            .same_chapter(view.get((i + 1) as usize))
    };

    let mut forward = None;
    for k in 0..buffer {
        let i = day_end + k;
        if i > max {
            break;
        }
        if i == max || breaks_after(i) {
            forward = Some(k);
            break;
        }
    }

    let wrapped = day_end < day_start;
    let mut backward = None;
    for k in 1..=buffer {
        let i = day_end - k;
        if i < least - 1 {
            break;
        }
        if i == least - 1 || breaks_after(i) {
            if !wrapped && i < day_start {
                if matches!(forward, Some(f) if f + k <= buffer) {
                    return 0;
                }
            } else {
                backward = Some(k);
            }
            break;
        }
    }

    match (forward, backward) {
        (None, None) => 0,
        (Some(f), None) => f,
        (None, Some(b)) => -b,
        (Some(f), Some(b)) => {
            if f < b {
                f
            } else {
                -b
            }
        }
    }
}
