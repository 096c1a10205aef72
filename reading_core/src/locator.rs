//! Binary locator over ordered rows.
//!
//! Every search in the crate (verse lookup, chapter summaries, recreation
//! correspondence) goes through [`locate_with`]. The search is bounded by
//! [`MAX_ITERATIONS`] so corrupted, unsorted input ends the search instead
//! of spinning.

use std::cmp::Ordering;

/// Hard cap on bisection steps.
pub const MAX_ITERATIONS: usize = 2000;

/// Returns the index of the first row that does not compare `Less` than the
/// target, i.e. the nearest row at or after it. Returns `rows.len()` when
/// every row is before the target.
///
/// `compare` reports how a row orders relative to the target.
pub fn locate_with<T, F>(rows: &[T], mut compare: F) -> usize
where
    F: FnMut(&T) -> Ordering,
{
    let mut low = 0usize;
    let mut high = rows.len();
    let mut previous_mid = None;

    for _ in 0..MAX_ITERATIONS {
        if low >= high {
            return low;
        }

        let mut mid = low + (high - low) / 2;
        if previous_mid == Some(mid) {
            mid = (mid + 1).min(high - 1);
        }
        previous_mid = Some(mid);

        match compare(&rows[mid]) {
            Ordering::Less => low = mid + 1,
            Ordering::Equal | Ordering::Greater => high = mid,
        }
    }

    tracing::warn!(
        "Binary locator hit its {} iteration cap over {} rows; returning {}",
        MAX_ITERATIONS,
        rows.len(),
        low
    );
    low
}

/// Like [`locate_with`], but only returns an index whose row compares `Equal`.
pub fn locate_exact<T, F>(rows: &[T], mut compare: F) -> Option<usize>
where
    F: FnMut(&T) -> Ordering,
{
    let index = locate_with(rows, &mut compare);
    match rows.get(index) {
        Some(row) if compare(row) == Ordering::Equal => Some(index),
        _ => None,
    }
}
