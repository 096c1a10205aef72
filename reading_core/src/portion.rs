//! Reading-portion formatting.
//!
//! Turns an index span of one ordering into persisted rows: a description
//! such as "Genesis 1-29" or "Psalms 119:1-88" and a chapter-relative
//! position. Permuted orderings may split one day into several rows.

use crate::catalog::{Catalog, OrderingKind, OrderingView};
use crate::params::PartitionParams;
use crate::types::{PartitionKey, ReadingPortion, VersePosition, VerseRef};
use chrono::NaiveDate;

/// Position of the span `[start_index, end_index]` of `view`
pub fn classify_start_end(
    view: &OrderingView<'_>,
    start_index: usize,
    end_index: usize,
) -> VersePosition {
    let catalog = view.catalog();
    VersePosition::from_flags(
        catalog.is_chapter_start(view.get(start_index)),
        catalog.is_chapter_end(view.get(end_index)),
    )
}

/// Shortest unambiguous description of a verse span.
///
/// Whole chapters are written without verse numbers; anything else spells
/// out both verses.
pub fn describe(
    catalog: &Catalog,
    start: VerseRef,
    end: VerseRef,
    position: VersePosition,
) -> String {
    let start_book = catalog.book_name(start.book);
    let whole = position == VersePosition::StartAndEnd;

    if start.book == end.book && start.chapter == end.chapter {
        if start.verse == end.verse {
            format!("{} {}:{}", start_book, start.chapter, start.verse)
        } else if whole {
            format!("{} {}", start_book, start.chapter)
        } else {
            format!(
                "{} {}:{}-{}",
                start_book, start.chapter, start.verse, end.verse
            )
        }
    } else if start.book == end.book {
        if whole {
            format!("{} {}-{}", start_book, start.chapter, end.chapter)
        } else {
            format!(
                "{} {}:{}-{}:{}",
                start_book, start.chapter, start.verse, end.chapter, end.verse
            )
        }
    } else {
        let end_book = catalog.book_name(end.book);
        if whole {
            format!("{} {}-{} {}", start_book, start.chapter, end_book, end.chapter)
        } else {
            format!(
                "{} {}:{}-{} {}:{}",
                start_book, start.chapter, start.verse, end_book, end.chapter, end.verse
            )
        }
    }
}

/// One persisted row for the span `[start_index, end_index]` of `view`
pub fn portion_between(
    view: &OrderingView<'_>,
    start_index: usize,
    end_index: usize,
    date: NaiveDate,
    key: PartitionKey,
) -> ReadingPortion {
    let catalog = view.catalog();
    let start = view.get(start_index);
    let end = view.get(end_index);
    let position = classify_start_end(view, start_index, end_index);
    let description = describe(catalog, start.reference(), end.reference(), position);
    ReadingPortion {
        start_book: catalog.book_name(start.book).to_string(),
        start_book_number: start.book,
        start_chapter: start.chapter,
        start_verse: start.verse,
        end_book: catalog.book_name(end.book).to_string(),
        end_book_number: end.book,
        end_chapter: end.chapter,
        end_verse: end.verse,
        date,
        description,
        position,
        key,
    }
}

/// A run of consecutive canonical indices, tagged with where its first
/// verse sits in the ordering being walked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Run {
    first: usize,
    last: usize,
    rank: usize,
}

fn collect_runs(view: &OrderingView<'_>, from: usize, to: usize, runs: &mut Vec<Run>) {
    for index in from..=to {
        let seq = view.sequential_index(index);
        match runs.last_mut() {
            Some(run) if run.last + 1 == seq => run.last = seq,
            _ => runs.push(Run {
                first: seq,
                last: seq,
                rank: index,
            }),
        }
    }
}

/// Group chronological runs by the book they open in. Groups keep the order
/// in which they first appear; runs inside a group read in canonical order.
fn cluster_by_book(catalog: &Catalog, mut runs: Vec<Run>) -> Vec<Run> {
    runs.sort_by_key(|r| r.rank);
    let mut clusters: Vec<(u8, Vec<Run>)> = Vec::new();
    for run in runs {
        let book = catalog.verses()[run.first].book;
        match clusters.iter_mut().find(|(b, _)| *b == book) {
            Some((_, members)) => members.push(run),
            None => clusters.push((book, vec![run])),
        }
    }
    clusters
        .into_iter()
        .flat_map(|(_, mut members)| {
            members.sort_by_key(|r| r.first);
            members
        })
        .collect()
}

/// Rows for one partition's day `[start_index, end_index]`.
///
/// Sequential spans always produce exactly one row. Permuted spans are
/// broken into runs of consecutive verses (a span that wraps past the
/// partition end is read as two ranges), reordered, merged where runs
/// touch, and emitted one row per run.
pub fn create_reading_portions(
    view: &OrderingView<'_>,
    partition: &PartitionParams,
    start_index: usize,
    end_index: usize,
    date: NaiveDate,
    key: PartitionKey,
) -> Vec<ReadingPortion> {
    let catalog = view.catalog();

    if view.kind() == OrderingKind::Sequential {
        return vec![portion_between(view, start_index, end_index, date, key)];
    }

    let mut runs = Vec::new();
    if end_index >= start_index {
        collect_runs(view, start_index, end_index, &mut runs);
    } else {
        collect_runs(view, start_index, partition.max_index, &mut runs);
        collect_runs(view, partition.least_index, end_index, &mut runs);
    }

    let ordered = match view.kind() {
        OrderingKind::Chronological => cluster_by_book(catalog, runs),
        _ => {
            runs.sort_by_key(|r| r.first);
            runs
        }
    };

    let mut merged: Vec<Run> = Vec::with_capacity(ordered.len());
    for run in ordered {
        match merged.last_mut() {
            Some(prev) if prev.last + 1 == run.first => prev.last = run.last,
            _ => merged.push(run),
        }
    }

    if merged.len() > 1 {
        tracing::debug!(
            "Span {}..={} of partition {} splits into {} rows",
            start_index,
            end_index,
            key,
            merged.len()
        );
    }

    let canonical = catalog.sequential();
    merged
        .iter()
        .map(|run| portion_between(&canonical, run.first, run.last, date, key))
        .collect()
}
