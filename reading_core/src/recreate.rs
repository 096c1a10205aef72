//! Progress-preserving schedule recreation.
//!
//! When a schedule is regenerated under new parameters, rows the user had
//! finished are projected onto the new rows by verse content: a finished
//! run's first start verse and last end verse are located among the new
//! rows, and every new row between the two hits is marked finished.

use crate::assembler::{generate_with_options, GenerationOptions, ScheduleRequest, VerseAdjustment};
use crate::catalog::Catalog;
use crate::locator::locate_with;
use crate::store::{ScheduleSource, ScheduleStore, StoredSchedule};
use crate::types::{FinishedPortionSpan, ReadingPortion, VerseRef};
use crate::{Error, Result};
use std::cmp::Ordering;

/// Default plausibility bound for projected spans
pub const DEFAULT_MAX_PROJECTION_RATIO: f64 = 2.0;

/// Maximal runs of consecutive finished rows
pub fn find_finished_portion_spans(finished: &[bool]) -> Vec<FinishedPortionSpan> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (index, &done) in finished.iter().enumerate() {
        match (done, open) {
            (true, None) => open = Some(index),
            (false, Some(start)) => {
                spans.push(FinishedPortionSpan {
                    start_index: start,
                    end_index: index - 1,
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        spans.push(FinishedPortionSpan {
            start_index: start,
            end_index: finished.len() - 1,
        });
    }
    spans
}

/// Row lookup by start and by end verse.
///
/// Rows of a wrapped schedule are not sorted by verse, so both columns are
/// kept as `(verse, row)` pairs sorted by verse.
pub struct Correspondence {
    by_start: Vec<(VerseRef, usize)>,
    by_end: Vec<(VerseRef, usize)>,
}

impl Correspondence {
    pub fn new(rows: &[ReadingPortion]) -> Self {
        let mut by_start: Vec<(VerseRef, usize)> =
            rows.iter().enumerate().map(|(i, r)| (r.start_ref(), i)).collect();
        let mut by_end: Vec<(VerseRef, usize)> =
            rows.iter().enumerate().map(|(i, r)| (r.end_ref(), i)).collect();
        by_start.sort();
        by_end.sort();
        Self { by_start, by_end }
    }

    /// Row whose start verse is the closest one at or after `reference`
    pub fn first_starting_at_or_after(&self, reference: VerseRef) -> Option<usize> {
        let i = locate_with(&self.by_start, |(r, _)| r.cmp(&reference));
        self.by_start.get(i).map(|(_, row)| *row)
    }

    /// Row whose end verse is the closest one at or before `reference`
    pub fn last_ending_at_or_before(&self, reference: VerseRef) -> Option<usize> {
        let i = locate_with(&self.by_end, |(r, _)| {
            if *r <= reference {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        });
        i.checked_sub(1).map(|i| self.by_end[i].1)
    }
}

/// Index of the row of `rows` whose start verse is the closest one at or
/// after `reference`
pub fn find_corresponding_index(rows: &[ReadingPortion], reference: VerseRef) -> Option<usize> {
    Correspondence::new(rows).first_starting_at_or_after(reference)
}

/// A finished span and the new rows it maps onto
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectedSpan {
    pub source: FinishedPortionSpan,
    pub start_row: usize,
    pub end_row: usize,
}

/// Which new rows to mark finished
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecreationPlan {
    pub projected: Vec<ProjectedSpan>,
    /// Spans whose projection was implausibly large
    pub rejected: Vec<FinishedPortionSpan>,
    /// Spans that cover no whole new row
    pub unmatched: Vec<FinishedPortionSpan>,
}

impl RecreationPlan {
    /// Inclusive new-row ranges to flag finished
    pub fn finished_ranges(&self) -> Vec<(usize, usize)> {
        self.projected
            .iter()
            .map(|p| (p.start_row, p.end_row))
            .collect()
    }

    pub fn apply(&self, finished: &mut [bool]) {
        for p in &self.projected {
            let end = p.end_row.min(finished.len().saturating_sub(1));
            for flag in finished.iter_mut().take(end + 1).skip(p.start_row) {
                *flag = true;
            }
        }
    }
}

/// Number of canonical verses a row covers, wrapping past the last verse
fn row_extent(catalog: &Catalog, row: &ReadingPortion) -> usize {
    let last = catalog.len().saturating_sub(1);
    let start = catalog.locate_nearest(row.start_ref()).min(last);
    let end = catalog.locate_nearest(row.end_ref()).min(last);
    if end >= start {
        end - start + 1
    } else {
        catalog.len() - start + end + 1
    }
}

/// Project finished spans of `old_rows` onto `new_rows`.
///
/// A projection is rejected when its verse extent exceeds
/// `max_projection_ratio` times the source span's extent plus the largest
/// single new row.
pub fn plan_recreation(
    catalog: &Catalog,
    old_rows: &[ReadingPortion],
    old_finished: &[bool],
    new_rows: &[ReadingPortion],
    max_projection_ratio: f64,
) -> RecreationPlan {
    let mut plan = RecreationPlan::default();
    if new_rows.is_empty() {
        plan.unmatched = find_finished_portion_spans(old_finished);
        return plan;
    }

    let correspondence = Correspondence::new(new_rows);
    let new_extents: Vec<usize> = new_rows.iter().map(|r| row_extent(catalog, r)).collect();
    let largest_row = new_extents.iter().copied().max().unwrap_or(0);

    for span in find_finished_portion_spans(old_finished) {
        let (Some(first), Some(last)) = (old_rows.get(span.start_index), old_rows.get(span.end_index))
        else {
            plan.unmatched.push(span);
            continue;
        };

        let start_row = correspondence.first_starting_at_or_after(first.start_ref());
        let end_row = correspondence.last_ending_at_or_before(last.end_ref());
        let (start_row, end_row) = match (start_row, end_row) {
            (Some(s), Some(e)) if s <= e => (s, e),
            _ => {
                plan.unmatched.push(span);
                continue;
            }
        };

        let source_extent: usize = old_rows[span.start_index..=span.end_index]
            .iter()
            .map(|r| row_extent(catalog, r))
            .sum();
        let projected_extent: usize = new_extents[start_row..=end_row].iter().sum();
        let bound = max_projection_ratio * source_extent as f64 + largest_row as f64;
        if projected_extent as f64 > bound {
            tracing::warn!(
                "Rejecting projection of rows {}..={} onto {}..={}: {} verses from a {}-verse span",
                span.start_index,
                span.end_index,
                start_row,
                end_row,
                projected_extent,
                source_extent
            );
            plan.rejected.push(span);
            continue;
        }

        plan.projected.push(ProjectedSpan {
            source: span,
            start_row,
            end_row,
        });
    }

    tracing::debug!(
        "Recreation plan: {} projected, {} rejected, {} unmatched",
        plan.projected.len(),
        plan.rejected.len(),
        plan.unmatched.len()
    );
    plan
}

/// `"<name> (Old)"`, or with a counter suffix when that is taken
pub fn archive_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let base = format!("{} (Old)", name);
    if !taken(&base) {
        return base;
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{} {}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Knobs for [`recreate_in_store`]
#[derive(Clone, Debug)]
pub struct RecreateOptions {
    pub generation: GenerationOptions,
    pub max_projection_ratio: f64,
}

impl Default for RecreateOptions {
    fn default() -> Self {
        Self {
            generation: GenerationOptions::default(),
            max_projection_ratio: DEFAULT_MAX_PROJECTION_RATIO,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecreationOutcome {
    pub archived_as: String,
    pub schedule: StoredSchedule,
    pub plan: RecreationPlan,
    pub adjustment: Option<VerseAdjustment>,
}

/// Regenerate the stored schedule `name` from `request`, carrying finished
/// rows over, archiving the old schedule and storing the new one under the
/// same name.
///
/// If the new schedule cannot be stored, the archived one is renamed back.
pub fn recreate_in_store<S: ScheduleStore>(
    store: &mut S,
    catalog: &Catalog,
    name: &str,
    request: ScheduleRequest,
    options: &RecreateOptions,
) -> Result<RecreationOutcome> {
    let old = store.load(name)?;
    if let ScheduleSource::Custom(_) = old.source {
        return Err(Error::InvalidRequest(format!(
            "'{}' is a custom schedule; only verse schedules can be recreated",
            name
        )));
    }

    let generated = generate_with_options(catalog, &request, &options.generation, None)?;
    let adjustment = generated.adjustment.clone();
    let plan = plan_recreation(
        catalog,
        &old.verse_portions(),
        &old.finished_flags(),
        &generated.portions,
        options.max_projection_ratio,
    );

    let mut schedule = StoredSchedule::from_generated(name, request, generated);
    let mut flags = vec![false; schedule.rows.len()];
    plan.apply(&mut flags);
    for (row, flag) in schedule.rows.iter_mut().zip(flags) {
        row.finished = flag;
    }

    let archived_as = store.archive(name)?;
    if let Err(e) = store.create(&schedule) {
        tracing::warn!(
            "Storing recreated '{}' failed, restoring it from '{}': {}",
            name,
            archived_as,
            e
        );
        if let Err(restore) = store.rename(&archived_as, name) {
            tracing::error!(
                "Could not restore '{}' from '{}': {}",
                name,
                archived_as,
                restore
            );
        }
        return Err(e);
    }

    tracing::info!(
        "Recreated '{}': {} of {} rows carried over as finished, old schedule kept as '{}'",
        name,
        schedule.finished_count(),
        schedule.rows.len(),
        archived_as
    );

    Ok(RecreationOutcome {
        archived_as,
        schedule,
        plan,
        adjustment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::generate_schedule;
    use crate::calendar::ActiveDays;
    use crate::store::JsonScheduleStore;
    use crate::types::ScheduleType;
    use chrono::NaiveDate;

    fn request(years: f64, start: VerseRef) -> ScheduleRequest {
        ScheduleRequest {
            schedule_type: ScheduleType::Sequential,
            years,
            start,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            active_days: ActiveDays::ALL,
        }
    }

    fn typed_rows(schedule_type: ScheduleType, years: f64, start: VerseRef) -> Vec<ReadingPortion> {
        let request = ScheduleRequest {
            schedule_type,
            ..request(years, start)
        };
        generate_schedule(Catalog::builtin(), &request).unwrap().portions
    }

    fn rows(years: f64, start: VerseRef) -> Vec<ReadingPortion> {
        generate_schedule(Catalog::builtin(), &request(years, start))
            .unwrap()
            .portions
    }

    fn flags(len: usize, ranges: &[(usize, usize)]) -> Vec<bool> {
        let mut out = vec![false; len];
        for &(a, b) in ranges {
            for f in &mut out[a..=b] {
                *f = true;
            }
        }
        out
    }

    #[test]
    fn test_find_finished_spans() {
        let spans = find_finished_portion_spans(&[true, true, false, false, true, false, true]);
        assert_eq!(
            spans,
            vec![
                FinishedPortionSpan { start_index: 0, end_index: 1 },
                FinishedPortionSpan { start_index: 4, end_index: 4 },
                FinishedPortionSpan { start_index: 6, end_index: 6 },
            ]
        );
        assert_eq!(spans[0].row_count(), 2);
        assert!(find_finished_portion_spans(&[false, false]).is_empty());
        assert!(find_finished_portion_spans(&[]).is_empty());
    }

    #[test]
    fn test_find_corresponding_index() {
        let new_rows = rows(1.0, VerseRef::new(40, 1, 1));
        // Exact start of the first row
        assert_eq!(find_corresponding_index(&new_rows, VerseRef::new(40, 1, 1)), Some(0));
        // Genesis 1:1 sits inside the wrapped "Revelation 22-Genesis 2" row,
        // so the closest start at or after it is the next row
        assert_eq!(find_corresponding_index(&new_rows, VerseRef::new(1, 1, 1)), Some(96));
        assert_eq!(find_corresponding_index(&new_rows, VerseRef::new(66, 22, 21)), None);
    }

    #[test]
    fn test_identical_parameters_round_trip() {
        let old = rows(1.0, VerseRef::new(1, 1, 1));
        let finished = flags(old.len(), &[(10, 19), (50, 52), (371, 371)]);
        let new = rows(1.0, VerseRef::new(1, 1, 1));

        let plan = plan_recreation(Catalog::builtin(), &old, &finished, &new, 2.0);
        assert!(plan.rejected.is_empty());
        assert!(plan.unmatched.is_empty());
        assert_eq!(plan.finished_ranges(), vec![(10, 19), (50, 52), (371, 371)]);

        let mut carried = vec![false; new.len()];
        plan.apply(&mut carried);
        assert_eq!(carried, finished);
    }

    #[test]
    fn test_identical_parameters_round_trip_for_unsorted_rows() {
        let cases = [
            (ScheduleType::Sequential, VerseRef::new(40, 1, 1)),
            (ScheduleType::Thematic, VerseRef::new(1, 1, 1)),
            (ScheduleType::Chronological, VerseRef::new(1, 1, 1)),
        ];
        for (schedule_type, start) in cases {
            let old = typed_rows(schedule_type, 1.0, start);
            let len = old.len();
            // Row 95 of the Matthew plan is the one that wraps past Revelation
            let finished = flags(len, &[(0, 5), (90, 100), (len - 3, len - 1)]);
            let new = typed_rows(schedule_type, 1.0, start);

            let plan = plan_recreation(
                Catalog::builtin(),
                &old,
                &finished,
                &new,
                DEFAULT_MAX_PROJECTION_RATIO,
            );
            assert!(plan.rejected.is_empty(), "{}", schedule_type);
            assert!(plan.unmatched.is_empty(), "{}", schedule_type);

            let mut carried = vec![false; new.len()];
            plan.apply(&mut carried);
            assert_eq!(carried, finished, "{}", schedule_type);
            assert_eq!(carried.iter().filter(|&&f| f).count(), 20);
        }
    }

    #[test]
    fn test_projection_onto_shorter_schedule() {
        let old = rows(1.0, VerseRef::new(1, 1, 1));
        let new = rows(0.1, VerseRef::new(1, 1, 1));
        let old_end = old[19].end_ref();

        let plan = plan_recreation(
            Catalog::builtin(),
            &old,
            &flags(old.len(), &[(0, 19)]),
            &new,
            2.0,
        );
        assert_eq!(plan.projected.len(), 1);
        let projected = &plan.projected[0];
        assert_eq!(projected.start_row, 0);
        // Every carried row was entirely read in the old schedule
        for row in &new[projected.start_row..=projected.end_row] {
            assert!(row.end_ref() <= old_end);
        }
        assert!(new[projected.end_row + 1].end_ref() > old_end);
    }

    #[test]
    fn test_span_inside_one_new_row_is_unmatched() {
        let old = rows(1.0, VerseRef::new(1, 1, 1));
        let new = rows(0.1, VerseRef::new(1, 1, 1));
        // Old row 2 lies strictly inside new row 0 ("Genesis 1-29")
        let plan = plan_recreation(
            Catalog::builtin(),
            &old,
            &flags(old.len(), &[(2, 2)]),
            &new,
            2.0,
        );
        assert!(plan.projected.is_empty());
        assert_eq!(plan.unmatched.len(), 1);
    }

    #[test]
    fn test_implausible_projection_rejected() {
        let catalog = Catalog::builtin();
        let new = rows(0.1, VerseRef::new(1, 1, 1));

        // Two tiny rows at both ends of the Bible flagged as one finished run
        let mut first = new[0].clone();
        first.end_chapter = 1;
        first.end_verse = 5;
        let mut last = new[37].clone();
        last.start_chapter = 22;
        last.start_verse = 20;
        let old = vec![first, last];

        let plan = plan_recreation(catalog, &old, &[true, true], &new, 2.0);
        assert!(plan.projected.is_empty());
        assert_eq!(plan.rejected.len(), 1);
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name("Plan", |_| false), "Plan (Old)");
        assert_eq!(
            archive_name("Plan", |n| n == "Plan (Old)" || n == "Plan (Old) 2"),
            "Plan (Old) 3"
        );
    }

    #[test]
    fn test_recreate_in_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonScheduleStore::new(temp_dir.path());
        let catalog = Catalog::builtin();

        let original = request(1.0, VerseRef::new(1, 1, 1));
        let generated = generate_schedule(catalog, &original).unwrap();
        store
            .create(&StoredSchedule::from_generated("Plan", original.clone(), generated))
            .unwrap();
        store.set_finished("Plan", 0, 29, true).unwrap();

        let outcome = recreate_in_store(
            &mut store,
            catalog,
            "Plan",
            original,
            &RecreateOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.archived_as, "Plan (Old)");
        assert_eq!(outcome.schedule.finished_count(), 30);
        assert_eq!(store.load("Plan").unwrap().finished_count(), 30);
        assert_eq!(store.load("Plan (Old)").unwrap().finished_count(), 30);
    }

    /// Store whose `create` always fails
    struct FailingCreateStore(JsonScheduleStore);

    impl ScheduleStore for FailingCreateStore {
        fn create(&mut self, _schedule: &StoredSchedule) -> Result<()> {
            Err(Error::Other("disk full".to_string()))
        }
        fn load(&self, name: &str) -> Result<StoredSchedule> {
            self.0.load(name)
        }
        fn list(&self) -> Result<Vec<crate::store::ScheduleSummary>> {
            self.0.list()
        }
        fn exists(&self, name: &str) -> Result<bool> {
            self.0.exists(name)
        }
        fn set_finished(
            &mut self,
            name: &str,
            from: usize,
            to: usize,
            finished: bool,
        ) -> Result<usize> {
            self.0.set_finished(name, from, to, finished)
        }
        fn archive(&mut self, name: &str) -> Result<String> {
            self.0.archive(name)
        }
        fn rename(&mut self, from: &str, to: &str) -> Result<()> {
            self.0.rename(from, to)
        }
    }

    #[test]
    fn test_failed_store_keeps_original_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut inner = JsonScheduleStore::new(temp_dir.path());
        let catalog = Catalog::builtin();

        let original = request(0.1, VerseRef::new(1, 1, 1));
        let generated = generate_schedule(catalog, &original).unwrap();
        let stored = StoredSchedule::from_generated("Plan", original, generated);
        inner.create(&stored).unwrap();
        inner.set_finished("Plan", 0, 4, true).unwrap();

        let mut store = FailingCreateStore(inner);
        let result = recreate_in_store(
            &mut store,
            catalog,
            "Plan",
            request(1.0, VerseRef::new(1, 1, 1)),
            &RecreateOptions::default(),
        );
        assert!(matches!(result, Err(Error::Other(_))));

        let restored = store.load("Plan").unwrap();
        assert_eq!(restored.id, stored.id);
        assert_eq!(restored.name, "Plan");
        assert_eq!(restored.finished_count(), 5);
        assert!(!store.exists("Plan (Old)").unwrap());
    }

    #[test]
    fn test_recreate_missing_schedule() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonScheduleStore::new(temp_dir.path());
        let result = recreate_in_store(
            &mut store,
            Catalog::builtin(),
            "nope",
            request(1.0, VerseRef::new(1, 1, 1)),
            &RecreateOptions::default(),
        );
        assert!(matches!(result, Err(Error::ScheduleNotFound(_))));
    }
}
