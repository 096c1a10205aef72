//! Schedule assembly.
//!
//! Drives parameter calculation, tracker setup and the per-day boundary and
//! formatting steps into a complete list of reading portions.

use crate::boundary;
use crate::calendar::ActiveDays;
use crate::catalog::Catalog;
use crate::params::{self, ScheduleParameters};
use crate::portion;
use crate::tracker;
use crate::types::{ReadingPortion, ScheduleType, VerseRef};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Days between cancellation checks when no interval is configured
pub const DEFAULT_CANCEL_CHECK_INTERVAL: usize = 64;

/// What the user asked for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub schedule_type: ScheduleType,
    pub years: f64,
    pub start: VerseRef,
    /// First calendar day of the schedule; callers pass "today" explicitly
    pub start_date: NaiveDate,
    #[serde(default)]
    pub active_days: ActiveDays,
}

/// Notice that the requested start verse was replaced by another one
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerseAdjustment {
    pub requested: VerseRef,
    pub resolved: VerseRef,
    pub message: String,
}

/// Generation tuning
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    pub cancel_check_interval: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
        }
    }
}

/// Result of one generation run
#[derive(Clone, Debug)]
pub struct GeneratedSchedule {
    pub portions: Vec<ReadingPortion>,
    pub adjustment: Option<VerseAdjustment>,
    pub parameters: ScheduleParameters,
    /// Set when the day ceiling stopped generation before every partition finished
    pub truncated: bool,
}

/// Move an invalid reference one step toward a valid one.
fn roll_forward(catalog: &Catalog, r: VerseRef) -> VerseRef {
    let book_count = catalog.book_count();
    if r.book == 0 || r.book > book_count {
        return VerseRef::new(1, 1, 1);
    }
    let max_chapter = catalog.max_chapter(r.book);
    if r.chapter == 0 || r.chapter > max_chapter {
        return VerseRef::new(r.book, 1, 1);
    }
    if r.verse > catalog.max_verse(r.book, r.chapter) {
        if r.chapter < max_chapter {
            return VerseRef::new(r.book, r.chapter + 1, 1);
        }
        let next_book = if r.book >= book_count { 1 } else { r.book + 1 };
        return VerseRef::new(next_book, 1, 1);
    }
    if r.verse == 0 {
        return VerseRef::new(r.book, r.chapter, 1);
    }
    r
}

/// Resolve a requested start verse to a canonical index.
///
/// An exact match wins. Otherwise the reference is rolled forward once
/// (next chapter, next book, book 66 wrapping to book 1) and retried; if
/// that still misses, the nearest verse at or after it is used.
pub fn resolve_start_verse(
    catalog: &Catalog,
    requested: VerseRef,
) -> Result<(usize, Option<VerseAdjustment>)> {
    if catalog.is_empty() {
        return Err(Error::InvalidRequest("catalog is empty".to_string()));
    }

    let mut candidate = requested;
    let mut retried = false;
    let index = loop {
        if let Some(index) = catalog.find_index(candidate) {
            break index;
        }
        if retried {
            let nearest = catalog.locate_nearest(candidate);
            break if nearest >= catalog.len() { 0 } else { nearest };
        }
        candidate = roll_forward(catalog, candidate);
        retried = true;
    };

    let resolved = catalog.verses()[index].reference();
    let adjustment = (resolved != requested).then(|| {
        let message = format!(
            "{} {}:{} does not exist; starting at {} instead",
            catalog.book_name(requested.book),
            requested.chapter,
            requested.verse,
            catalog.format_reference(resolved)
        );
        tracing::warn!("{}", message);
        VerseAdjustment {
            requested,
            resolved,
            message,
        }
    });

    Ok((index, adjustment))
}

/// Generate a complete verse schedule.
pub fn generate_schedule(catalog: &Catalog, request: &ScheduleRequest) -> Result<GeneratedSchedule> {
    generate_with_options(catalog, request, &GenerationOptions::default(), None)
}

/// Generate a schedule, checking `cancel` every
/// [`DEFAULT_CANCEL_CHECK_INTERVAL`] virtual days.
pub fn generate_schedule_cancellable(
    catalog: &Catalog,
    request: &ScheduleRequest,
    cancel: &AtomicBool,
) -> Result<GeneratedSchedule> {
    generate_with_options(catalog, request, &GenerationOptions::default(), Some(cancel))
}

/// Generate a schedule with explicit options and an optional cancellation flag.
pub fn generate_with_options(
    catalog: &Catalog,
    request: &ScheduleRequest,
    options: &GenerationOptions,
    cancel: Option<&AtomicBool>,
) -> Result<GeneratedSchedule> {
    let parameters = params::calculate(catalog, request.schedule_type, request.years)?;
    let view = catalog.ordering(parameters.ordering)?;
    let mut date = request.active_days.require_first(request.start_date)?;

    let (start_sequential, adjustment) = resolve_start_verse(catalog, request.start)?;
    let start_index = view.position_of(start_sequential);
    let mut trackers = tracker::initialize(&view, &parameters, start_index)?;
    let keys = trackers.key_order().to_vec();

    let ceiling = parameters.day_ceiling();
    let interval = options.cancel_check_interval.max(1);
    let mut portions = Vec::new();
    let mut end_counter = 0usize;
    let mut finished = false;

    tracing::info!(
        "Generating {} schedule over {} years from {} ({} partition(s), ceiling {} days)",
        request.schedule_type,
        request.years,
        catalog.format_reference(catalog.verses()[start_sequential].reference()),
        keys.len(),
        ceiling
    );

    for day in 0..ceiling {
        if let Some(flag) = cancel {
            if day % interval == 0 && flag.load(Ordering::Relaxed) {
                tracing::info!("Generation cancelled after {} virtual days", day);
                return Err(Error::Cancelled);
            }
        }

        for &key in &keys {
            let partition = parameters
                .partition(key)
                .ok_or_else(|| Error::Other(format!("no parameters for partition {}", key)))?;
            let state = trackers
                .get_mut(key)
                .ok_or_else(|| Error::Other(format!("no tracker for partition {}", key)))?;
            if state.is_end {
                continue;
            }

            let target = state.pointer as f64 + partition.verses_per_day + state.verse_overflow - 1.0;
            let mut tentative = target.round();
            let mut overflow = target - tentative;
            // A day always reads at least the verse under the pointer
            if tentative < state.pointer as f64 {
                tentative = state.pointer as f64;
                overflow = 0.0;
            }
            let resolved =
                boundary::resolve_day_end(&view, partition, state, tentative as i64, overflow);

            portions.extend(portion::create_reading_portions(
                &view,
                partition,
                state.pointer as usize,
                resolved.day_end_index as usize,
                date,
                key,
            ));
            state.advance(&resolved, partition);

            date = request
                .active_days
                .next_after(date)
                .ok_or_else(|| Error::Other(format!("date overflow after {}", date)))?;
            if resolved.is_end {
                end_counter += 1;
                tracing::debug!("Partition {} finished on virtual day {}", key, day);
            }
        }

        if end_counter == keys.len() {
            finished = true;
            break;
        }
    }

    if !finished {
        tracing::warn!(
            "Stopped after the {}-day ceiling with {} of {} partition(s) finished",
            ceiling,
            end_counter,
            keys.len()
        );
    }

    tracing::info!("Generated {} reading portions", portions.len());

    Ok(GeneratedSchedule {
        portions,
        adjustment,
        parameters,
        truncated: !finished,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::mini_catalog;
    use crate::catalog::CatalogBuilder;
    use crate::types::PartitionKey;

    fn request(schedule_type: ScheduleType, years: f64, start: VerseRef) -> ScheduleRequest {
        ScheduleRequest {
            schedule_type,
            years,
            start,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            active_days: ActiveDays::ALL,
        }
    }

    /// How many times each sequential index is read; a row that runs past
    /// the last verse continues from the first.
    fn coverage(catalog: &Catalog, schedule: &GeneratedSchedule) -> Vec<u32> {
        let mut seen = vec![0u32; catalog.len()];
        for p in &schedule.portions {
            let from = catalog.find_index(p.start_ref()).unwrap();
            let to = catalog.find_index(p.end_ref()).unwrap();
            if from <= to {
                seen[from..=to].iter_mut().for_each(|n| *n += 1);
            } else {
                seen[from..].iter_mut().for_each(|n| *n += 1);
                seen[..=to].iter_mut().for_each(|n| *n += 1);
            }
        }
        seen
    }

    fn descriptions(schedule: &GeneratedSchedule) -> Vec<&str> {
        schedule
            .portions
            .iter()
            .map(|p| p.description.as_str())
            .collect()
    }

    #[test]
    fn test_sequential_tenth_of_a_year() {
        crate::logging::init_test();
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Sequential, 0.1, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);

        assert_eq!(text.len(), 38);
        assert_eq!(text[0], "Genesis 1-29");
        assert_eq!(text[1], "Genesis 30-Exodus 5");
        assert_eq!(text[37], "Revelation 14-22");
        assert!(schedule.adjustment.is_none());
        assert!(!schedule.truncated);
    }

    #[test]
    fn test_sequential_dates_advance_daily() {
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Sequential, 0.1, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let first = schedule.portions[0].date;
        for (i, portion) in schedule.portions.iter().enumerate() {
            assert_eq!((portion.date - first).num_days(), i as i64);
            assert_eq!(portion.key, PartitionKey::SINGLE);
        }
    }

    #[test]
    fn test_sequential_one_year_from_matthew_wraps() {
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Sequential, 1.0, VerseRef::new(40, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);

        assert_eq!(text.len(), 372);
        assert_eq!(text[0], "Matthew 1-3");
        assert_eq!(text[95], "Revelation 22-Genesis 2");
        assert_eq!(text[371], "Zechariah 13-Malachi 4");
    }

    #[test]
    fn test_sequential_one_year_from_genesis() {
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Sequential, 1.0, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);
        assert_eq!(text.len(), 372);
        assert_eq!(text[0], "Genesis 1-3");
        assert_eq!(text[371], "Revelation 19-22");
    }

    #[test]
    fn test_invalid_start_rolls_forward() {
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Sequential, 20.0, VerseRef::new(40, 100, 100)),
        )
        .unwrap();

        let adjustment = schedule.adjustment.as_ref().unwrap();
        assert_eq!(adjustment.resolved, VerseRef::new(40, 1, 1));
        assert!(adjustment.message.contains("Matthew 1:1"));
        assert_eq!(schedule.portions.len(), 7440);
        assert_eq!(schedule.portions[0].description, "Matthew 1:1-4");
        assert_eq!(schedule.portions[7439].description, "Malachi 4:3-6");
    }

    #[test]
    fn test_thematic_tenth_of_a_year() {
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Thematic, 0.1, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);

        assert_eq!(text.len(), 44);
        assert_eq!(text[0], "Genesis 1-37");
        assert_eq!(text[1], "Joshua 1-Ruth 3");
        assert_eq!(text[17], "Job 36-42");
        assert_eq!(text[18], "Proverbs 1-9");
        assert_eq!(schedule.portions[17].date, schedule.portions[18].date);
        assert_eq!(text[43], "1 John 2-Jude 1");

        let hosea = text.iter().position(|t| *t == "Hosea 3-Malachi 4").unwrap();
        assert_eq!(text[hosea + 1], "Revelation 1-6");
        assert_eq!(
            schedule.portions[hosea].date,
            schedule.portions[hosea + 1].date
        );
    }

    #[test]
    fn test_thematic_from_psalms() {
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Thematic, 0.1, VerseRef::new(19, 23, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);

        assert_eq!(text.len(), 51);
        assert_eq!(text[0], "Psalms 23-51");
        assert_eq!(text[1], "Job 12-29");
        assert_eq!(text[5], "Genesis 26-Exodus 10");
        assert_eq!(text[50], "Joshua 19-Judges 6");
        assert_eq!(schedule.portions[0].key, PartitionKey::new(3));
        assert_eq!(schedule.portions[1].key, PartitionKey::new(4));
    }

    #[test]
    fn test_chronological_interleaves_books() {
        let catalog = mini_catalog();
        let schedule = generate_schedule(
            &catalog,
            &request(ScheduleType::Chronological, 0.01, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);
        assert_eq!(
            text,
            vec![
                "Genesis 1",
                "Exodus 1",
                "Genesis 2:1-3:3",
                "Leviticus 1",
                "Genesis 3:4-6",
                "Exodus 2",
                "Leviticus 2-3",
            ]
        );
        // One calendar day may hold several rows
        assert_eq!(schedule.portions[0].date, schedule.portions[1].date);
        assert_ne!(schedule.portions[1].date, schedule.portions[2].date);
    }

    #[test]
    fn test_chronological_shorter_days() {
        let catalog = mini_catalog();
        let schedule = generate_schedule(
            &catalog,
            &request(ScheduleType::Chronological, 0.015, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        assert_eq!(
            descriptions(&schedule),
            vec![
                "Genesis 1",
                "Exodus 1",
                "Genesis 2",
                "Leviticus 1",
                "Genesis 3:1-3",
                "Genesis 3:4-6",
                "Exodus 2:1-3",
                "Exodus 2:4-7",
                "Leviticus 2-3",
            ]
        );
    }

    #[test]
    fn test_every_verse_read_once() {
        let catalog = mini_catalog();
        for years in [0.01, 0.015, 0.02] {
            let schedule = generate_schedule(
                &catalog,
                &request(ScheduleType::Chronological, years, VerseRef::new(1, 1, 1)),
            )
            .unwrap();
            let seen = coverage(&catalog, &schedule);
            assert!(seen.iter().all(|&n| n == 1), "years {}: {:?}", years, seen);
        }
    }

    #[test]
    fn test_long_sequential_schedule_reads_a_verse_a_day() {
        let catalog = Catalog::builtin();
        for years in [100.0, 200.0] {
            let schedule = generate_schedule(
                catalog,
                &request(ScheduleType::Sequential, years, VerseRef::new(1, 1, 1)),
            )
            .unwrap();
            let text = descriptions(&schedule);
            assert_eq!(text.len(), 31102, "{} years", years);
            assert_eq!(text[0], "Genesis 1:1");
            assert_eq!(text[1], "Genesis 1:2");
            assert_eq!(text[31101], "Revelation 22:21");
            assert!(schedule.portions.iter().all(|p| p.start_ref() == p.end_ref()));
            assert!(!schedule.truncated);
        }
    }

    #[test]
    fn test_long_schedule_from_matthew_reads_both_laps() {
        let catalog = Catalog::builtin();
        let schedule = generate_schedule(
            catalog,
            &request(ScheduleType::Sequential, 100.0, VerseRef::new(40, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);
        assert_eq!(text.len(), 31102);
        assert_eq!(text[0], "Matthew 1:1");
        assert_eq!(text[31101], "Malachi 4:6");
        assert!(coverage(catalog, &schedule).iter().all(|&n| n == 1));
    }

    #[test]
    fn test_chronological_below_one_verse_a_day() {
        let catalog = mini_catalog();
        let schedule = generate_schedule(
            &catalog,
            &request(ScheduleType::Chronological, 0.2, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);
        assert_eq!(text.len(), 35);
        assert_eq!(
            &text[..6],
            &[
                "Genesis 1:1",
                "Genesis 1:2",
                "Genesis 1:3",
                "Genesis 1:4",
                "Genesis 1:5",
                "Exodus 1:1"
            ]
        );
        assert_eq!(text[8], "Genesis 2:1");
        assert_eq!(text[34], "Leviticus 3:2");
        assert!(coverage(&catalog, &schedule).iter().all(|&n| n == 1));
    }

    #[test]
    fn test_builtin_chronological_year() {
        let catalog = Catalog::builtin();
        let schedule = generate_schedule(
            catalog,
            &request(ScheduleType::Chronological, 1.0, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);
        assert_eq!(text.len(), 413);
        assert_eq!(text[0], "Genesis 1-3");
        assert_eq!(text[1], "Genesis 4-6");
        assert_eq!(text[412], "Revelation 19-22");
        assert!(!schedule.truncated);

        for p in &schedule.portions {
            let from = catalog.find_index(p.start_ref()).unwrap();
            let to = catalog.find_index(p.end_ref()).unwrap();
            assert!(from <= to, "inverted row {}", p.description);
        }
        assert!(coverage(catalog, &schedule).iter().all(|&n| n == 1));
    }

    #[test]
    fn test_builtin_chronological_month_visits_job_early() {
        let schedule = generate_schedule(
            Catalog::builtin(),
            &request(ScheduleType::Chronological, 0.1, VerseRef::new(1, 1, 1)),
        )
        .unwrap();
        let text = descriptions(&schedule);
        assert_eq!(text.len(), 88);
        assert_eq!(text[0], "Genesis 1-11");
        assert_eq!(text[1], "Job 1-22");
        assert_eq!(schedule.portions[0].date, schedule.portions[1].date);
        assert_eq!(text[87], "Revelation 14-22");
    }

    #[test]
    fn test_weekday_schedule_skips_weekends() {
        let mut req = request(ScheduleType::Sequential, 0.1, VerseRef::new(1, 1, 1));
        req.active_days = "weekdays".parse().unwrap();
        let schedule = generate_schedule(Catalog::builtin(), &req).unwrap();
        assert_eq!(schedule.portions.len(), 38);
        assert!(schedule
            .portions
            .iter()
            .all(|p| req.active_days.is_active(chrono::Datelike::weekday(&p.date))));
    }

    #[test]
    fn test_resolve_start_is_idempotent() {
        let catalog = Catalog::builtin();
        let (index, adjustment) = resolve_start_verse(catalog, VerseRef::new(19, 119, 176)).unwrap();
        assert!(adjustment.is_none());
        assert_eq!(catalog.verses()[index].reference(), VerseRef::new(19, 119, 176));
    }

    #[test]
    fn test_resolve_start_rolls_over_books() {
        let catalog = Catalog::builtin();
        let resolve = |r| catalog.verses()[resolve_start_verse(catalog, r).unwrap().0].reference();
        assert_eq!(resolve(VerseRef::new(1, 1, 40)), VerseRef::new(1, 2, 1));
        assert_eq!(resolve(VerseRef::new(1, 50, 40)), VerseRef::new(2, 1, 1));
        assert_eq!(resolve(VerseRef::new(66, 22, 30)), VerseRef::new(1, 1, 1));
        assert_eq!(resolve(VerseRef::new(70, 1, 1)), VerseRef::new(1, 1, 1));
        assert_eq!(resolve(VerseRef::new(43, 3, 0)), VerseRef::new(43, 3, 1));
    }

    #[test]
    fn test_cancellation() {
        let cancel = AtomicBool::new(true);
        let result = generate_schedule_cancellable(
            Catalog::builtin(),
            &request(ScheduleType::Sequential, 1.0, VerseRef::new(1, 1, 1)),
            &cancel,
        );
        assert!(matches!(result, Err(Error::Cancelled)));

        let cancel = AtomicBool::new(false);
        let schedule = generate_schedule_cancellable(
            Catalog::builtin(),
            &request(ScheduleType::Sequential, 0.1, VerseRef::new(1, 1, 1)),
            &cancel,
        )
        .unwrap();
        assert_eq!(schedule.portions.len(), 38);
    }

    #[test]
    fn test_rejects_missing_ordering_and_no_active_days() {
        let plain = CatalogBuilder::new().book(1, &[5, 4]).build().unwrap();
        let result = generate_schedule(
            &plain,
            &request(ScheduleType::Chronological, 1.0, VerseRef::new(1, 1, 1)),
        );
        assert!(matches!(result, Err(Error::OrderingUnavailable(_))));

        let mut req = request(ScheduleType::Sequential, 1.0, VerseRef::new(1, 1, 1));
        req.active_days = ActiveDays::from_mask([false; 7]);
        assert!(matches!(
            generate_schedule(Catalog::builtin(), &req),
            Err(Error::InvalidRequest(_))
        ));
    }
}
