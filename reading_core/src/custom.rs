//! Custom numeric schedules and fixed-bucket verse splits.

use crate::calendar::ActiveDays;
use crate::catalog::Catalog;
use crate::portion::portion_between;
use crate::types::{PartitionKey, ReadingPortion, VerseRef};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Hard ceiling on rows for one custom schedule
pub const MAX_CUSTOM_DAYS: usize = 1_000_000;

const EPSILON: f64 = 1e-9;

/// A schedule over an arbitrary numbered publication ("Chapter 1-3", ...)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomScheduleRequest {
    /// Label placed before the numbers, e.g. "Portion" or "Lesson"
    pub description: String,
    pub starting_portion: f64,
    pub max_portion: f64,
    pub portions_per_day: f64,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub active_days: ActiveDays,
}

/// One day of a custom schedule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomPortion {
    pub date: NaiveDate,
    pub description: String,
    pub start: f64,
    pub end: f64,
}

/// Up to six decimals, trailing zeros dropped
fn format_number(value: f64) -> String {
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Walk `starting_portion..=max_portion` in steps of `portions_per_day`.
///
/// Degenerate bounds yield an empty schedule rather than an error.
pub fn generate_custom_schedule(request: &CustomScheduleRequest) -> Result<Vec<CustomPortion>> {
    let step = request.portions_per_day;
    let from = request.starting_portion;
    let to = request.max_portion;
    if !step.is_finite() || step <= 0.0 || !from.is_finite() || !to.is_finite() || to < from {
        tracing::info!(
            "Custom schedule bounds {}..{} step {} are empty",
            from,
            to,
            step
        );
        return Ok(Vec::new());
    }

    let mut date = request.active_days.require_first(request.start_date)?;
    let mut rows = Vec::new();
    for day in 0..MAX_CUSTOM_DAYS {
        let start = from + day as f64 * step;
        if start > to + EPSILON {
            break;
        }
        let end = (start + step).min(to);
        let description = if (end - start).abs() < EPSILON {
            format!("{} {}", request.description, format_number(start))
        } else {
            format!(
                "{} {}-{}",
                request.description,
                format_number(start),
                format_number(end)
            )
        };
        rows.push(CustomPortion {
            date,
            description,
            start,
            end,
        });
        date = request
            .active_days
            .next_after(date)
            .ok_or_else(|| Error::Other(format!("date overflow after {}", date)))?;
    }

    if rows.len() == MAX_CUSTOM_DAYS {
        tracing::warn!(
            "Custom schedule stopped at the {}-day ceiling",
            MAX_CUSTOM_DAYS
        );
    }
    Ok(rows)
}

/// Slice the canonical range `from..=to` into `buckets` day portions whose
/// verse counts differ by at most one. Fewer verses than buckets gives one
/// verse per day.
pub fn split_range(
    catalog: &Catalog,
    from: VerseRef,
    to: VerseRef,
    buckets: usize,
    start_date: NaiveDate,
    active_days: ActiveDays,
) -> Result<Vec<ReadingPortion>> {
    let missing = |r: VerseRef| {
        Error::InvalidRequest(format!("{} is not in the catalog", catalog.format_reference(r)))
    };
    let first = catalog.find_index(from).ok_or_else(|| missing(from))?;
    let last = catalog.find_index(to).ok_or_else(|| missing(to))?;
    if last < first {
        return Err(Error::InvalidRequest(format!(
            "{} comes after {}",
            catalog.format_reference(from),
            catalog.format_reference(to)
        )));
    }
    if buckets == 0 {
        return Err(Error::InvalidRequest("at least one day is required".to_string()));
    }

    let total = last - first + 1;
    let buckets = buckets.min(total);
    let base = total / buckets;
    let extra = total % buckets;

    let canonical = catalog.sequential();
    let mut date = active_days.require_first(start_date)?;
    let mut rows = Vec::with_capacity(buckets);
    let mut cursor = first;
    for bucket in 0..buckets {
        let size = base + usize::from(bucket < extra);
        let end = cursor + size - 1;
        rows.push(portion_between(&canonical, cursor, end, date, PartitionKey::SINGLE));
        cursor = end + 1;
        date = active_days
            .next_after(date)
            .ok_or_else(|| Error::Other(format!("date overflow after {}", date)))?;
    }
    Ok(rows)
}

/// Seven daily portions over `from..=to`, one per day of the week
pub fn weekly_portions(
    catalog: &Catalog,
    from: VerseRef,
    to: VerseRef,
    start_date: NaiveDate,
) -> Result<Vec<ReadingPortion>> {
    split_range(catalog, from, to, 7, start_date, ActiveDays::ALL)
}
