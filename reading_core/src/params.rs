//! Schedule parameter calculation.
//!
//! Converts a requested duration into per-partition verse budgets.

use crate::catalog::{Catalog, OrderingKind};
use crate::types::{PartitionKey, ScheduleType};
use crate::{Error, Result};
use serde::Serialize;

/// Budget for one traversal stream
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartitionParams {
    pub key: PartitionKey,
    pub least_index: usize,
    pub max_index: usize,
    pub verses_per_day: f64,
    /// Tolerance window (in verses) for snapping a day's end onto a chapter break
    pub buffer: i64,
}

impl PartitionParams {
    pub fn verse_count(&self) -> usize {
        self.max_index - self.least_index + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.least_index..=self.max_index).contains(&index)
    }
}

/// Parameters for one generation run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleParameters {
    pub years: f64,
    pub duration_days: f64,
    pub ordering: OrderingKind,
    pub partitions: Vec<PartitionParams>,
}

impl ScheduleParameters {
    pub fn keys(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.partitions.iter().map(|p| p.key)
    }

    pub fn partition(&self, key: PartitionKey) -> Option<&PartitionParams> {
        self.partitions.iter().find(|p| p.key == key)
    }

    /// The partition whose index range holds `index`
    pub fn partition_containing(&self, index: usize) -> Option<&PartitionParams> {
        self.partitions.iter().find(|p| p.contains(index))
    }

    /// Hard ceiling on virtual days for one generation run
    pub fn day_ceiling(&self) -> usize {
        (self.duration_days * 2.0).ceil() as usize
    }
}

/// Requested years to days, including the `years * 7` drift correction.
pub fn duration_days(years: f64) -> f64 {
    years * 365.0 + years * 7.0
}

fn buffer_for(verses_per_day: f64) -> i64 {
    (verses_per_day / 4.0).round() as i64
}

/// Compute parameters for a schedule of `schedule_type` lasting `years`.
pub fn calculate(
    catalog: &Catalog,
    schedule_type: ScheduleType,
    years: f64,
) -> Result<ScheduleParameters> {
    let ordering = schedule_type.ordering().ok_or_else(|| {
        Error::InvalidRequest("custom schedules have no verse ordering".to_string())
    })?;
    if !years.is_finite() || years <= 0.0 {
        return Err(Error::InvalidRequest(format!(
            "duration must be a positive number of years, got {}",
            years
        )));
    }
    if catalog.is_empty() {
        return Err(Error::InvalidRequest("catalog is empty".to_string()));
    }
    // Fails early when the catalog lacks the ordering
    catalog.ordering(ordering)?;

    let days = duration_days(years);

    let partitions = match ordering {
        OrderingKind::Thematic => {
            let themes = catalog
                .themes()
                .ok_or(Error::OrderingUnavailable(OrderingKind::Thematic))?;
            let days_per_stream = days / 7.0 - years * 0.5;
            themes
                .iter()
                .map(|theme| {
                    let raw = (theme.verse_count() as f64 / days_per_stream).floor();
                    let verses_per_day = raw.max(1.0);
                    PartitionParams {
                        key: PartitionKey::new(theme.theme),
                        least_index: theme.least_index,
                        max_index: theme.max_index,
                        verses_per_day,
                        buffer: buffer_for(verses_per_day),
                    }
                })
                .collect()
        }
        OrderingKind::Sequential | OrderingKind::Chronological => {
            // Past one verse a day a longer duration only adds rows of a single verse
            let verses_per_day = (catalog.len() as f64 / days).max(1.0);
            vec![PartitionParams {
                key: PartitionKey::SINGLE,
                least_index: 0,
                max_index: catalog.len() - 1,
                verses_per_day,
                buffer: buffer_for(verses_per_day),
            }]
        }
    };

    tracing::debug!(
        "Parameters for {} over {} years: {} days, {} partition(s)",
        ordering,
        years,
        days,
        partitions.len()
    );

    Ok(ScheduleParameters {
        years,
        duration_days: days,
        ordering,
        partitions,
    })
}
