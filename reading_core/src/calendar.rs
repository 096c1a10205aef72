//! Active reading weekdays and date advance.

use crate::{Error, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Weekdays on which a schedule assigns reading, Monday first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActiveDays([bool; 7]);

impl ActiveDays {
    pub const ALL: ActiveDays = ActiveDays([true; 7]);

    pub const fn from_mask(mask: [bool; 7]) -> Self {
        ActiveDays(mask)
    }

    pub fn is_active(&self, weekday: Weekday) -> bool {
        self.0[weekday.num_days_from_monday() as usize]
    }

    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|d| **d).count()
    }

    pub fn none_active(&self) -> bool {
        self.active_count() == 0
    }

    /// `date` itself if active, else the next active day
    pub fn first_on_or_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        if self.none_active() {
            return None;
        }
        let mut current = date;
        for _ in 0..7 {
            if self.is_active(current.weekday()) {
                return Some(current);
            }
            current = current.succ_opt()?;
        }
        None
    }

    /// The first active day strictly after `date`
    pub fn next_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.first_on_or_after(date.checked_add_signed(Duration::days(1))?)
    }

    /// Like [`ActiveDays::first_on_or_after`], but an all-inactive mask is an error
    pub fn require_first(&self, date: NaiveDate) -> Result<NaiveDate> {
        self.first_on_or_after(date).ok_or_else(|| {
            Error::InvalidRequest("no active weekdays selected".to_string())
        })
    }
}

impl Default for ActiveDays {
    fn default() -> Self {
        ActiveDays::ALL
    }
}

impl fmt::Display for ActiveDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ActiveDays::ALL {
            return f.write_str("all");
        }
        let names: Vec<&str> = DAY_NAMES
            .iter()
            .zip(self.0.iter())
            .filter(|(_, active)| **active)
            .map(|(name, _)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl FromStr for ActiveDays {
    type Err = Error;

    /// Accepts `all`, `weekdays`, `weekends`, a comma list such as
    /// `mon,wed,fri`, or a seven-character mask such as `1111100`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" | "daily" => return Ok(ActiveDays::ALL),
            "weekdays" => return Ok(ActiveDays([true, true, true, true, true, false, false])),
            "weekends" => return Ok(ActiveDays([false, false, false, false, false, true, true])),
            _ => {}
        }

        if s.len() == 7 && s.chars().all(|c| c == '0' || c == '1') {
            let mut mask = [false; 7];
            for (slot, c) in mask.iter_mut().zip(s.chars()) {
                *slot = c == '1';
            }
            return Ok(ActiveDays(mask));
        }

        let mut mask = [false; 7];
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let weekday: Weekday = part.parse().map_err(|_| {
                Error::InvalidRequest(format!("unknown weekday '{}'", part))
            })?;
            mask[weekday.num_days_from_monday() as usize] = true;
        }
        Ok(ActiveDays(mask))
    }
}

impl TryFrom<String> for ActiveDays {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ActiveDays> for String {
    fn from(days: ActiveDays) -> String {
        days.to_string()
    }
}
