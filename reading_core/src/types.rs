//! Core domain types for the reading schedule system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Verse references and catalog entries
//! - Schedule kinds and partition keys
//! - Reading portions (one persisted schedule row)
//! - Finished-portion spans used during recreation

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::OrderingKind;

// ============================================================================
// Verse Types
// ============================================================================

/// A book/chapter/verse triple as a user or a stored row names it.
///
/// The triple need not exist in the catalog; resolution against the
/// catalog happens in the assembler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerseRef {
    pub book: u8,
    pub chapter: u16,
    pub verse: u16,
}

impl VerseRef {
    pub const fn new(book: u8, chapter: u16, verse: u16) -> Self {
        Self {
            book,
            chapter,
            verse,
        }
    }
}

/// One verse of the reference catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseEntry {
    /// Canonical sequential identifier, 1-based and gap free.
    pub verse_id: u32,
    pub book: u8,
    pub chapter: u16,
    pub verse: u16,
}

impl VerseEntry {
    pub fn reference(&self) -> VerseRef {
        VerseRef::new(self.book, self.chapter, self.verse)
    }

    /// Whether both entries belong to the same chapter of the same book
    pub fn same_chapter(&self, other: &VerseEntry) -> bool {
        self.book == other.book && self.chapter == other.chapter
    }
}

/// Where a span sits relative to the chapter(s) it touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersePosition {
    Start,
    Middle,
    End,
    StartAndEnd,
}

impl VersePosition {
    pub fn from_flags(is_start: bool, is_end: bool) -> Self {
        match (is_start, is_end) {
            (true, true) => VersePosition::StartAndEnd,
            (true, false) => VersePosition::Start,
            (false, true) => VersePosition::End,
            (false, false) => VersePosition::Middle,
        }
    }
}

impl fmt::Display for VersePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersePosition::Start => "START",
            VersePosition::Middle => "MIDDLE",
            VersePosition::End => "END",
            VersePosition::StartAndEnd => "START_AND_END",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Schedule Types
// ============================================================================

/// Kind of schedule a user can create
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Sequential,
    Chronological,
    Thematic,
    Custom,
}

impl ScheduleType {
    /// The verse ordering a schedule of this type walks, if any
    pub fn ordering(&self) -> Option<OrderingKind> {
        match self {
            ScheduleType::Sequential => Some(OrderingKind::Sequential),
            ScheduleType::Chronological => Some(OrderingKind::Chronological),
            ScheduleType::Thematic => Some(OrderingKind::Thematic),
            ScheduleType::Custom => None,
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleType::Sequential => "sequential",
            ScheduleType::Chronological => "chronological",
            ScheduleType::Thematic => "thematic",
            ScheduleType::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for ScheduleType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "canonical" | "seq" => Ok(ScheduleType::Sequential),
            "chronological" | "chrono" => Ok(ScheduleType::Chronological),
            "thematic" | "theme" => Ok(ScheduleType::Thematic),
            "custom" => Ok(ScheduleType::Custom),
            other => Err(crate::Error::InvalidRequest(format!(
                "unknown schedule type '{}'",
                other
            ))),
        }
    }
}

/// Identifier of an independent traversal stream within a schedule.
///
/// Single-stream schedules use key 1; thematic schedules use 1..=7.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey(u8);

impl PartitionKey {
    pub const SINGLE: PartitionKey = PartitionKey(1);

    pub const fn new(id: u8) -> Self {
        PartitionKey(id)
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for PartitionKey {
    fn default() -> Self {
        PartitionKey::SINGLE
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Portion Types
// ============================================================================

/// One persisted schedule row: a verse span, its date and its description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadingPortion {
    pub start_book: String,
    pub start_book_number: u8,
    pub start_chapter: u16,
    pub start_verse: u16,
    pub end_book: String,
    pub end_book_number: u8,
    pub end_chapter: u16,
    pub end_verse: u16,
    pub date: NaiveDate,
    pub description: String,
    pub position: VersePosition,
    #[serde(default)]
    pub key: PartitionKey,
}

impl ReadingPortion {
    pub fn start_ref(&self) -> VerseRef {
        VerseRef::new(self.start_book_number, self.start_chapter, self.start_verse)
    }

    pub fn end_ref(&self) -> VerseRef {
        VerseRef::new(self.end_book_number, self.end_chapter, self.end_verse)
    }
}

/// A maximal run of finished rows, by row index (inclusive on both ends)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinishedPortionSpan {
    pub start_index: usize,
    pub end_index: usize,
}

impl FinishedPortionSpan {
    pub fn row_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}
