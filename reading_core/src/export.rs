//! CSV export of stored schedules.

use crate::store::{ScheduleRow, StoredRow, StoredSchedule};
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    row: usize,
    date: String,
    description: String,
    position: Option<String>,
    partition: Option<u8>,
    start: String,
    end: String,
    finished: bool,
}

impl CsvRow {
    fn new(index: usize, stored: &StoredRow) -> Self {
        match &stored.content {
            ScheduleRow::Verses(p) => CsvRow {
                row: index,
                date: p.date.to_string(),
                description: p.description.clone(),
                position: Some(p.position.to_string()),
                partition: Some(p.key.get()),
                start: format!("{} {}:{}", p.start_book, p.start_chapter, p.start_verse),
                end: format!("{} {}:{}", p.end_book, p.end_chapter, p.end_verse),
                finished: stored.finished,
            },
            ScheduleRow::Numeric(p) => CsvRow {
                row: index,
                date: p.date.to_string(),
                description: p.description.clone(),
                position: None,
                partition: None,
                start: p.start.to_string(),
                end: p.end.to_string(),
                finished: stored.finished,
            },
        }
    }
}

/// Write every row of `schedule` to any writer, headers first
pub fn write_csv<W: Write>(schedule: &StoredSchedule, writer: W) -> Result<W> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(writer);
    for (index, row) in schedule.rows.iter().enumerate() {
        csv_writer.serialize(CsvRow::new(index, row))?;
    }
    csv_writer.flush()?;
    let inner = csv_writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(inner)
}

/// Export a schedule to a CSV file, replacing any existing file
///
/// Returns the number of rows written.
pub fn export_csv(schedule: &StoredSchedule, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let file = write_csv(schedule, file)?;
    file.sync_all()?;

    tracing::info!(
        "Exported {} rows of '{}' to {:?}",
        schedule.rows.len(),
        schedule.name,
        path
    );
    Ok(schedule.rows.len())
}
