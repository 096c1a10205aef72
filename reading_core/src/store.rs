//! Schedule storage.
//!
//! One JSON document per schedule under `<data_dir>/schedules/`, plus an
//! `index.json` mapping schedule names to ids. Every mutation holds an
//! exclusive lock on `.lock` and writes through a temp file and rename.

use crate::assembler::{GeneratedSchedule, ScheduleRequest};
use crate::custom::{CustomPortion, CustomScheduleRequest};
use crate::recreate::archive_name;
use crate::types::ReadingPortion;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Row content: a verse span or a custom numeric span
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleRow {
    Verses(ReadingPortion),
    Numeric(CustomPortion),
}

impl ScheduleRow {
    pub fn date(&self) -> NaiveDate {
        match self {
            ScheduleRow::Verses(p) => p.date,
            ScheduleRow::Numeric(p) => p.date,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ScheduleRow::Verses(p) => &p.description,
            ScheduleRow::Numeric(p) => &p.description,
        }
    }
}

/// One persisted row and its completion flag
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub content: ScheduleRow,
    #[serde(default)]
    pub finished: bool,
}

/// The request a schedule was generated from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSource {
    Verses(ScheduleRequest),
    Custom(CustomScheduleRequest),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSchedule {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub source: ScheduleSource,
    #[serde(default)]
    pub adjustment: Option<String>,
    pub rows: Vec<StoredRow>,
}

impl StoredSchedule {
    pub fn from_generated(
        name: impl Into<String>,
        request: ScheduleRequest,
        generated: GeneratedSchedule,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            source: ScheduleSource::Verses(request),
            adjustment: generated.adjustment.map(|a| a.message),
            rows: generated
                .portions
                .into_iter()
                .map(|p| StoredRow {
                    content: ScheduleRow::Verses(p),
                    finished: false,
                })
                .collect(),
        }
    }

    pub fn from_custom(
        name: impl Into<String>,
        request: CustomScheduleRequest,
        rows: Vec<CustomPortion>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            source: ScheduleSource::Custom(request),
            adjustment: None,
            rows: rows
                .into_iter()
                .map(|p| StoredRow {
                    content: ScheduleRow::Numeric(p),
                    finished: false,
                })
                .collect(),
        }
    }

    pub fn finished_flags(&self) -> Vec<bool> {
        self.rows.iter().map(|r| r.finished).collect()
    }

    pub fn finished_count(&self) -> usize {
        self.rows.iter().filter(|r| r.finished).count()
    }

    /// Verse rows in order; numeric rows are skipped
    pub fn verse_portions(&self) -> Vec<ReadingPortion> {
        self.rows
            .iter()
            .filter_map(|r| match &r.content {
                ScheduleRow::Verses(p) => Some(p.clone()),
                ScheduleRow::Numeric(_) => None,
            })
            .collect()
    }

    pub fn kind_label(&self) -> String {
        match &self.source {
            ScheduleSource::Verses(r) => r.schedule_type.to_string(),
            ScheduleSource::Custom(_) => "custom".to_string(),
        }
    }
}

/// Listing entry
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleSummary {
    pub name: String,
    pub id: Uuid,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub rows: usize,
    pub finished: usize,
}

/// Storage collaborator for generated schedules
pub trait ScheduleStore {
    /// Store a new schedule; fails with [`Error::NameTaken`] on a duplicate name
    fn create(&mut self, schedule: &StoredSchedule) -> Result<()>;
    fn load(&self, name: &str) -> Result<StoredSchedule>;
    fn list(&self) -> Result<Vec<ScheduleSummary>>;
    fn exists(&self, name: &str) -> Result<bool>;
    /// Flag rows `from..=to` and return how many changed
    fn set_finished(&mut self, name: &str, from: usize, to: usize, finished: bool)
        -> Result<usize>;
    /// Rename a schedule out of the way and return its new name
    fn archive(&mut self, name: &str) -> Result<String>;
    /// Rename a schedule; fails with [`Error::NameTaken`] if `to` is in use
    fn rename(&mut self, from: &str, to: &str) -> Result<()>;
}

/// Holds the store lock until dropped
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// JSON-file schedule store
pub struct JsonScheduleStore {
    root: PathBuf,
}

impl JsonScheduleStore {
    /// Store rooted at `<data_dir>/schedules`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into().join("schedules"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn schedule_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    fn lock(&self, exclusive: bool) -> Result<StoreLock> {
        std::fs::create_dir_all(&self.root)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(".lock"))?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(StoreLock { file })
    }

    fn read_index(&self) -> Result<BTreeMap<String, Uuid>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        read_json(&path)
    }

    fn lookup(&self, index: &BTreeMap<String, Uuid>, name: &str) -> Result<Uuid> {
        index
            .get(name)
            .copied()
            .ok_or_else(|| Error::ScheduleNotFound(name.to_string()))
    }

    fn read_schedule(&self, id: Uuid) -> Result<StoredSchedule> {
        read_json(&self.schedule_path(id))
    }

    /// Move `from` to `to` in both the document and the index. Caller holds
    /// the exclusive lock.
    fn rename_locked(
        &self,
        index: &mut BTreeMap<String, Uuid>,
        from: &str,
        to: &str,
    ) -> Result<()> {
        let id = self.lookup(index, from)?;
        let mut schedule = self.read_schedule(id)?;
        schedule.name = to.to_string();
        write_json(&self.schedule_path(id), &schedule)?;
        index.remove(from);
        index.insert(to.to_string(), id);
        write_json(&self.index_path(), index)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Atomically replace `path` with the JSON form of `value`
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "schedule path missing parent")
    })?;
    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl ScheduleStore for JsonScheduleStore {
    fn create(&mut self, schedule: &StoredSchedule) -> Result<()> {
        let _lock = self.lock(true)?;
        let mut index = self.read_index()?;
        if index.contains_key(&schedule.name) {
            return Err(Error::NameTaken(schedule.name.clone()));
        }

        write_json(&self.schedule_path(schedule.id), schedule)?;
        index.insert(schedule.name.clone(), schedule.id);
        write_json(&self.index_path(), &index)?;

        tracing::info!(
            "Stored schedule '{}' ({} rows) as {}",
            schedule.name,
            schedule.rows.len(),
            schedule.id
        );
        Ok(())
    }

    fn load(&self, name: &str) -> Result<StoredSchedule> {
        let _lock = self.lock(false)?;
        let index = self.read_index()?;
        let id = self.lookup(&index, name)?;
        self.read_schedule(id)
    }

    fn list(&self) -> Result<Vec<ScheduleSummary>> {
        let _lock = self.lock(false)?;
        let index = self.read_index()?;
        let mut summaries = Vec::with_capacity(index.len());
        for (name, id) in &index {
            match self.read_schedule(*id) {
                Ok(schedule) => summaries.push(ScheduleSummary {
                    name: name.clone(),
                    id: *id,
                    kind: schedule.kind_label(),
                    created_at: schedule.created_at,
                    rows: schedule.rows.len(),
                    finished: schedule.finished_count(),
                }),
                Err(e) => {
                    tracing::warn!("Skipping unreadable schedule '{}' ({}): {}", name, id, e);
                }
            }
        }
        Ok(summaries)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let _lock = self.lock(false)?;
        Ok(self.read_index()?.contains_key(name))
    }

    fn set_finished(
        &mut self,
        name: &str,
        from: usize,
        to: usize,
        finished: bool,
    ) -> Result<usize> {
        let _lock = self.lock(true)?;
        let index = self.read_index()?;
        let id = self.lookup(&index, name)?;
        let mut schedule = self.read_schedule(id)?;

        if from > to || to >= schedule.rows.len() {
            return Err(Error::InvalidRequest(format!(
                "rows {}..={} are outside '{}' ({} rows)",
                from,
                to,
                name,
                schedule.rows.len()
            )));
        }

        let mut changed = 0;
        for row in &mut schedule.rows[from..=to] {
            if row.finished != finished {
                row.finished = finished;
                changed += 1;
            }
        }
        write_json(&self.schedule_path(id), &schedule)?;
        tracing::debug!("Marked {} row(s) of '{}' finished={}", changed, name, finished);
        Ok(changed)
    }

    fn archive(&mut self, name: &str) -> Result<String> {
        let _lock = self.lock(true)?;
        let mut index = self.read_index()?;
        self.lookup(&index, name)?;

        let archived = archive_name(name, |candidate| index.contains_key(candidate));
        self.rename_locked(&mut index, name, &archived)?;

        tracing::info!("Archived schedule '{}' as '{}'", name, archived);
        Ok(archived)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let _lock = self.lock(true)?;
        let mut index = self.read_index()?;
        if index.contains_key(to) {
            return Err(Error::NameTaken(to.to_string()));
        }
        self.rename_locked(&mut index, from, to)?;
        tracing::info!("Renamed schedule '{}' to '{}'", from, to);
        Ok(())
    }
}
