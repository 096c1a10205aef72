//! Per-partition traversal state.

use crate::boundary::DayBoundary;
use crate::catalog::OrderingView;
use crate::params::{PartitionParams, ScheduleParameters};
use crate::types::PartitionKey;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Traversal state of one partition, mutated once per virtual day.
///
/// Indices are signed: `end_index` starts one before the starting pointer,
/// which is `-1` for a schedule that starts at the first verse.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerState {
    pub pointer: i64,
    pub end_index: i64,
    pub has_looped: bool,
    pub is_end: bool,
    pub verse_overflow: f64,
}

impl TrackerState {
    pub fn starting_at(index: i64) -> Self {
        Self {
            pointer: index,
            end_index: index - 1,
            has_looped: false,
            is_end: false,
            verse_overflow: 0.0,
        }
    }

    /// Record a resolved day and move the pointer past it.
    pub fn advance(&mut self, boundary: &DayBoundary, partition: &PartitionParams) {
        self.has_looped = boundary.has_looped;
        self.is_end = boundary.is_end;
        self.verse_overflow = boundary.verse_overflow;
        self.pointer = boundary.day_end_index + 1;
        if self.pointer > partition.max_index as i64 {
            self.pointer = partition.least_index as i64;
        }
    }
}

/// Tracker states for every partition plus the order they are visited in.
#[derive(Clone, Debug)]
pub struct Trackers {
    pub start_key: PartitionKey,
    states: BTreeMap<PartitionKey, TrackerState>,
    order: Vec<PartitionKey>,
}

impl Trackers {
    /// Partition keys in visiting order, starting with `start_key`
    pub fn key_order(&self) -> &[PartitionKey] {
        &self.order
    }

    pub fn get(&self, key: PartitionKey) -> Option<&TrackerState> {
        self.states.get(&key)
    }

    pub fn get_mut(&mut self, key: PartitionKey) -> Option<&mut TrackerState> {
        self.states.get_mut(&key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Place every partition's pointer for a schedule starting at `start_index`
/// (an index into `view`).
///
/// Partitions other than the one holding the start are placed at the same
/// relative offset within their own range, snapped back to a chapter start
/// when the start verse itself opens a chapter.
pub fn initialize(
    view: &OrderingView<'_>,
    params: &ScheduleParameters,
    start_index: usize,
) -> Result<Trackers> {
    let start = params.partition_containing(start_index).ok_or_else(|| {
        Error::InvalidRequest(format!(
            "start index {} lies outside every partition",
            start_index
        ))
    })?;
    let start_key = start.key;

    let span = start.max_index - start.least_index;
    let ratio = if span == 0 {
        0.0
    } else {
        (start_index - start.least_index) as f64 / span as f64
    };
    let snap_to_chapter = view.catalog().is_chapter_start(view.get(start_index));

    let mut states = BTreeMap::new();
    for partition in &params.partitions {
        let pointer = if partition.key == start_key {
            start_index
        } else {
            let least = partition.least_index;
            let mut p = least
                + (ratio * (partition.max_index - least) as f64).round() as usize;
            if snap_to_chapter {
                while p > least && view.get(p - 1).same_chapter(view.get(p)) {
                    p -= 1;
                }
            }
            p
        };
        tracing::debug!("Partition {} starts at index {}", partition.key, pointer);
        states.insert(partition.key, TrackerState::starting_at(pointer as i64));
    }

    let keys: Vec<PartitionKey> = params.keys().collect();
    let pivot = keys.iter().position(|k| *k == start_key).unwrap_or(0);
    let mut order = keys[pivot..].to_vec();
    order.extend_from_slice(&keys[..pivot]);

    Ok(Trackers {
        start_key,
        states,
        order,
    })
}
