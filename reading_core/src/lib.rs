#![forbid(unsafe_code)]

//! Core domain model and scheduling logic for rplan.
//!
//! This crate provides:
//! - The verse catalog and its sequential, chronological and thematic orderings
//! - Multi-year schedule generation with chapter-boundary smoothing
//! - Custom numeric schedules and weekly splits
//! - Progress-preserving recreation of stored schedules
//! - Persistence (JSON store, CSV export)

pub mod types;
pub mod error;
pub mod canon;
pub mod catalog;
pub mod locator;
pub mod config;
pub mod logging;
pub mod params;
pub mod tracker;
pub mod boundary;
pub mod portion;
pub mod calendar;
pub mod assembler;
pub mod custom;
pub mod recreate;
pub mod store;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{Catalog, CatalogBuilder, CatalogCache, OrderingKind, OrderingView};
pub use config::Config;
pub use calendar::ActiveDays;
pub use assembler::{
    generate_schedule, generate_schedule_cancellable, generate_with_options, GeneratedSchedule,
    GenerationOptions, ScheduleRequest, VerseAdjustment,
};
pub use custom::{generate_custom_schedule, CustomPortion, CustomScheduleRequest};
pub use recreate::{recreate_in_store, RecreateOptions, RecreationPlan};
pub use store::{JsonScheduleStore, ScheduleStore, StoredSchedule};
pub use export::export_csv;
