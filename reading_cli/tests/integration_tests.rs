//! Integration tests for the rplan binary.
//!
//! These tests verify end-to-end behavior including:
//! - Schedule previews and creation
//! - Progress tracking and recreation
//! - CSV export and external catalogs

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// CLI bound to a temp data dir, isolated from any user config
fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rplan").expect("rplan binary");
    cmd.env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(temp_dir.path().join("data"));
    cmd
}

fn create_plan(temp_dir: &TempDir, name: &str, years: &str) {
    cli(temp_dir)
        .args(["create", name, "--years", years, "--start-date", "2024-01-01"])
        .assert()
        .success();
}

#[test]
fn test_cli_help() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reading schedule planner"));
}

#[test]
fn test_preview_sequential_month() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args(["preview", "--years", "0.1", "--start-date", "2024-03-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-03-01  Genesis 1-29"))
        .stdout(predicate::str::contains("Revelation 14-22"))
        .stdout(predicate::str::contains("38 rows"));
}

#[test]
fn test_preview_reports_adjusted_start() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args([
            "preview",
            "--years",
            "1",
            "--start",
            "Matthew 100:100",
            "--start-date",
            "2024-01-01",
            "--limit",
            "1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Note: Matthew 100:100 does not exist; starting at Matthew 1:1 instead",
        ))
        .stdout(predicate::str::contains("372 rows"));
}

#[test]
fn test_preview_rejects_bad_input() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args(["preview", "--start", "Nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read verse reference"));

    cli(&temp_dir)
        .args(["preview", "--years", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid request"));
}

#[test]
fn test_preview_builtin_chronological() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args([
            "preview",
            "--type",
            "chronological",
            "--years",
            "0.1",
            "--start-date",
            "2024-03-01",
            "--limit",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-03-01  Genesis 1-11"))
        .stdout(predicate::str::contains("2024-03-01  Job 1-22"))
        .stdout(predicate::str::contains("88 rows"));
}

#[test]
fn test_create_and_duplicate_name() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args(["create", "Daily", "--years", "0.1", "--start-date", "2024-03-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Created sequential schedule 'Daily' with 38 rows",
        ));

    let index_path = temp_dir.path().join("data/schedules/index.json");
    let index: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(index_path).unwrap()).unwrap();
    let id = index["Daily"].as_str().expect("index entry for Daily");
    assert!(temp_dir
        .path()
        .join("data/schedules")
        .join(format!("{}.json", id))
        .exists());

    cli(&temp_dir)
        .args(["create", "Daily", "--years", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already taken"));
}

#[test]
fn test_show_and_finish() {
    let temp_dir = setup_test_dir();
    create_plan(&temp_dir, "Plan", "0.1");

    cli(&temp_dir)
        .args(["finish", "Plan", "0", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked 3 row(s) of 'Plan' finished"));

    cli(&temp_dir)
        .args(["show", "Plan", "--limit", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 of 38 finished"))
        .stdout(predicate::str::contains("0 [x] 2024-01-01  Genesis 1-29"))
        .stdout(predicate::str::contains("3 [ ]"));

    cli(&temp_dir)
        .args(["finish", "Plan", "1", "--undo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked 1 row(s) of 'Plan' unfinished"));

    cli(&temp_dir)
        .args(["show", "Missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Schedule 'Missing' does not exist"));
}

#[test]
fn test_list_schedules() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No schedules stored"));

    create_plan(&temp_dir, "First", "0.1");
    cli(&temp_dir)
        .args([
            "custom",
            "Lessons",
            "--description",
            "Lesson",
            "--from",
            "1",
            "--to",
            "10",
            "--per-day",
            "3",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Created custom schedule 'Lessons' with 4 rows",
        ));

    cli(&temp_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("First"))
        .stdout(predicate::str::contains("Lessons"))
        .stdout(predicate::str::contains("0/4 finished"));
}

#[test]
fn test_custom_schedule_rows() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args([
            "custom",
            "Book",
            "--description",
            "Chapter",
            "--from",
            "1",
            "--to",
            "10",
            "--per-day",
            "3",
            "--start-date",
            "2024-01-01",
            "--active-days",
            "weekdays",
        ])
        .assert()
        .success();

    // 2024-01-01 is a Monday
    cli(&temp_dir)
        .args(["show", "Book"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-01-01  Chapter 1-4"))
        .stdout(predicate::str::contains("2024-01-04  Chapter 10"));

    cli(&temp_dir)
        .args(["recreate", "Book", "--years", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be recreated"));
}

#[test]
fn test_recreate_keeps_progress_and_archives() {
    let temp_dir = setup_test_dir();
    create_plan(&temp_dir, "Plan", "1");

    cli(&temp_dir)
        .args(["finish", "Plan", "0", "9"])
        .assert()
        .success();

    cli(&temp_dir)
        .args(["recreate", "Plan", "--years", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recreated 'Plan' with 744 rows"))
        .stdout(predicate::str::contains("previous schedule kept as 'Plan (Old)'"));

    cli(&temp_dir)
        .args(["show", "Plan (Old)", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10 of 372 finished"));

    cli(&temp_dir)
        .args(["recreate", "Plan", "--years", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kept as 'Plan (Old) 2'"));
}

#[test]
fn test_export_csv() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args(["create", "Month", "--years", "0.1", "--start-date", "2024-03-01"])
        .assert()
        .success();
    cli(&temp_dir)
        .args(["finish", "Month", "0"])
        .assert()
        .success();

    let output = temp_dir.path().join("exports").join("month.csv");
    cli(&temp_dir)
        .args(["export", "Month", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 38 rows"));

    let contents = fs::read_to_string(&output).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next(),
        Some("row,date,description,position,partition,start,end,finished")
    );
    assert_eq!(
        lines.next(),
        Some("0,2024-03-01,Genesis 1-29,START_AND_END,1,Genesis 1:1,Genesis 29:35,true")
    );
    assert_eq!(lines.count(), 37);
}

fn write_catalog(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let mut verses = String::from("verse_id,book,chapter,verse\n");
    let mut id = 1;
    for chapter in 1..=3 {
        for verse in 1..=4 {
            verses.push_str(&format!("{},1,{},{}\n", id, chapter, verse));
            id += 1;
        }
    }
    fs::write(dir.join("verses.csv"), verses).unwrap();
    fs::write(dir.join("books.csv"), "book,name\n1,Alpha\n").unwrap();

    let mut chrono = String::from("position,verse_id\n");
    let order = (5..=8).chain(1..=4).chain(9..=12);
    for (position, verse_id) in order.enumerate() {
        chrono.push_str(&format!("{},{}\n", position + 1, verse_id));
    }
    fs::write(dir.join("chronological.csv"), chrono).unwrap();
}

#[test]
fn test_external_catalog() {
    let temp_dir = setup_test_dir();
    let catalog_dir = temp_dir.path().join("catalog");
    write_catalog(&catalog_dir);

    cli(&temp_dir)
        .arg("--catalog-dir")
        .arg(&catalog_dir)
        .args([
            "preview",
            "--type",
            "chronological",
            "--years",
            "0.01",
            "--start",
            "Alpha 1:1",
            "--start-date",
            "2024-01-01",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alpha"));

    cli(&temp_dir)
        .arg("--catalog-dir")
        .arg(temp_dir.path().join("nowhere"))
        .args(["preview"])
        .assert()
        .failure();
}
