//! Rendering of report rows.

use comfy_table::{presets, Table};
use rewind_core::history::BatchEntry;
use rewind_core::{BatchReport, PreviewRow, RestoreOutcome, RestoreRow, SeedReport, WriteOutcome};
use serde::Serialize;

const MASK: &str = "********";
const WIDTH: usize = 40;
const STAMP: &str = "%Y-%m-%dT%H:%M:%S";

/// How rows are printed.
#[derive(Debug, Clone, Copy)]
pub struct Format {
    pub json: bool,
    pub show_secrets: bool,
}

impl Format {
    fn value(&self, row: &PreviewRow) -> String {
        match (row.value.as_deref(), row.value_type) {
            (Some(_), Some(t)) if t.is_secret() && !self.show_secrets => MASK.to_string(),
            (Some(v), _) => v.to_string(),
            (None, _) => String::new(),
        }
    }
}

fn print_json<T: Serialize>(rows: &[T]) -> anyhow::Result<()> {
    for row in rows {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}

/// Shorten a cell to `WIDTH` characters.
fn clip(value: &str) -> String {
    if value.chars().count() <= WIDTH {
        value.to_string()
    } else {
        let head: String = value.chars().take(WIDTH - 3).collect();
        format!("{}...", head)
    }
}

fn table(headings: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::ASCII_FULL).set_header(headings.to_vec());
    for row in rows {
        table.add_row(row);
    }
    table
}

fn print_table(table: Table, empty: bool) {
    if !empty {
        println!("{}", table);
    }
}

fn preview_table(rows: &[&PreviewRow], format: Format) -> Table {
    table(
        &["KEY", "VALUE", "TYPE", "MODIFIED", "DESCRIPTION"],
        rows.iter()
            .map(|row| {
                let (value, kind) = match (&row.failure, row.was_absent_at_time) {
                    (Some(failure), _) => (failure.to_string(), "FAILED".to_string()),
                    // A timestamp on an absent row is the delete marker's.
                    (None, true) if row.change_timestamp.is_some() => {
                        ("(deleted)".to_string(), String::new())
                    }
                    (None, true) => ("(absent)".to_string(), String::new()),
                    (None, false) => (
                        format.value(row),
                        row.value_type.map(|t| t.to_string()).unwrap_or_default(),
                    ),
                };
                let modified = row
                    .change_timestamp
                    .map(|t| {
                        let stamp = t.format(STAMP).to_string();
                        if row.approximate {
                            format!("~{}", stamp)
                        } else {
                            stamp
                        }
                    })
                    .unwrap_or_default();
                vec![
                    row.key.clone(),
                    clip(&value),
                    kind,
                    modified,
                    clip(row.description.as_deref().unwrap_or_default()),
                ]
            })
            .collect(),
    )
}

/// Print a preview report.
pub fn preview(report: &BatchReport<PreviewRow>, format: Format) -> anyhow::Result<()> {
    let mut rows: Vec<&PreviewRow> = report.rows.iter().collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));

    if format.json {
        return print_json(&rows);
    }
    print_table(preview_table(&rows, format), rows.is_empty());
    Ok(())
}

fn restore_table(rows: &[&RestoreRow]) -> Table {
    table(
        &["KEY", "OUTCOME", "DETAIL"],
        rows.iter()
            .map(|row| {
                let (outcome, detail) = match row.outcome {
                    RestoreOutcome::Restored {
                        value_type,
                        change_timestamp,
                    } => (
                        "restored",
                        format!("{} from {}", value_type, change_timestamp.format(STAMP)),
                    ),
                    RestoreOutcome::SkippedAbsent => ("skipped", "absent at that time".to_string()),
                    RestoreOutcome::Failed(ref failure) => ("failed", failure.to_string()),
                };
                vec![row.key.clone(), outcome.to_string(), clip(&detail)]
            })
            .collect(),
    )
}

/// Print a restore report.
pub fn restore(report: &BatchReport<RestoreRow>, format: Format) -> anyhow::Result<()> {
    let mut rows: Vec<&RestoreRow> = report.rows.iter().collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));

    if format.json {
        return print_json(&rows);
    }
    print_table(restore_table(&rows), rows.is_empty());
    Ok(())
}

fn ingest_table(entries: &[BatchEntry]) -> Table {
    table(
        &["MESSAGE", "KEY", "OUTCOME"],
        entries
            .iter()
            .map(|entry| {
                let message = entry.message_id.clone().unwrap_or_default();
                match entry.result {
                    Ok(ref outcome) => {
                        let label = match outcome {
                            WriteOutcome::Recorded { approximate, .. } if *approximate => {
                                "recorded (approximate time)".to_string()
                            }
                            WriteOutcome::Recorded { .. } => "recorded".to_string(),
                            WriteOutcome::DeleteMarked { .. } => "delete marked".to_string(),
                            WriteOutcome::Skipped { reason, .. } => format!("skipped: {}", reason),
                        };
                        vec![message, outcome.key().to_string(), clip(&label)]
                    }
                    Err(ref failure) => vec![message, String::new(), clip(&failure.to_string())],
                }
            })
            .collect(),
    )
}

/// Print the results of an ingested batch.
pub fn ingest(entries: &[BatchEntry], format: Format) -> anyhow::Result<()> {
    if format.json {
        return print_json(entries);
    }
    print_table(ingest_table(entries), entries.is_empty());
    Ok(())
}

fn seed_table(report: &SeedReport) -> Table {
    let verb = if report.dry_run { "would record" } else { "recorded" };
    let mut rows: Vec<Vec<String>> = report
        .keys
        .iter()
        .map(|k| vec![k.clone(), verb.to_string()])
        .collect();
    rows.extend(
        report
            .failures
            .iter()
            .map(|(k, f)| vec![k.clone(), clip(&f.to_string())]),
    );
    table(&["KEY", "STATUS"], rows)
}

/// Print a seeding report.
pub fn seed(report: &SeedReport, format: Format) -> anyhow::Result<()> {
    if format.json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    print_table(
        seed_table(report),
        report.keys.is_empty() && report.failures.is_empty(),
    );
    if report.dry_run {
        eprintln!("Dry run: pass --do-it to write these versions");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rewind_core::{KeyFailure, RewindError, ValueType};

    const TABLE: Format = Format {
        json: false,
        show_secrets: false,
    };

    fn row(value_type: ValueType) -> PreviewRow {
        PreviewRow {
            key: "/k".into(),
            value: Some("hunter2".into()),
            value_type: Some(value_type),
            was_absent_at_time: false,
            change_timestamp: None,
            description: None,
            approximate: false,
            failure: None,
        }
    }

    fn absent(key: &str, deleted_at: Option<i64>) -> PreviewRow {
        PreviewRow {
            key: key.into(),
            value: None,
            value_type: None,
            was_absent_at_time: true,
            change_timestamp: deleted_at.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            description: None,
            approximate: false,
            failure: None,
        }
    }

    #[test]
    fn test_secure_strings_are_masked() {
        assert_eq!(TABLE.value(&row(ValueType::SecureString)), MASK);
        assert_eq!(TABLE.value(&row(ValueType::String)), "hunter2");

        let shown = Format {
            show_secrets: true,
            ..TABLE
        };
        assert_eq!(shown.value(&row(ValueType::SecureString)), "hunter2");
    }

    #[test]
    fn test_masked_secret_never_reaches_the_table() {
        let secret = row(ValueType::SecureString);
        let rendered = preview_table(&[&secret], TABLE).to_string();
        assert!(rendered.contains(MASK));
        assert!(!rendered.contains("hunter2"));

        let shown = Format {
            show_secrets: true,
            ..TABLE
        };
        let rendered = preview_table(&[&secret], shown).to_string();
        assert!(rendered.contains("hunter2"));
        assert!(!rendered.contains(MASK));
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("short"), "short");
        assert_eq!(clip(&"x".repeat(WIDTH)), "x".repeat(WIDTH));

        let long = "x".repeat(100);
        assert_eq!(clip(&long).chars().count(), WIDTH);
    }

    #[test]
    fn test_clip_multibyte_value() {
        let long = "é€".repeat(WIDTH);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), WIDTH);
        assert!(clipped.ends_with("..."));
        assert!(clipped.starts_with("é€é€"));
    }

    #[test]
    fn test_absent_rows_are_shown() {
        let deleted = absent("/gone", Some(1_659_561_000));
        let never = absent("/never", None);
        let rendered = preview_table(&[&deleted, &never], TABLE).to_string();

        assert!(rendered.contains("/gone"));
        assert!(rendered.contains("(deleted)"));
        assert!(rendered.contains("2022-08-03T21:10:00"));
        assert!(rendered.contains("/never"));
        assert!(rendered.contains("(absent)"));
    }

    #[test]
    fn test_failed_row_shows_failure() {
        let failed = PreviewRow::failed("/k", KeyFailure::from(&RewindError::store("disk full")));
        let rendered = preview_table(&[&failed], TABLE).to_string();
        assert!(rendered.contains("FAILED"));
        assert!(rendered.contains("disk full"));
    }

    #[test]
    fn test_restore_table_marks_skipped_keys() {
        let rows = [
            RestoreRow {
                key: "/a".into(),
                outcome: RestoreOutcome::SkippedAbsent,
            },
            RestoreRow {
                key: "/b".into(),
                outcome: RestoreOutcome::Restored {
                    value_type: ValueType::String,
                    change_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
                },
            },
        ];
        let rendered = restore_table(&rows.iter().collect::<Vec<_>>()).to_string();
        assert!(rendered.contains("skipped"));
        assert!(rendered.contains("restored"));
        assert!(rendered.contains("String from 1970-01-01T00:00:00"));
    }
}
