//! Cleaning stage.
//!
//! Prepares a freshly parsed table for decomposition:
//!
//! 1. Normalise column names (`"Disaster Subgroup"` → `disaster_subgroup`)
//! 2. Drop unused columns
//! 3. Trim text, blank cells become null
//! 4. Compose dates from year/month/day parts
//! 5. Compute durations between two dates
//! 6. Coerce measure columns to numbers
//! 7. Remove exact duplicate rows
//!
//! Every step is driven by [`CleanOptions`] and counted in [`CleanReport`].

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CleanError, CleanResult};
use crate::logs::{log_info, log_info_indent, log_warning};
use crate::models::{Cell, Table};

// =============================================================================
// Options
// =============================================================================

/// Year/month/day columns composed into one date column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateParts {
    pub target: String,
    pub year: String,
    pub month: String,
    pub day: String,
}

impl DateParts {
    pub fn new(target: &str, year: &str, month: &str, day: &str) -> Self {
        Self {
            target: target.to_string(),
            year: year.to_string(),
            month: month.to_string(),
            day: day.to_string(),
        }
    }

    fn sources(&self) -> [&str; 3] {
        [&self.year, &self.month, &self.day]
    }
}

/// Whole days between two date columns, stored in `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub target: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanOptions {
    #[serde(default = "default_true")]
    pub normalize_names: bool,

    /// Columns to drop, matched after normalisation
    #[serde(default)]
    pub drop_columns: Vec<String>,

    #[serde(default = "default_true")]
    pub trim_text: bool,

    #[serde(default)]
    pub date_parts: Vec<DateParts>,

    /// Keep the year/month/day columns after composing dates
    #[serde(default)]
    pub keep_date_parts: bool,

    #[serde(default)]
    pub durations: Vec<Duration>,

    /// Columns coerced to integers or floats
    #[serde(default)]
    pub numeric_columns: Vec<String>,

    #[serde(default = "default_true")]
    pub drop_duplicates: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            normalize_names: true,
            drop_columns: Vec::new(),
            trim_text: true,
            date_parts: Vec::new(),
            keep_date_parts: false,
            durations: Vec::new(),
            numeric_columns: Vec::new(),
            drop_duplicates: true,
        }
    }
}

impl CleanOptions {
    /// Options for the EM-DAT disasters export.
    pub fn disaster_defaults() -> Self {
        Self {
            drop_columns: ["Local Time", "River Basin", "Admin1 Code", "Admin2 Code", "Geo Locations"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            date_parts: vec![
                DateParts::new("start_date", "start_year", "start_month", "start_day"),
                DateParts::new("end_date", "end_year", "end_month", "end_day"),
            ],
            durations: vec![Duration {
                target: "duration_days".to_string(),
                start: "start_date".to_string(),
                end: "end_date".to_string(),
            }],
            numeric_columns: [
                "year",
                "seq",
                "aid_contribution",
                "dis_mag_value",
                "total_deaths",
                "no_injured",
                "no_affected",
                "no_homeless",
                "total_affected",
                "insured_damages_000_us",
                "total_damages_000_us",
                "cpi",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub renamed_columns: usize,
    pub dropped_columns: Vec<String>,
    /// Configured drop columns that were not in the table
    pub absent_drop_columns: Vec<String>,
    pub blank_cells: usize,
    /// Dates that could not be composed from their parts
    pub invalid_dates: usize,
    pub coerced_cells: usize,
    pub invalid_numbers: usize,
    pub duplicate_rows: usize,
}

// =============================================================================
// Cleaning
// =============================================================================

static SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}]+").expect("separator pattern is a valid regex"));

/// Lower-case a column name and collapse every run of non-alphanumeric
/// characters into one underscore.
///
/// `"Insured Damages ('000 US$)"` becomes `insured_damages_000_us`.
pub fn normalize_column_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    SEPARATOR_RUNS.replace_all(&lower, "_").trim_matches('_').to_string()
}

/// Build a date from year, month and day cells.
pub fn combine_date(year: &Cell, month: &Cell, day: &Cell) -> Option<NaiveDate> {
    let year = i32::try_from(year.as_i64()?).ok()?;
    let month = u32::try_from(month.as_i64()?).ok()?;
    let day = u32::try_from(day.as_i64()?).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Run every cleaning step on `table`.
///
/// # Errors
/// Returns [`CleanError::DuplicateColumn`] when two names normalise to the
/// same column and [`CleanError::MissingColumn`] when a date or duration
/// needs a column the table only partly has.
pub fn clean(mut table: Table, options: &CleanOptions) -> CleanResult<(Table, CleanReport)> {
    let mut report = CleanReport {
        input_rows: table.len(),
        ..Default::default()
    };
    log_info(format!("Cleaning {} rows, {} columns", table.len(), table.columns().len()));

    if options.normalize_names {
        report.renamed_columns = normalize_names(&mut table)?;
        log_info_indent(format!("{} column names normalised", report.renamed_columns), 1);
    }

    drop_configured(&mut table, options, &mut report);

    if options.trim_text {
        report.blank_cells = trim_text(&mut table);
        log_info_indent(format!("{} blank cells set to null", report.blank_cells), 1);
    }

    for parts in &options.date_parts {
        compose_date(&mut table, parts, options.keep_date_parts, &mut report)?;
    }
    if report.invalid_dates > 0 {
        log_warning(format!("{} dates could not be composed and were set to null", report.invalid_dates));
    }

    for duration in &options.durations {
        add_duration(&mut table, duration)?;
    }

    coerce_numbers(&mut table, &options.numeric_columns, &mut report);
    if report.invalid_numbers > 0 {
        log_warning(format!("{} non-numeric measure values set to null", report.invalid_numbers));
    }

    if options.drop_duplicates {
        report.duplicate_rows = table.dedup_rows();
        if report.duplicate_rows > 0 {
            log_warning(format!("Removed {} duplicate rows", report.duplicate_rows));
        }
    }

    report.output_rows = table.len();
    log_info(format!("Cleaned table: {} rows, {} columns", table.len(), table.columns().len()));
    Ok((table, report))
}

fn normalize_names(table: &mut Table) -> CleanResult<usize> {
    let mut renamed = 0;
    table.rename_columns(|name| {
        let normalized = normalize_column_name(name);
        if normalized != name {
            renamed += 1;
        }
        normalized
    });

    let mut seen = HashSet::new();
    if let Some(dup) = table.columns().iter().find(|c| !seen.insert(c.as_str())) {
        return Err(CleanError::DuplicateColumn(dup.clone()));
    }
    Ok(renamed)
}

fn drop_configured(table: &mut Table, options: &CleanOptions, report: &mut CleanReport) {
    let wanted: Vec<String> = options
        .drop_columns
        .iter()
        .map(|c| if options.normalize_names { normalize_column_name(c) } else { c.clone() })
        .collect();

    let (present, absent): (Vec<String>, Vec<String>) = wanted.into_iter().partition(|c| table.has_column(c));
    table.drop_columns(&present);

    for column in &absent {
        log_warning(format!("Column '{}' not found, nothing to drop", column));
    }
    if !present.is_empty() {
        log_info_indent(format!("Dropped {}", present.join(", ")), 1);
    }
    report.dropped_columns = present;
    report.absent_drop_columns = absent;
}

fn trim_text(table: &mut Table) -> usize {
    let mut blanks = 0;
    for idx in 0..table.columns().len() {
        table.map_column(idx, |cell| {
            if let Cell::Text(s) = &*cell {
                let trimmed = Cell::from_text(s);
                if trimmed.is_null() {
                    blanks += 1;
                }
                *cell = trimmed;
            }
        });
    }
    blanks
}

fn compose_date(table: &mut Table, parts: &DateParts, keep_parts: bool, report: &mut CleanReport) -> CleanResult<()> {
    let sources = parts.sources();
    let present: Vec<&str> = sources.iter().copied().filter(|c| table.has_column(c)).collect();
    if present.is_empty() {
        log_warning(format!("No date parts for '{}', skipped", parts.target));
        return Ok(());
    }

    let idx = sources
        .iter()
        .map(|c| {
            table.column_index(c).ok_or_else(|| CleanError::MissingColumn {
                step: parts.target.clone(),
                column: c.to_string(),
            })
        })
        .collect::<CleanResult<Vec<usize>>>()?;
    if table.has_column(&parts.target) {
        return Err(CleanError::DuplicateColumn(parts.target.clone()));
    }

    let dates: Vec<Cell> = table
        .rows()
        .iter()
        .map(|row| combine_date(&row[idx[0]], &row[idx[1]], &row[idx[2]]).into())
        .collect();
    report.invalid_dates += dates.iter().filter(|d| d.is_null()).count();

    table.push_column(parts.target.clone(), dates);
    if !keep_parts {
        let names: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        table.drop_columns(&names);
    }
    log_info_indent(format!("Composed '{}'", parts.target), 1);
    Ok(())
}

fn add_duration(table: &mut Table, duration: &Duration) -> CleanResult<()> {
    let missing = |column: &str| CleanError::MissingColumn {
        step: duration.target.clone(),
        column: column.to_string(),
    };
    let start = table.column_index(&duration.start);
    let end = table.column_index(&duration.end);
    let (start, end) = match (start, end) {
        (None, None) => {
            log_warning(format!("No dates for '{}', skipped", duration.target));
            return Ok(());
        }
        (Some(s), Some(e)) => (s, e),
        (None, _) => return Err(missing(&duration.start)),
        (_, None) => return Err(missing(&duration.end)),
    };
    if table.has_column(&duration.target) {
        return Err(CleanError::DuplicateColumn(duration.target.clone()));
    }

    let days: Vec<Cell> = table
        .rows()
        .iter()
        .map(|row| match (row[start].as_date(), row[end].as_date()) {
            (Some(s), Some(e)) => Cell::Int((e - s).num_days()),
            _ => Cell::Null,
        })
        .collect();
    table.push_column(duration.target.clone(), days);
    Ok(())
}

fn coerce_numbers(table: &mut Table, columns: &[String], report: &mut CleanReport) {
    for column in columns {
        let Some(idx) = table.column_index(column) else {
            continue;
        };
        table.map_column(idx, |cell| {
            let Cell::Text(raw) = &*cell else {
                return;
            };
            let value = if raw.contains('.') {
                cell.as_f64().map(Cell::Float)
            } else {
                cell.as_i64().map(Cell::Int).or_else(|| cell.as_f64().map(Cell::Float))
            };
            match value {
                Some(v) => {
                    report.coerced_cells += 1;
                    *cell = v;
                }
                None => {
                    report.invalid_numbers += 1;
                    *cell = Cell::Null;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn day(y: i32, m: u32, d: u32) -> Cell {
        Cell::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("Disaster Subgroup"), "disaster_subgroup");
        assert_eq!(normalize_column_name("Insured Damages ('000 US$)"), "insured_damages_000_us");
        assert_eq!(normalize_column_name("  Dis No "), "dis_no");
        assert_eq!(normalize_column_name("CPI"), "cpi");
    }

    #[test]
    fn test_normalize_collapses_separator_runs() {
        assert_eq!(normalize_column_name("Start-Year / Month"), "start_year_month");
        assert_eq!(normalize_column_name("Région Côte"), "région_côte");
        assert_eq!(normalize_column_name("Admin1 Code"), "admin1_code");
    }

    #[test]
    fn test_combine_date() {
        assert_eq!(
            combine_date(&"2020".into(), &"1".into(), &"5".into()).map(Cell::Date),
            Some(day(2020, 1, 5))
        );
        assert_eq!(combine_date(&"2021".into(), &"2".into(), &"30".into()), None);
        assert_eq!(combine_date(&"2021".into(), &Cell::Null, &"3".into()), None);
    }

    #[test]
    fn test_disaster_cleaning() {
        let table = Table::from_rows(
            cols(&[
                "Disaster Group",
                "Start Year",
                "Start Month",
                "Start Day",
                "End Year",
                "End Month",
                "End Day",
                "Total Deaths",
                "Local Time",
            ]),
            vec![
                vec![
                    " Natural ".into(),
                    "2020".into(),
                    "1".into(),
                    "5".into(),
                    "2020".into(),
                    "1".into(),
                    "10".into(),
                    "1,204".into(),
                    "12:00".into(),
                ],
                vec![
                    "Natural".into(),
                    "2020".into(),
                    Cell::Null,
                    "1".into(),
                    "2020".into(),
                    "2".into(),
                    "3".into(),
                    "n/a".into(),
                    "  ".into(),
                ],
            ],
        );
        let (out, report) = clean(table, &CleanOptions::disaster_defaults()).unwrap();

        assert_eq!(
            out.columns(),
            &["disaster_group", "total_deaths", "start_date", "end_date", "duration_days"]
        );
        assert_eq!(out.get(0, "disaster_group"), Some(&Cell::from("Natural")));
        assert_eq!(out.get(0, "start_date"), Some(&day(2020, 1, 5)));
        assert_eq!(out.get(0, "duration_days"), Some(&Cell::Int(5)));
        assert_eq!(out.get(0, "total_deaths"), Some(&Cell::Int(1204)));
        assert!(out.get(1, "start_date").unwrap().is_null());
        assert!(out.get(1, "duration_days").unwrap().is_null());
        assert!(out.get(1, "total_deaths").unwrap().is_null());

        assert_eq!(report.dropped_columns, vec!["local_time"]);
        assert_eq!(report.absent_drop_columns.len(), 4);
        assert_eq!(report.invalid_dates, 1);
        assert_eq!(report.invalid_numbers, 1);
        assert_eq!(report.output_rows, 2);
    }

    #[test]
    fn test_duplicates_removed() {
        let table = Table::from_rows(
            cols(&["a", "b"]),
            vec![
                vec!["x".into(), "1".into()],
                vec!["x ".into(), "1".into()],
                vec!["y".into(), "1".into()],
            ],
        );
        let (out, report) = clean(table, &CleanOptions::default()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(report.duplicate_rows, 1);
    }

    #[test]
    fn test_names_colliding_after_normalisation() {
        let table = Table::new(cols(&["Event Name", "event_name"]));
        let err = clean(table, &CleanOptions::default()).unwrap_err();
        assert!(matches!(err, CleanError::DuplicateColumn(c) if c == "event_name"));
    }

    #[test]
    fn test_partial_date_parts_rejected() {
        let table = Table::new(cols(&["start_year", "start_month"]));
        let options = CleanOptions {
            date_parts: vec![DateParts::new("start_date", "start_year", "start_month", "start_day")],
            ..CleanOptions::default()
        };
        let err = clean(table, &options).unwrap_err();
        assert!(matches!(err, CleanError::MissingColumn { column, .. } if column == "start_day"));
    }

    #[test]
    fn test_keep_date_parts() {
        let table = Table::from_rows(
            cols(&["year", "month", "day"]),
            vec![vec!["2019".into(), "8".into(), "30".into()]],
        );
        let options = CleanOptions {
            date_parts: vec![DateParts::new("date", "year", "month", "day")],
            keep_date_parts: true,
            ..CleanOptions::default()
        };
        let (out, _) = clean(table, &options).unwrap();
        assert_eq!(out.columns(), &["year", "month", "day", "date"]);
    }

    #[test]
    fn test_float_measures() {
        let table = Table::from_rows(cols(&["cpi"]), vec![vec!["84.5".into()], vec!["100".into()]]);
        let options = CleanOptions {
            numeric_columns: cols(&["cpi"]),
            ..CleanOptions::default()
        };
        let (out, report) = clean(table, &options).unwrap();
        assert_eq!(out.get(0, "cpi"), Some(&Cell::Float(84.5)));
        assert_eq!(out.get(1, "cpi"), Some(&Cell::Int(100)));
        assert_eq!(report.coerced_cells, 2);
    }
}
