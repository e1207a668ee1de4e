//! Date range dimension.
//!
//! Builds one calendar row per day between the earliest and the latest date
//! found in a start and an end column, then swaps both columns for foreign
//! keys. A row whose start or end does not parse loses both keys and is
//! removed from the output table.

use chrono::NaiveDate;

use crate::error::{DecomposeError, DecomposeResult};
use crate::models::{Cell, DateDimension, DateRow, Table};

use super::check_step_columns;

/// Output of [`build_date_range`].
#[derive(Debug)]
pub struct DateExtraction {
    pub dimension: DateDimension,
    pub table: Table,
    /// Rows removed because a date did not parse.
    pub dropped_rows: usize,
}

/// Names of the columns a date range step reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct DateRangeColumns<'a> {
    pub start: &'a str,
    pub end: &'a str,
    pub start_key: &'a str,
    pub end_key: &'a str,
}

fn dates_of(table: &Table, idx: usize) -> Vec<Option<NaiveDate>> {
    table.column_cells(idx).map(|c| c.as_date()).collect()
}

/// Build the date dimension and replace the date columns with keys.
///
/// The range covers every parseable value of either column, including values
/// on rows that are later dropped. When `start` and `end` name the same
/// column the dimension is built from that column alone and both keys are
/// equal on every row.
///
/// # Errors
/// Returns [`DecomposeError`] when a date column is missing or a key column
/// collides with an existing one.
pub fn build_date_range(
    mut table: Table,
    dimension: &str,
    columns: DateRangeColumns<'_>,
) -> DecomposeResult<DateExtraction> {
    let same_column = columns.start == columns.end;
    let sources: Vec<String> = if same_column {
        vec![columns.start.to_string()]
    } else {
        vec![columns.start.to_string(), columns.end.to_string()]
    };
    check_step_columns(&table, dimension, &sources, &[columns.start_key, columns.end_key])?;

    let start_idx = table.column_index(columns.start).ok_or_else(|| missing(dimension, columns.start))?;
    let starts = dates_of(&table, start_idx);
    let ends = if same_column {
        starts.clone()
    } else {
        let end_idx = table.column_index(columns.end).ok_or_else(|| missing(dimension, columns.end))?;
        dates_of(&table, end_idx)
    };

    let known = starts.iter().chain(ends.iter()).flatten();
    let bounds = known.fold(None, |acc: Option<(NaiveDate, NaiveDate)>, &d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    });

    let rows = match bounds {
        None => Vec::new(),
        Some((first, last)) => {
            let days = u32::try_from((last - first).num_days() + 1)
                .map_err(|_| DecomposeError::IdOverflow(dimension.to_string()))?;
            first
                .iter_days()
                .take(days as usize)
                .zip(1u32..)
                .map(|(calendar_date, id)| DateRow { id, calendar_date })
                .collect()
        }
    };
    let calendar = DateDimension {
        name: dimension.to_string(),
        rows,
    };

    let key_of = |d: &Option<NaiveDate>| d.and_then(|d| calendar.id_of(d));
    let start_keys: Vec<Option<u32>> = starts.iter().map(key_of).collect();
    let end_keys: Vec<Option<u32>> = ends.iter().map(key_of).collect();
    let keep: Vec<bool> = start_keys
        .iter()
        .zip(&end_keys)
        .map(|(s, e)| s.is_some() && e.is_some())
        .collect();
    let dropped_rows = keep.iter().filter(|k| !**k).count();

    table.replace_columns(&sources, columns.start_key, start_keys);
    let at = table
        .column_index(columns.start_key)
        .map(|i| i + 1)
        .unwrap_or(table.columns().len());
    let end_cells: Vec<Cell> = end_keys.into_iter().map(|k| k.map(i64::from).into()).collect();
    table.insert_column(at, columns.end_key, end_cells);
    table.retain_rows(&keep);

    Ok(DateExtraction {
        dimension: calendar,
        table,
        dropped_rows,
    })
}

fn missing(step: &str, column: &str) -> DecomposeError {
    DecomposeError::MissingColumn {
        step: step.to_string(),
        column: column.to_string(),
    }
}
