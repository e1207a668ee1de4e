//! Domain models for the disaster warehouse pipeline.
//!
//! This module contains the data structures that flow between stages:
//!
//! - [`Cell`] - A single scalar value (text, integer, float, date or null)
//! - [`Table`] - A rectangular table with an explicit column list
//! - [`dimension`] - Dimension tables produced by the decomposition
//!
//! A [`Table`] is always rectangular: every row holds exactly one cell per
//! column. Column removal and foreign-key insertion are expressed as one
//! schema transform ([`Table::replace_columns`]) so the output column list is
//! always `input - extracted + foreign key`.

pub mod dimension;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

pub use dimension::{DateDimension, DateRow, Dimension, HierarchyDimension, HierarchyNode, LookupDimension, LookupRow};

// =============================================================================
// Cell
// =============================================================================

/// A single scalar value in a [`Table`].
///
/// Equality and hashing treat two nulls as equal, which is what the flat
/// dimension extractor relies on for deduplication. Floats compare by bit
/// pattern.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// Missing value.
    Null,
    /// Free text.
    Text(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Calendar date (no time component).
    Date(NaiveDate),
}

/// Date layouts accepted when a text cell is read as a date.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Date-time layouts accepted when a text cell is read as a date. The time
/// part is truncated.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

impl Cell {
    /// Build a cell from raw text. Blank text becomes [`Cell::Null`].
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Null
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Borrow the text content, if this is a text cell.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read the cell as an integer.
    ///
    /// Integral floats and numeric text (thousands separators allowed) are
    /// accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Cell::Text(s) => {
                let cleaned = s.trim().replace(',', "");
                cleaned
                    .parse::<i64>()
                    .ok()
                    .or_else(|| cleaned.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            }
            _ => None,
        }
    }

    /// Read the cell as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Read the cell as a calendar date, truncating any time of day.
    ///
    /// Returns `None` for nulls, numbers and text that does not parse.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            Cell::Text(s) => parse_date(s),
            _ => None,
        }
    }
}

/// Parse a date or date-time string into a calendar day.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Null) => true,
            (Cell::Text(a), Cell::Text(b)) => a == b,
            (Cell::Int(a), Cell::Int(b)) => a == b,
            (Cell::Float(a), Cell::Float(b)) => a.to_bits() == b.to_bits(),
            (Cell::Date(a), Cell::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Cell::Null => {}
            Cell::Text(s) => s.hash(state),
            Cell::Int(i) => i.hash(state),
            Cell::Float(f) => f.to_bits().hash(state),
            Cell::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

// =============================================================================
// Table
// =============================================================================

/// A rectangular table: an explicit column list and rows of cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// Create a table from columns and rows. Rows are padded with nulls or
    /// truncated to the column count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Append a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Cell>>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// First column of `names` that this table lacks.
    pub fn first_missing<'a>(&self, names: &'a [String]) -> Option<&'a String> {
        names.iter().find(|n| !self.has_column(n))
    }

    /// Cell at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Iterate the cells of one column by position.
    pub fn column_cells(&self, idx: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |r| &r[idx])
    }

    /// Apply `f` to every cell of the column at `idx`.
    pub fn map_column<F: FnMut(&mut Cell)>(&mut self, idx: usize, mut f: F) {
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(idx) {
                f(cell);
            }
        }
    }

    /// Rename columns in place.
    pub fn rename_columns<F: FnMut(&str) -> String>(&mut self, mut f: F) {
        for col in &mut self.columns {
            *col = f(col);
        }
    }

    /// Insert a column at `at` (clamped to the end).
    pub fn insert_column(&mut self, at: usize, name: impl Into<String>, values: Vec<Cell>) {
        let at = at.min(self.columns.len());
        self.columns.insert(at, name.into());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.insert(at, values.next().unwrap_or(Cell::Null));
        }
    }

    /// Append a column at the end.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Cell>) {
        let at = self.columns.len();
        self.insert_column(at, name, values);
    }

    /// Remove the named columns. Unknown names are ignored.
    pub fn drop_columns(&mut self, names: &[String]) {
        let keep: Vec<bool> = self.columns.iter().map(|c| !names.contains(c)).collect();
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// Schema transform used by every extraction: remove `removed` and insert
    /// one foreign-key column where the first removed column used to be.
    ///
    /// `keys` holds one entry per row; `None` becomes a null cell.
    pub fn replace_columns(&mut self, removed: &[String], foreign_key: &str, keys: Vec<Option<u32>>) {
        let at = self
            .columns
            .iter()
            .position(|c| removed.contains(c))
            .unwrap_or(self.columns.len());
        self.drop_columns(removed);
        let cells = keys
            .into_iter()
            .map(|k| k.map(|id| Cell::Int(i64::from(id))).unwrap_or(Cell::Null))
            .collect();
        self.insert_column(at, foreign_key, cells);
    }

    /// Keep only rows whose flag is `true`.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        self.rows.retain(|_| *flags.next().unwrap_or(&true));
    }

    /// Remove exact duplicate rows, keeping the first occurrence.
    /// Returns the number of rows removed.
    pub fn dedup_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = std::collections::HashSet::new();
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_null_equals_null() {
        assert_eq!(Cell::Null, Cell::Null);
        assert_ne!(Cell::Null, Cell::from("x"));
        assert_ne!(Cell::Int(1), Cell::Float(1.0));
    }

    #[test]
    fn test_from_text_blank_is_null() {
        assert!(Cell::from_text("   ").is_null());
        assert_eq!(Cell::from_text(" Flood "), Cell::from("Flood"));
    }

    #[test]
    fn test_as_date_truncates_time() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 5).unwrap();
        assert_eq!(Cell::from("2020-01-05").as_date(), Some(d));
        assert_eq!(Cell::from("2020-01-05 13:45:00").as_date(), Some(d));
        assert_eq!(Cell::from("2020-01-05T23:59:59+02:00").as_date(), Some(d));
        assert_eq!(Cell::from("not a date").as_date(), None);
        assert_eq!(Cell::Int(20200105).as_date(), None);
    }

    #[test]
    fn test_as_i64_accepts_separators() {
        assert_eq!(Cell::from("1,234").as_i64(), Some(1234));
        assert_eq!(Cell::Float(3.0).as_i64(), Some(3));
        assert_eq!(Cell::Float(3.5).as_i64(), None);
    }

    #[test]
    fn test_push_row_keeps_table_rectangular() {
        let mut t = Table::new(cols(&["a", "b"]));
        t.push_row(vec![Cell::from("1")]);
        t.push_row(vec![Cell::from("1"), Cell::from("2"), Cell::from("3")]);
        assert!(t.rows().iter().all(|r| r.len() == 2));
        assert!(t.rows()[0][1].is_null());
    }

    #[test]
    fn test_replace_columns_puts_key_in_place() {
        let mut t = Table::from_rows(
            cols(&["id", "a", "b", "c", "measure"]),
            vec![vec![Cell::Int(1), "x".into(), "y".into(), "z".into(), Cell::Int(9)]],
        );
        t.replace_columns(&cols(&["b", "c"]), "bc_id", vec![Some(4)]);
        assert_eq!(t.columns(), &cols(&["id", "a", "bc_id", "measure"])[..]);
        assert_eq!(t.rows()[0], vec![Cell::Int(1), "x".into(), Cell::Int(4), Cell::Int(9)]);
    }

    #[test]
    fn test_replace_non_adjacent_columns() {
        let mut t = Table::from_rows(
            cols(&["a", "m", "b"]),
            vec![vec!["x".into(), Cell::Int(1), "y".into()]],
        );
        t.replace_columns(&cols(&["a", "b"]), "ab_id", vec![None]);
        assert_eq!(t.columns(), &cols(&["ab_id", "m"])[..]);
        assert!(t.rows()[0][0].is_null());
    }

    #[test]
    fn test_dedup_rows() {
        let mut t = Table::from_rows(
            cols(&["a"]),
            vec![vec!["x".into()], vec![Cell::Null], vec!["x".into()], vec![Cell::Null]],
        );
        assert_eq!(t.dedup_rows(), 2);
        assert_eq!(t.len(), 2);
    }
}
