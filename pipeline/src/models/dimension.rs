//! Dimension tables produced by the decomposition.
//!
//! Every dimension has a dense surrogate id starting at 1 and converts to a
//! rectangular [`Table`] for export with the id column first, the attribute
//! columns next and `parent_id` last for hierarchies.

use chrono::NaiveDate;
use serde::Serialize;

use super::{Cell, Table};

/// A node of a hierarchy dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyNode {
    pub id: u32,
    pub name: Cell,
    /// Level of the column this node came from (0 = outermost).
    pub level: usize,
    pub parent_id: Option<u32>,
}

/// Parent-linked dimension built from N level columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyDimension {
    pub name: String,
    /// Source level columns, outermost first.
    pub levels: Vec<String>,
    pub nodes: Vec<HierarchyNode>,
    /// Level values whose rows disagreed on the parent value.
    pub ambiguous_parents: usize,
}

impl HierarchyDimension {
    pub fn node(&self, id: u32) -> Option<&HierarchyNode> {
        // Ids are dense from 1.
        self.nodes.get((id as usize).checked_sub(1)?)
    }

    pub fn to_table(&self) -> Table {
        let columns = vec!["id".to_string(), "name".to_string(), "parent_id".to_string()];
        let rows = self
            .nodes
            .iter()
            .map(|n| vec![Cell::Int(i64::from(n.id)), n.name.clone(), n.parent_id.map(i64::from).into()])
            .collect();
        Table::from_rows(columns, rows)
    }
}

/// A row of a flat lookup dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRow {
    pub id: u32,
    pub values: Vec<Cell>,
}

/// Deduplicated lookup dimension over K attribute columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupDimension {
    pub name: String,
    /// Attribute columns in their original order.
    pub columns: Vec<String>,
    pub rows: Vec<LookupRow>,
}

impl LookupDimension {
    pub fn to_table(&self) -> Table {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push("id".to_string());
        columns.extend(self.columns.iter().cloned());
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut row = Vec::with_capacity(r.values.len() + 1);
                row.push(Cell::Int(i64::from(r.id)));
                row.extend(r.values.iter().cloned());
                row
            })
            .collect();
        Table::from_rows(columns, rows)
    }
}

/// A day of the date dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRow {
    pub id: u32,
    pub calendar_date: NaiveDate,
}

/// Contiguous calendar dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateDimension {
    pub name: String,
    pub rows: Vec<DateRow>,
}

impl DateDimension {
    pub fn first_day(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.calendar_date)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.calendar_date)
    }

    /// Surrogate id of a day, if it falls inside the range.
    pub fn id_of(&self, day: NaiveDate) -> Option<u32> {
        let first = self.first_day()?;
        let offset = u32::try_from((day - first).num_days()).ok()?;
        let row = self.rows.get(offset as usize)?;
        (row.calendar_date == day).then_some(row.id)
    }

    pub fn to_table(&self) -> Table {
        let columns = vec!["id".to_string(), "calendar_date".to_string()];
        let rows = self
            .rows
            .iter()
            .map(|r| vec![Cell::Int(i64::from(r.id)), Cell::Date(r.calendar_date)])
            .collect();
        Table::from_rows(columns, rows)
    }
}

/// Any dimension in a warehouse bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dimension {
    Hierarchy(HierarchyDimension),
    Lookup(LookupDimension),
    Date(DateDimension),
}

impl Dimension {
    pub fn name(&self) -> &str {
        match self {
            Dimension::Hierarchy(d) => &d.name,
            Dimension::Lookup(d) => &d.name,
            Dimension::Date(d) => &d.name,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Dimension::Hierarchy(d) => d.nodes.len(),
            Dimension::Lookup(d) => d.rows.len(),
            Dimension::Date(d) => d.rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Surrogate ids in table order.
    pub fn ids(&self) -> Vec<u32> {
        match self {
            Dimension::Hierarchy(d) => d.nodes.iter().map(|n| n.id).collect(),
            Dimension::Lookup(d) => d.rows.iter().map(|r| r.id).collect(),
            Dimension::Date(d) => d.rows.iter().map(|r| r.id).collect(),
        }
    }

    pub fn to_table(&self) -> Table {
        match self {
            Dimension::Hierarchy(d) => d.to_table(),
            Dimension::Lookup(d) => d.to_table(),
            Dimension::Date(d) => d.to_table(),
        }
    }
}
