//! Hierarchy extraction.
//!
//! Turns N level columns (outermost first) into a parent-linked dimension and
//! one foreign-key column pointing at the deepest node each row reaches.
//!
//! ```text
//! disaster_group | disaster_subgroup        id | name         | parent_id
//! ---------------+------------------        ---+--------------+----------
//! Natural        | Geophysical        →      1 | Natural      |
//! Natural        | Hydrological              2 | Geophysical  | 1
//!                                            3 | Hydrological | 1
//! ```
//!
//! Parents are resolved through a [`ValueIds`] map keyed by value only, so a
//! value that appears under two different parents collapses to one node. Its
//! parent comes from the first row (in table order) holding that value; the
//! number of such disagreements is reported as `ambiguous_parents`.
//!
//! A null level value still takes a node at its first-occurrence position,
//! with a null name and parent. No row points at it, and it never enters the
//! value→id map, so ids stay aligned with a `unique()` scan of each level.

use std::collections::{HashMap, HashSet};

use crate::error::{DecomposeError, DecomposeResult};
use crate::models::{Cell, HierarchyDimension, HierarchyNode, Table};

use super::check_step_columns;

/// How the value→id map treats a value that is assigned a second id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentPolicy {
    /// A later assignment replaces the earlier one.
    #[default]
    LastWriteWins,
    /// The first assignment sticks.
    FirstWriteWins,
}

/// Value→id map used to resolve parents during a hierarchy extraction.
#[derive(Debug, Clone, Default)]
pub struct ValueIds {
    ids: HashMap<Cell, u32>,
    policy: ParentPolicy,
}

impl ValueIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ParentPolicy) -> Self {
        Self { ids: HashMap::new(), policy }
    }

    pub fn policy(&self) -> ParentPolicy {
        self.policy
    }

    pub fn get(&self, value: &Cell) -> Option<u32> {
        self.ids.get(value).copied()
    }

    /// Record `id` for `value` according to the policy.
    pub fn assign(&mut self, value: Cell, id: u32) {
        match self.policy {
            ParentPolicy::LastWriteWins => {
                self.ids.insert(value, id);
            }
            ParentPolicy::FirstWriteWins => {
                self.ids.entry(value).or_insert(id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Output of [`extract_hierarchy`].
#[derive(Debug)]
pub struct HierarchyExtraction {
    pub dimension: HierarchyDimension,
    pub table: Table,
    /// The map as it stands after the extraction.
    pub ids: ValueIds,
}

/// Distinct values of one level, null included, in first-occurrence order.
struct LevelValues<'a> {
    order: Vec<&'a Cell>,
    first_row: HashMap<&'a Cell, usize>,
    parents: HashMap<&'a Cell, HashSet<&'a Cell>>,
}

fn scan_level<'a>(rows: &'a [Vec<Cell>], col: usize, parent_col: Option<usize>) -> LevelValues<'a> {
    let mut values = LevelValues {
        order: Vec::new(),
        first_row: HashMap::new(),
        parents: HashMap::new(),
    };
    for (r, row) in rows.iter().enumerate() {
        let value = &row[col];
        if !values.first_row.contains_key(value) {
            values.first_row.insert(value, r);
            values.order.push(value);
        }
        if let Some(pc) = parent_col {
            values.parents.entry(value).or_default().insert(&row[pc]);
        }
    }
    values
}

/// Extract a hierarchy dimension from `levels` and replace them with
/// `foreign_key`.
///
/// Ids are assigned level by level, outermost first, in first-occurrence
/// order. A null level value gets a parentless node that no row references;
/// a row whose deeper levels are null keeps the id of the deepest non-null
/// level, and a row with every level null gets a null key.
///
/// # Errors
/// Returns [`DecomposeError`] when a level column is missing, listed twice,
/// or the key column already exists.
pub fn extract_hierarchy(
    mut table: Table,
    dimension: &str,
    levels: &[String],
    foreign_key: &str,
    mut ids: ValueIds,
) -> DecomposeResult<HierarchyExtraction> {
    check_step_columns(&table, dimension, levels, &[foreign_key])?;

    let level_cols: Vec<usize> = levels
        .iter()
        .filter_map(|l| table.column_index(l))
        .collect();

    let mut nodes: Vec<HierarchyNode> = Vec::new();
    let mut row_keys: Vec<Option<u32>> = vec![None; table.len()];
    let mut ambiguous_parents = 0usize;
    let mut next_id: u32 = 1;

    {
        let rows = table.rows();
        for (level, &col) in level_cols.iter().enumerate() {
            let parent_col = level.checked_sub(1).map(|p| level_cols[p]);
            let values = scan_level(rows, col, parent_col);
            let mut level_ids: HashMap<&Cell, u32> = HashMap::with_capacity(values.order.len());

            for value in values.order {
                let parent_id = match parent_col {
                    Some(pc) if !value.is_null() => {
                        if values.parents.get(value).is_some_and(|p| p.len() > 1) {
                            ambiguous_parents += 1;
                        }
                        let parent_value = &rows[values.first_row[value]][pc];
                        if parent_value.is_null() {
                            None
                        } else {
                            ids.get(parent_value)
                        }
                    }
                    _ => None,
                };

                let id = next_id;
                next_id = next_id
                    .checked_add(1)
                    .ok_or_else(|| DecomposeError::IdOverflow(dimension.to_string()))?;

                nodes.push(HierarchyNode {
                    id,
                    name: value.clone(),
                    level,
                    parent_id,
                });
                if !value.is_null() {
                    ids.assign(value.clone(), id);
                    level_ids.insert(value, id);
                }
            }

            for (key, row) in row_keys.iter_mut().zip(rows) {
                if let Some(&id) = level_ids.get(&row[col]) {
                    *key = Some(id);
                }
            }
        }
    }

    table.replace_columns(levels, foreign_key, row_keys);

    Ok(HierarchyExtraction {
        dimension: HierarchyDimension {
            name: dimension.to_string(),
            levels: levels.to_vec(),
            nodes,
            ambiguous_parents,
        },
        table,
        ids,
    })
}
