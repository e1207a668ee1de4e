//! Transformation module.
//!
//! This module turns one cleaned wide table into a star schema:
//! - Plan: the ordered extraction steps (what to extract, from where)
//! - Hierarchy / Flat / Dates: the three extractors
//! - Decompose: runs a plan and bundles the fact and dimension tables
//! - Pipeline: CSV → clean → decompose, end to end

pub mod dates;
pub mod decompose;
pub mod flat;
pub mod hierarchy;
pub mod pipeline;
pub mod plan;

pub use dates::{build_date_range, DateExtraction, DateRangeColumns};
pub use decompose::{decompose, decompose_with_policy, DecompositionReport, StepReport, WarehouseBundle};
pub use flat::{extract_lookup, LookupExtraction};
pub use hierarchy::{extract_hierarchy, HierarchyExtraction, ParentPolicy, ValueIds};
pub use plan::{disaster_plan, DecompositionPlan, ExtractionStep};

use std::collections::HashSet;

use crate::error::{DecomposeError, DecomposeResult};
use crate::models::Table;

/// Check a step's source and output columns against the working table.
///
/// Sources must be non-empty, distinct and present. New columns must be
/// distinct and must not already exist unless the step is about to remove
/// them.
pub(crate) fn check_step_columns(
    table: &Table,
    step: &str,
    sources: &[String],
    new_columns: &[&str],
) -> DecomposeResult<()> {
    if sources.is_empty() {
        return Err(DecomposeError::EmptyStep(step.to_string()));
    }

    let mut seen = HashSet::new();
    for column in sources {
        if !seen.insert(column.as_str()) {
            return Err(DecomposeError::DuplicateColumn {
                step: step.to_string(),
                column: column.clone(),
            });
        }
    }

    if let Some(column) = table.first_missing(sources) {
        return Err(DecomposeError::MissingColumn {
            step: step.to_string(),
            column: column.clone(),
        });
    }

    let mut added = HashSet::new();
    for &column in new_columns {
        if !added.insert(column) {
            return Err(DecomposeError::DuplicateColumn {
                step: step.to_string(),
                column: column.to_string(),
            });
        }
        if table.has_column(column) && !seen.contains(column) {
            return Err(DecomposeError::ColumnCollision {
                step: step.to_string(),
                column: column.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str]) -> Table {
        Table::new(columns.iter().map(|s| s.to_string()).collect())
    }

    fn names(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_step() {
        let err = check_step_columns(&table(&["a"]), "dim", &[], &["k"]).unwrap_err();
        assert_eq!(err, DecomposeError::EmptyStep("dim".into()));
    }

    #[test]
    fn test_key_may_reuse_a_removed_column_name() {
        // "origin" is removed by the step, so the key may take its name
        assert!(check_step_columns(&table(&["origin"]), "dim", &names(&["origin"]), &["origin"]).is_ok());
    }

    #[test]
    fn test_duplicate_source_column() {
        let err = check_step_columns(&table(&["a"]), "dim", &names(&["a", "a"]), &["k"]).unwrap_err();
        assert!(matches!(err, DecomposeError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_duplicate_new_column() {
        let err = check_step_columns(&table(&["a", "b"]), "dim", &names(&["a", "b"]), &["k", "k"]).unwrap_err();
        assert!(matches!(err, DecomposeError::DuplicateColumn { .. }));
    }
}
