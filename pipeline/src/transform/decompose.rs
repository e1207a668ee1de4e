//! Decomposition orchestrator
//!
//! Runs a [`DecompositionPlan`] over one cleaned table. The working table is
//! moved through every extraction in turn; each step strips its source
//! columns and leaves its foreign keys behind. Whatever is left at the end is
//! the fact table.

use serde::Serialize;
use crate::error::{DecomposeError, DecomposeResult};
use crate::logs::{log_info, log_success_indent, log_warning};
use crate::models::{Cell, Dimension, Table};

use super::dates::{build_date_range, DateRangeColumns};
use super::flat::extract_lookup;
use super::hierarchy::{extract_hierarchy, ParentPolicy, ValueIds};
use super::plan::{DecompositionPlan, ExtractionStep};

/// What one extraction step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub dimension: String,
    pub kind: String,
    /// Rows in the produced dimension
    pub dimension_rows: usize,
    /// Hierarchy values seen under more than one parent
    pub ambiguous_parents: usize,
    /// Working rows removed by this step
    pub dropped_rows: usize,
}

/// Counters for a whole decomposition run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecompositionReport {
    pub input_rows: usize,
    pub fact_rows: usize,
    pub dropped_date_rows: usize,
    pub steps: Vec<StepReport>,
}

impl DecompositionReport {
    pub fn ambiguous_parents(&self) -> usize {
        self.steps.iter().map(|s| s.ambiguous_parents).sum()
    }
}

/// The fact table and every dimension produced by one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarehouseBundle {
    pub fact_name: String,
    pub fact: Table,
    pub dimensions: Vec<Dimension>,
    pub report: DecompositionReport,
}

impl WarehouseBundle {
    /// Look up a dimension by name.
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name() == name)
    }

    /// Every table in the bundle as `(name, table)`, fact table first.
    pub fn tables(&self) -> Vec<(String, Table)> {
        std::iter::once((self.fact_name.clone(), self.fact.clone()))
            .chain(self.dimensions.iter().map(|d| (d.name().to_string(), d.to_table())))
            .collect()
    }
}

/// Decompose `table` with the default last-write-wins parent policy.
///
/// # Errors
/// Returns [`DecomposeError`] on the first schema problem; nothing from a
/// failed run is returned.
pub fn decompose(table: Table, plan: &DecompositionPlan) -> DecomposeResult<WarehouseBundle> {
    decompose_with_policy(table, plan, ParentPolicy::default())
}

/// Decompose `table`, resolving hierarchy parents with `policy`.
///
/// The plan is checked first, so plans built in code get the same step
/// order and naming rules as plans loaded from JSON.
///
/// # Errors
/// Returns [`DecomposeError`] for a rejected plan or on the first schema
/// problem.
pub fn decompose_with_policy(
    table: Table,
    plan: &DecompositionPlan,
    policy: ParentPolicy,
) -> DecomposeResult<WarehouseBundle> {
    plan.check()?;

    let input_rows = table.len();
    log_info(format!(
        "Decomposing {} rows into '{}' with {} dimensions",
        input_rows,
        plan.fact_table,
        plan.steps.len()
    ));

    let mut working = with_row_ids(table, &plan.row_id_column)?;
    let mut dimensions = Vec::with_capacity(plan.steps.len());
    let mut report = DecompositionReport {
        input_rows,
        ..Default::default()
    };

    for step in &plan.steps {
        let rows_before = working.len();
        let (table, dimension, ambiguous_parents) = run_step(working, step, policy)?;
        working = table;

        let dropped_rows = rows_before - working.len();
        if ambiguous_parents > 0 {
            log_warning(format!(
                "{}: {} values found under more than one parent, parent taken from the first row",
                step.dimension(),
                ambiguous_parents
            ));
        }
        if dropped_rows > 0 {
            log_warning(format!(
                "{}: dropped {} rows with unresolvable dates",
                step.dimension(),
                dropped_rows
            ));
        }
        if matches!(step, ExtractionStep::DateRange { .. }) {
            report.dropped_date_rows += dropped_rows;
        }
        log_success_indent(format!("{} ({} rows)", step.dimension(), dimension.len()), 1);

        report.steps.push(StepReport {
            dimension: step.dimension().to_string(),
            kind: step.kind().to_string(),
            dimension_rows: dimension.len(),
            ambiguous_parents,
            dropped_rows,
        });
        dimensions.push(dimension);
    }

    report.fact_rows = working.len();
    log_info(format!(
        "Fact table '{}': {} rows, {} columns",
        plan.fact_table,
        working.len(),
        working.columns().len()
    ));

    Ok(WarehouseBundle {
        fact_name: plan.fact_table.clone(),
        fact: working,
        dimensions,
        report,
    })
}

/// Prepend a dense 1-based row id in current row order.
fn with_row_ids(mut table: Table, column: &str) -> DecomposeResult<Table> {
    if table.has_column(column) {
        return Err(DecomposeError::ColumnCollision {
            step: "row_id".to_string(),
            column: column.to_string(),
        });
    }
    let ids = (1..=table.len())
        .map(|i| i64::try_from(i).map(Cell::Int))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| DecomposeError::IdOverflow(column.to_string()))?;
    table.insert_column(0, column, ids);
    Ok(table)
}

fn run_step(
    table: Table,
    step: &ExtractionStep,
    policy: ParentPolicy,
) -> DecomposeResult<(Table, Dimension, usize)> {
    match step {
        ExtractionStep::Hierarchy {
            dimension,
            levels,
            foreign_key,
        } => {
            let out = extract_hierarchy(table, dimension, levels, foreign_key, ValueIds::with_policy(policy))?;
            let ambiguous = out.dimension.ambiguous_parents;
            Ok((out.table, Dimension::Hierarchy(out.dimension), ambiguous))
        }
        ExtractionStep::Flat {
            dimension,
            columns,
            foreign_key,
        } => {
            let out = extract_lookup(table, dimension, columns, foreign_key)?;
            Ok((out.table, Dimension::Lookup(out.dimension), 0))
        }
        ExtractionStep::DateRange {
            dimension,
            start,
            end,
            start_key,
            end_key,
        } => {
            let columns = DateRangeColumns {
                start,
                end,
                start_key,
                end_key,
            };
            let out = build_date_range(table, dimension, columns)?;
            Ok((out.table, Dimension::Date(out.dimension), 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateDimension, HierarchyDimension, LookupDimension};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn day(y: i32, m: u32, d: u32) -> Cell {
        Cell::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn example_plan() -> DecompositionPlan {
        DecompositionPlan::new("fact_disasters", "disaster_id")
            .with_step(ExtractionStep::hierarchy(
                "dim_disaster_groups",
                &["disaster_group", "disaster_subgroup"],
                "group_id",
            ))
            .with_step(ExtractionStep::flat("dim_appeals", &["appeal"], "appeal_id"))
            .with_step(ExtractionStep::date_range(
                "dim_dates",
                "start_date",
                "end_date",
                "start_date_id",
                "end_date_id",
            ))
    }

    fn example_table() -> Table {
        Table::from_rows(
            cols(&["disaster_group", "disaster_subgroup", "appeal", "start_date", "end_date", "total_deaths"]),
            vec![
                vec![
                    "Natural".into(),
                    "Geophysical".into(),
                    "No".into(),
                    day(2020, 1, 5),
                    day(2020, 1, 10),
                    Cell::Int(12),
                ],
                vec![
                    "Natural".into(),
                    "Hydrological".into(),
                    Cell::Null,
                    day(2020, 2, 1),
                    day(2020, 2, 3),
                    Cell::Int(3),
                ],
            ],
        )
    }

    fn hierarchy<'a>(bundle: &'a WarehouseBundle, name: &str) -> &'a HierarchyDimension {
        match bundle.dimension(name) {
            Some(Dimension::Hierarchy(d)) => d,
            other => panic!("expected hierarchy, got {other:?}"),
        }
    }

    fn lookup<'a>(bundle: &'a WarehouseBundle, name: &str) -> &'a LookupDimension {
        match bundle.dimension(name) {
            Some(Dimension::Lookup(d)) => d,
            other => panic!("expected lookup, got {other:?}"),
        }
    }

    fn dates<'a>(bundle: &'a WarehouseBundle, name: &str) -> &'a DateDimension {
        match bundle.dimension(name) {
            Some(Dimension::Date(d)) => d,
            other => panic!("expected dates, got {other:?}"),
        }
    }

    #[test]
    fn test_group_and_date_scenario() {
        let bundle = decompose(example_table(), &example_plan()).unwrap();

        let groups = hierarchy(&bundle, "dim_disaster_groups");
        let rows: Vec<(u32, &Cell, Option<u32>)> = groups.nodes.iter().map(|n| (n.id, &n.name, n.parent_id)).collect();
        assert_eq!(
            rows,
            vec![
                (1, &Cell::from("Natural"), None),
                (2, &Cell::from("Geophysical"), Some(1)),
                (3, &Cell::from("Hydrological"), Some(1)),
            ]
        );

        let calendar = dates(&bundle, "dim_dates");
        assert_eq!(calendar.rows.len(), 30);

        assert_eq!(
            bundle.fact.columns(),
            &["disaster_id", "group_id", "appeal_id", "start_date_id", "end_date_id", "total_deaths"]
        );
        assert_eq!(bundle.fact.get(0, "group_id"), Some(&Cell::Int(2)));
        assert_eq!(bundle.fact.get(1, "group_id"), Some(&Cell::Int(3)));
        assert_eq!(bundle.fact.get(1, "end_date_id"), Some(&Cell::Int(30)));
        assert_eq!(bundle.report.fact_rows, 2);
    }

    #[test]
    fn test_ids_dense_from_one() {
        let bundle = decompose(example_table(), &example_plan()).unwrap();
        for dimension in &bundle.dimensions {
            let ids = dimension.ids();
            let expected: Vec<u32> = (1..=ids.len() as u32).collect();
            assert_eq!(ids, expected, "{}", dimension.name());
        }
        let row_ids: Vec<&Cell> = bundle.fact.column_cells(0).collect();
        assert_eq!(row_ids, vec![&Cell::Int(1), &Cell::Int(2)]);
    }

    #[test]
    fn test_lookup_join_is_total() {
        let source = example_table();
        let appeals: Vec<Cell> = source.column_cells(2).cloned().collect();
        let bundle = decompose(source, &example_plan()).unwrap();

        let dim = lookup(&bundle, "dim_appeals");
        let by_id: HashMap<u32, &Vec<Cell>> = dim.rows.iter().map(|r| (r.id, &r.values)).collect();
        for (row, appeal) in appeals.iter().enumerate() {
            let key = bundle.fact.get(row, "appeal_id").and_then(Cell::as_i64).unwrap() as u32;
            assert_eq!(by_id[&key], &vec![appeal.clone()]);
        }
    }

    #[test]
    fn test_parent_links_point_one_level_up() {
        let plan = DecompositionPlan::new("fact", "row_id").with_step(ExtractionStep::hierarchy(
            "dim_disaster_types",
            &["disaster_type", "disaster_subtype", "disaster_subsubtype"],
            "type_id",
        ));
        let table = Table::from_rows(
            cols(&["disaster_type", "disaster_subtype", "disaster_subsubtype"]),
            vec![
                vec!["Storm".into(), "Tropical cyclone".into(), Cell::Null],
                vec!["Flood".into(), "Riverine flood".into(), Cell::Null],
                vec!["Storm".into(), "Convective storm".into(), "Tornado".into()],
            ],
        );
        let bundle = decompose(table, &plan).unwrap();
        let dim = hierarchy(&bundle, "dim_disaster_types");

        for node in &dim.nodes {
            match node.parent_id {
                None => assert!(node.level == 0 || node.name.is_null()),
                Some(parent) => assert_eq!(dim.node(parent).map(|p| p.level + 1), Some(node.level)),
            }
        }
        // the leaf reached on each row
        let leaf = bundle
            .fact
            .get(2, "type_id")
            .and_then(Cell::as_i64)
            .and_then(|id| dim.node(id as u32));
        assert_eq!(leaf.map(|n| &n.name), Some(&Cell::from("Tornado")));
    }

    #[test]
    fn test_rows_conserved_minus_bad_dates() {
        let mut table = example_table();
        table.push_row(vec![
            "Natural".into(),
            "Geophysical".into(),
            "Yes".into(),
            "not a date".into(),
            day(2020, 1, 7),
            Cell::Int(0),
        ]);
        let bundle = decompose(table, &example_plan()).unwrap();

        assert_eq!(bundle.report.input_rows, 3);
        assert_eq!(bundle.report.dropped_date_rows, 1);
        assert_eq!(bundle.report.fact_rows, 2);
        assert_eq!(bundle.fact.len(), bundle.report.input_rows - bundle.report.dropped_date_rows);
        // row ids keep the pre-extraction order
        let ids: Vec<&Cell> = bundle.fact.column_cells(0).collect();
        assert_eq!(ids, vec![&Cell::Int(1), &Cell::Int(2)]);
    }

    #[test]
    fn test_idempotent() {
        let first = decompose(example_table(), &example_plan()).unwrap();
        let second = decompose(example_table(), &example_plan()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_column_aborts_run() {
        let mut table = example_table();
        table.drop_columns(&cols(&["end_date"]));
        let err = decompose(table, &example_plan()).unwrap_err();
        assert_eq!(
            err,
            DecomposeError::MissingColumn {
                step: "dim_dates".into(),
                column: "end_date".into()
            }
        );
    }

    #[test]
    fn test_row_id_collision() {
        let plan = DecompositionPlan::new("fact", "total_deaths");
        let err = decompose(example_table(), &plan).unwrap_err();
        assert!(matches!(err, DecomposeError::ColumnCollision { .. }));
    }

    #[test]
    fn test_duplicate_dimension() {
        let plan = DecompositionPlan::new("fact", "row_id")
            .with_step(ExtractionStep::flat("dim_a", &["appeal"], "a_id"))
            .with_step(ExtractionStep::flat("dim_a", &["total_deaths"], "b_id"));
        let err = decompose(example_table(), &plan).unwrap_err();
        assert_eq!(err, DecomposeError::DuplicateDimension("dim_a".into()));
    }

    #[test]
    fn test_dimension_cannot_replace_fact_table() {
        let plan = DecompositionPlan::new("dim_a", "row_id").with_step(ExtractionStep::flat("dim_a", &["appeal"], "a_id"));
        let err = decompose(example_table(), &plan).unwrap_err();
        assert_eq!(err, DecomposeError::DuplicateDimension("dim_a".into()));
    }

    #[test]
    fn test_step_order_checked_for_plans_built_in_code() {
        let plan = DecompositionPlan::new("fact", "row_id")
            .with_step(ExtractionStep::flat("dim_appeals", &["appeal"], "appeal_id"))
            .with_step(ExtractionStep::hierarchy(
                "dim_disaster_groups",
                &["disaster_group", "disaster_subgroup"],
                "group_id",
            ));
        let err = decompose(example_table(), &plan).unwrap_err();
        assert_eq!(
            err,
            DecomposeError::StepOrder {
                step: "dim_disaster_groups".into(),
                kind: "hierarchy".into(),
                previous: "dim_appeals".into()
            }
        );
    }

    #[test]
    fn test_ambiguous_parents_reported() {
        let plan = DecompositionPlan::new("fact", "row_id").with_step(ExtractionStep::hierarchy(
            "dim_g",
            &["group", "subgroup"],
            "g_id",
        ));
        let table = Table::from_rows(
            cols(&["group", "subgroup"]),
            vec![
                vec!["Natural".into(), "Other".into()],
                vec!["Technological".into(), "Other".into()],
            ],
        );
        let bundle = decompose(table, &plan).unwrap();
        assert_eq!(bundle.report.ambiguous_parents(), 1);
        assert_eq!(bundle.report.steps[0].ambiguous_parents, 1);
    }

    #[test]
    fn test_tables_fact_first() {
        let bundle = decompose(example_table(), &example_plan()).unwrap();
        let names: Vec<String> = bundle.tables().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["fact_disasters", "dim_disaster_groups", "dim_appeals", "dim_dates"]);
    }
}
