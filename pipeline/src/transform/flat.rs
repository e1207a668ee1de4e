//! Flat dimension extraction.
//!
//! Projects the source rows onto K attribute columns, deduplicates the
//! projections in first-occurrence order and joins the resulting ids back as a
//! single foreign key. Two nulls compare equal, so every source row matches
//! exactly one dimension row.

use std::collections::HashMap;

use crate::error::{DecomposeError, DecomposeResult};
use crate::models::{LookupDimension, LookupRow, Table};

use super::check_step_columns;

/// Output of [`extract_lookup`].
#[derive(Debug)]
pub struct LookupExtraction {
    pub dimension: LookupDimension,
    pub table: Table,
}

/// Extract a lookup dimension over `columns` and replace them with
/// `foreign_key`.
///
/// # Errors
/// Returns [`DecomposeError`] when a column is missing, listed twice, or the
/// key column already exists.
pub fn extract_lookup(
    mut table: Table,
    dimension: &str,
    columns: &[String],
    foreign_key: &str,
) -> DecomposeResult<LookupExtraction> {
    check_step_columns(&table, dimension, columns, &[foreign_key])?;

    let idx: Vec<usize> = columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    let mut ids = HashMap::new();
    let mut rows: Vec<LookupRow> = Vec::new();
    let mut keys: Vec<Option<u32>> = Vec::with_capacity(table.len());

    for row in table.rows() {
        let projected: Vec<_> = idx.iter().map(|&i| row[i].clone()).collect();
        let id = match ids.get(&projected) {
            Some(&id) => id,
            None => {
                let id = u32::try_from(rows.len() + 1)
                    .map_err(|_| DecomposeError::IdOverflow(dimension.to_string()))?;
                ids.insert(projected.clone(), id);
                rows.push(LookupRow { id, values: projected });
                id
            }
        };
        keys.push(Some(id));
    }

    table.replace_columns(columns, foreign_key, keys);

    Ok(LookupExtraction {
        dimension: LookupDimension {
            name: dimension.to_string(),
            columns: columns.to_vec(),
            rows,
        },
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_composite_key_dedup_in_first_occurrence_order() {
        let t = Table::from_rows(
            cols(&["country", "iso", "deaths"]),
            vec![
                vec!["Peru".into(), "PER".into(), Cell::Int(1)],
                vec!["Chile".into(), "CHL".into(), Cell::Int(2)],
                vec!["Peru".into(), "PER".into(), Cell::Int(3)],
                vec!["Peru".into(), Cell::Null, Cell::Int(4)],
            ],
        );
        let out = extract_lookup(t, "dim_locations", &cols(&["country", "iso"]), "location_id").unwrap();

        let dim = &out.dimension;
        assert_eq!(dim.rows.len(), 3);
        assert_eq!(dim.rows[0].values, vec![Cell::from("Peru"), Cell::from("PER")]);
        assert_eq!(dim.rows[1].values, vec![Cell::from("Chile"), Cell::from("CHL")]);
        assert_eq!(dim.rows[2].values, vec![Cell::from("Peru"), Cell::Null]);

        assert_eq!(out.table.columns(), &["location_id", "deaths"]);
        let keys: Vec<Cell> = out.table.rows().iter().map(|r| r[0].clone()).collect();
        assert_eq!(keys, vec![Cell::Int(1), Cell::Int(2), Cell::Int(1), Cell::Int(3)]);
    }

    #[test]
    fn test_null_equals_null_for_dedup() {
        let t = Table::from_rows(
            cols(&["appeal"]),
            vec![vec![Cell::Null], vec!["Yes".into()], vec![Cell::Null]],
        );
        let out = extract_lookup(t, "dim_appeals", &cols(&["appeal"]), "appeal_id").unwrap();
        assert_eq!(out.dimension.rows.len(), 2);
        assert_eq!(out.table.rows()[0][0], out.table.rows()[2][0]);
    }

    #[test]
    fn test_total_join_keeps_every_row() {
        let rows: Vec<Vec<Cell>> = (0..50)
            .map(|i| vec![Cell::Int(i % 7), Cell::Int(i)])
            .collect();
        let t = Table::from_rows(cols(&["scale", "value"]), rows);
        let out = extract_lookup(t, "dim_mag_scales", &cols(&["scale"]), "scale_id").unwrap();

        assert_eq!(out.table.len(), 50);
        assert_eq!(out.dimension.rows.len(), 7);
        for row in out.table.rows() {
            let id = row[0].as_i64().unwrap();
            let value = row[1].as_i64().unwrap();
            let dim_row = &out.dimension.rows[(id - 1) as usize];
            assert_eq!(dim_row.values[0], Cell::Int(value % 7));
        }
    }

    #[test]
    fn test_key_collision() {
        let t = Table::from_rows(cols(&["appeal", "appeal_id"]), vec![]);
        let err = extract_lookup(t, "dim_appeals", &cols(&["appeal"]), "appeal_id").unwrap_err();
        assert!(matches!(err, DecomposeError::ColumnCollision { .. }));
    }
}
