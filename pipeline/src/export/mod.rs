//! Bundle export.
//!
//! Writes every table of a [`WarehouseBundle`] as `<name>.csv` (header row =
//! column list, nulls as empty fields) plus a `manifest.json` describing the
//! run. This directory is what the load stage picks up.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::clean::CleanReport;
use crate::error::ExportResult;
use crate::logs::{log_success_indent, LogEntry};
use crate::models::Table;
use crate::transform::decompose::{DecompositionReport, WarehouseBundle};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One exported table in the manifest
#[derive(Debug, Clone, Serialize)]
pub struct TableEntry {
    pub name: String,
    pub file: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// Description of an exported run
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub run_id: String,
    pub created_at: String,
    pub fact_table: String,
    pub tables: Vec<TableEntry>,
    pub report: DecompositionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_report: Option<CleanReport>,
    pub log: Vec<LogEntry>,
}

/// Write one table as CSV.
pub fn write_table(table: &Table, path: &Path) -> ExportResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the bundle and its manifest into `dir`, creating it if needed.
///
/// Returns the manifest that was written.
pub fn export_bundle(
    bundle: &WarehouseBundle,
    clean_report: Option<&CleanReport>,
    log: &[LogEntry],
    dir: &Path,
) -> ExportResult<Manifest> {
    fs::create_dir_all(dir)?;

    let mut tables = Vec::new();
    for (name, table) in bundle.tables() {
        let file = format!("{}.csv", name);
        write_table(&table, &dir.join(&file))?;
        log_success_indent(format!("{} → {} ({} rows)", name, file, table.len()), 1);
        tables.push(TableEntry {
            name,
            file,
            columns: table.columns().to_vec(),
            rows: table.len(),
        });
    }

    let manifest = Manifest {
        run_id: uuid::Uuid::new_v4().to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        fact_table: bundle.fact_name.clone(),
        tables,
        report: bundle.report.clone(),
        clean_report: clean_report.cloned(),
        log: log.to_vec(),
    };
    fs::write(manifest_path(dir), serde_json::to_string_pretty(&manifest)?)?;

    Ok(manifest)
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;
    use crate::transform::decompose::decompose;
    use crate::transform::plan::{DecompositionPlan, ExtractionStep};
    use serde_json::Value;
    use tempfile::tempdir;

    fn bundle() -> WarehouseBundle {
        let table = Table::from_rows(
            vec!["status".into(), "name".into()],
            vec![vec!["TS".into(), "Ana".into()], vec![Cell::Null, "Bob, Jr".into()]],
        );
        let plan = DecompositionPlan::new("fact_storms", "storm_id")
            .with_step(ExtractionStep::flat("dim_status", &["status"], "status_id"));
        decompose(table, &plan).unwrap()
    }

    #[test]
    fn test_export_writes_tables_and_manifest() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("run");
        let manifest = export_bundle(&bundle(), None, &[LogEntry::info("hello")], &out).unwrap();

        assert_eq!(manifest.tables.len(), 2);
        assert_eq!(manifest.fact_table, "fact_storms");

        let fact = fs::read_to_string(out.join("fact_storms.csv")).unwrap();
        assert_eq!(fact, "storm_id,status_id,name\n1,1,Ana\n2,2,\"Bob, Jr\"\n");

        let dim = fs::read_to_string(out.join("dim_status.csv")).unwrap();
        assert_eq!(dim, "id,status\n1,TS\n2,\n");

        let json: Value = serde_json::from_str(&fs::read_to_string(manifest_path(&out)).unwrap()).unwrap();
        assert_eq!(json["tables"][1]["rows"], 2);
        assert_eq!(json["log"][0]["message"], "hello");
        assert_eq!(json["run_id"].as_str().map(str::len), Some(36));
        assert!(json.get("clean_report").is_none());
    }
}
