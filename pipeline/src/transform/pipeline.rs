//! High-level pipeline API: CSV to warehouse bundle.
//!
//! Combines every stage: parsing, cleaning, plan resolution and
//! decomposition.
//!
//! # Example
//!
//! ```rust,ignore
//! use disaster_etl::pipeline::{run_file, PipelineOptions};
//! use std::path::Path;
//!
//! let output = run_file(Path::new("emdat.csv"), &PipelineOptions::default())?;
//! println!("{} fact rows", output.bundle.fact.len());
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::clean::{clean, CleanOptions, CleanReport};
use crate::error::{PipelineError, PipelineResult, PlanError};
use crate::logs::{log_info, log_success, log_warning, LogCapture, LogEntry};
use crate::models::Table;
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, ParseResult};
use crate::registry::{PlanRegistry, DEFAULT_REGISTRY_DIR};

use super::decompose::{decompose_with_policy, WarehouseBundle};
use super::hierarchy::ParentPolicy;
use super::plan::{disaster_plan, DecompositionPlan};

/// Options for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Use this plan file instead of the registry and built-in plan
    pub plan_path: Option<PathBuf>,

    /// Where stored plans live
    pub registry_dir: PathBuf,

    /// Don't look for stored plans
    pub no_cache: bool,

    pub clean: CleanOptions,

    pub parent_policy: ParentPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            plan_path: None,
            registry_dir: PathBuf::from(DEFAULT_REGISTRY_DIR),
            no_cache: false,
            clean: CleanOptions::disaster_defaults(),
            parent_policy: ParentPolicy::default(),
        }
    }
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub bundle: WarehouseBundle,
    pub clean_report: CleanReport,
    /// Absent when the run started from a table
    pub csv_info: Option<CsvInfo>,
    /// Plan that produced the bundle
    pub plan: DecompositionPlan,
    /// Stored plan id, if one was used
    pub template_id: Option<String>,
    /// Log entries emitted during the run
    pub log: Vec<LogEntry>,
}

/// Run the pipeline on a CSV file.
///
/// # Errors
/// Returns [`PipelineError`] from the first stage that fails.
pub fn run_file(path: &Path, options: &PipelineOptions) -> PipelineResult<PipelineOutput> {
    let capture = LogCapture::start();
    log_info(format!("📖 Reading {}", path.display()));
    let parsed = parse_csv_file_auto(path)?;
    run_parsed(parsed, options, capture)
}

/// Run the pipeline on raw CSV bytes.
///
/// # Errors
/// Returns [`PipelineError`] from the first stage that fails.
pub fn run_bytes(bytes: &[u8], options: &PipelineOptions) -> PipelineResult<PipelineOutput> {
    let capture = LogCapture::start();
    let parsed = parse_bytes_auto(bytes)?;
    run_parsed(parsed, options, capture)
}

/// Run clean and decompose on an already loaded table.
///
/// # Errors
/// Returns [`PipelineError`] from the first stage that fails.
pub fn run_table(table: Table, options: &PipelineOptions) -> PipelineResult<PipelineOutput> {
    let capture = LogCapture::start();
    run_stages(table, None, options, capture)
}

fn run_parsed(parsed: ParseResult, options: &PipelineOptions, capture: LogCapture) -> PipelineResult<PipelineOutput> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows, {} columns", parsed.table.len(), parsed.headers.len()));

    let csv_info = CsvInfo {
        encoding: parsed.encoding,
        delimiter: parsed.delimiter,
        headers: parsed.headers,
        row_count: parsed.table.len(),
    };
    run_stages(parsed.table, Some(csv_info), options, capture)
}

fn run_stages(
    table: Table,
    csv_info: Option<CsvInfo>,
    options: &PipelineOptions,
    mut capture: LogCapture,
) -> PipelineResult<PipelineOutput> {
    if table.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    log_info("🧹 Cleaning...");
    let (cleaned, clean_report) = clean(table, &options.clean)?;
    if cleaned.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    capture.drain();

    log_info("🗺️  Resolving plan...");
    let (plan, template_id) = resolve_plan(cleaned.columns(), options)?;
    capture.drain();

    log_info("⚙️  Decomposing...");
    let result = decompose_with_policy(cleaned, &plan, options.parent_policy);

    if let Some(ref id) = template_id {
        let mut registry = PlanRegistry::with_dir(&options.registry_dir);
        if let Err(e) = registry.update_stats(id, result.is_ok()) {
            log_warning(format!("Could not update stats for '{}': {}", id, e));
        }
    }
    let bundle = result?;

    log_success(format!(
        "✅ {} fact rows, {} dimensions",
        bundle.fact.len(),
        bundle.dimensions.len()
    ));

    Ok(PipelineOutput {
        bundle,
        clean_report,
        csv_info,
        plan,
        template_id,
        log: capture.finish(),
    })
}

/// Pick the plan for a cleaned table.
///
/// 1. The plan file given in the options
/// 2. The best compatible stored plan whose columns are all present
/// 3. The built-in disaster plan
fn resolve_plan(headers: &[String], options: &PipelineOptions) -> PipelineResult<(DecompositionPlan, Option<String>)> {
    if let Some(ref path) = options.plan_path {
        log_info(format!("Using plan file: {}", path.display()));
        let plan = DecompositionPlan::load_file(path)?;
        plan.validate_headers(headers).map_err(PlanError::MissingColumns)?;
        return Ok((plan, None));
    }

    if !options.no_cache {
        let mut registry = PlanRegistry::with_dir(&options.registry_dir);
        let candidates: Vec<(String, String, DecompositionPlan)> = registry
            .find_compatible(headers)
            .into_iter()
            .map(|(stored, _)| (stored.id.clone(), stored.name.clone(), stored.plan.clone()))
            .collect();

        if candidates.is_empty() {
            log_info("No compatible stored plans");
        }
        for (id, name, plan) in candidates {
            match plan.check().and_then(|_| plan.validate_headers(headers).map_err(PlanError::MissingColumns)) {
                Ok(()) => {
                    log_success(format!("Using stored plan \"{}\" ({})", name, id));
                    return Ok((plan, Some(id)));
                }
                Err(e) => {
                    log_warning(format!("Stored plan \"{}\" does not fit: {}", name, e));
                    if let Err(e) = registry.update_stats(&id, false) {
                        log_warning(format!("Could not update stats for '{}': {}", id, e));
                    }
                }
            }
        }
    }

    log_info("Using built-in disaster plan");
    let plan = disaster_plan();
    plan.validate_headers(headers).map_err(PlanError::MissingColumns)?;
    Ok((plan, None))
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        c => c.to_string(),
    }
}
