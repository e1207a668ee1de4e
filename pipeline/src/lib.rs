//! # Disaster ETL - star schema decomposition for disaster event data
//!
//! Turns a raw disaster-events CSV (one row per recorded disaster, e.g. an
//! EM-DAT export) into a fact table plus dimension tables ready for a
//! warehouse load.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│    Clean    │────▶│  Decompose   │────▶│   Export    │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (names/dates│     │ (plan steps) │     │ (CSV + JSON)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use disaster_etl::{run_file, export_bundle, PipelineOptions};
//! use std::path::Path;
//!
//! let output = run_file(Path::new("emdat.csv"), &PipelineOptions::default())?;
//! export_bundle(&output.bundle, Some(&output.clean_report), &output.log, Path::new("warehouse"))?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, tables and dimensions
//! - [`logs`] - Log broadcaster and run transcripts
//! - [`config`] - Environment configuration
//! - [`parser`] - CSV parsing with auto-detection
//! - [`clean`] - Column normalisation, dates and type coercion
//! - [`transform`] - Extractors, plans, decomposition and pipeline
//! - [`validation`] - Plan schema validation
//! - [`registry`] - Stored plans
//! - [`export`] - Bundle export

// Core modules
pub mod error;
pub mod logs;
pub mod models;

// Configuration
pub mod config;

// Parsing and cleaning
pub mod clean;
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Stored plans
pub mod registry;

// Output
pub mod export;

pub use transform::pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CleanError, CsvError, DecomposeError, ExportError, PipelineError, PipelineResult, PlanError, RegistryError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Cell, DateDimension, DateRow, Dimension, HierarchyDimension, HierarchyNode, LookupDimension, LookupRow, Table,
};

// =============================================================================
// Re-exports - Logging
// =============================================================================

pub use logs::{LogCapture, LogEntry, LogLevel};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto, parse_str, ParseResult,
};

// =============================================================================
// Re-exports - Cleaning
// =============================================================================

pub use clean::{clean, normalize_column_name, CleanOptions, CleanReport, DateParts, Duration};

// =============================================================================
// Re-exports - Decomposition
// =============================================================================

pub use transform::{
    build_date_range, decompose, decompose_with_policy, disaster_plan, extract_hierarchy, extract_lookup,
    DateExtraction, DateRangeColumns, DecompositionPlan, DecompositionReport, ExtractionStep, HierarchyExtraction,
    LookupExtraction, ParentPolicy, StepReport, ValueIds, WarehouseBundle,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, is_valid_plan_document, validate, validate_plan_document};

// =============================================================================
// Re-exports - Registry
// =============================================================================

pub use registry::{PlanRegistry, StoredPlan};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{run_bytes, run_file, run_table, CsvInfo, PipelineOptions, PipelineOutput};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use config::EtlConfig;
pub use export::{export_bundle, write_table, Manifest, TableEntry};
