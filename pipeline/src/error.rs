//! Error types for the disaster warehouse pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - CSV reading and decoding errors
//! - [`CleanError`] - Cleaning stage errors
//! - [`DecomposeError`] - Dimensional decomposition errors (schema errors)
//! - [`PlanError`] - Decomposition plan errors
//! - [`RegistryError`] - Stored plan registry errors
//! - [`ExportError`] - Bundle export errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors during CSV parsing.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the content.
    #[error("Failed to decode content as {encoding}: {message}")]
    EncodingError { encoding: String, message: String },

    /// Invalid CSV format.
    #[error("Invalid CSV at line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        CsvError::ParseError {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Cleaning Errors
// =============================================================================

/// Errors during the cleaning stage.
#[derive(Debug, Error)]
pub enum CleanError {
    /// A column needed by a cleaning step is absent.
    #[error("Cleaning step '{step}' needs column '{column}'")]
    MissingColumn { step: String, column: String },

    /// Normalisation produced two columns with the same name.
    #[error("Column names collide after normalisation: '{0}'")]
    DuplicateColumn(String),
}

// =============================================================================
// Decomposition Errors
// =============================================================================

/// Errors during dimensional decomposition.
///
/// All of these are fatal: a run either completes every extraction or is
/// discarded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecomposeError {
    /// Required source column missing before an extraction step.
    #[error("Step '{step}' failed: missing source column '{column}'")]
    MissingColumn { step: String, column: String },

    /// A step lists the same source column twice.
    #[error("Step '{step}' lists column '{column}' more than once")]
    DuplicateColumn { step: String, column: String },

    /// A step has no source columns.
    #[error("Step '{0}' has no source columns")]
    EmptyStep(String),

    /// The new key column already exists in the working table.
    #[error("Step '{step}' cannot add column '{column}': it already exists")]
    ColumnCollision { step: String, column: String },

    /// Two steps produce a dimension with the same name, or a dimension
    /// takes the fact table's name.
    #[error("Dimension '{0}' is produced more than once")]
    DuplicateDimension(String),

    /// Steps are not ordered hierarchy → flat → date range.
    #[error("Step '{step}' ({kind}) must come before '{previous}'")]
    StepOrder { step: String, kind: String, previous: String },

    /// The plan was rejected for any other reason.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// More distinct values than surrogate ids can address.
    #[error("Step '{0}' exhausted the surrogate id space")]
    IdOverflow(String),
}

// =============================================================================
// Plan Errors
// =============================================================================

/// Errors loading or checking a decomposition plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The document is not valid JSON or not a plan.
    #[error("Invalid plan JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The document fails the embedded plan schema.
    #[error("Plan failed schema validation: {errors:?}")]
    SchemaError { errors: Vec<String> },

    /// The plan references columns absent from the input.
    #[error("Plan references missing columns: {0:?}")]
    MissingColumns(Vec<String>),

    /// Steps are not ordered hierarchy → flat → date range.
    #[error("Step '{step}' ({kind}) must come before '{previous}'")]
    StepOrder { step: String, kind: String, previous: String },

    /// Two steps produce the same dimension, or one reuses the fact table name.
    #[error("Dimension '{0}' is declared more than once")]
    DuplicateDimension(String),

    /// Failed to read the plan file.
    #[error("Failed to read plan: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<PlanError> for DecomposeError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::StepOrder { step, kind, previous } => DecomposeError::StepOrder { step, kind, previous },
            PlanError::DuplicateDimension(name) => DecomposeError::DuplicateDimension(name),
            other => DecomposeError::InvalidPlan(other.to_string()),
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the stored plan registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Plan not found.
    #[error("Stored plan not found: {0}")]
    NotFound(String),

    /// The imported document is not a usable plan.
    #[error("Invalid stored plan: {0}")]
    InvalidPlan(#[from] PlanError),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing a bundle to disk.
#[derive(Debug, Error)]
pub enum ExportError {
    /// IO error.
    #[error("Export IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV writer error.
    #[error("Export CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Manifest serialisation error.
    #[error("Export JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::pipeline::run_file`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Cleaning error.
    #[error("Clean error: {0}")]
    Clean(#[from] CleanError),

    /// Decomposition error.
    #[error("Decomposition error: {0}")]
    Decompose(#[from] DecomposeError),

    /// Plan error.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// No rows to decompose.
    #[error("No rows to decompose")]
    EmptyInput,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for cleaning operations.
pub type CleanResult<T> = Result<T, CleanError>;

/// Result type for decomposition operations.
pub type DecomposeResult<T> = Result<T, DecomposeError>;

/// Result type for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> PipelineError
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // DecomposeError -> PipelineError
        let err = DecomposeError::MissingColumn {
            step: "dim_disaster_types".into(),
            column: "disaster_subtype".into(),
        };
        let pipeline_err: PipelineError = err.into();
        assert!(pipeline_err.to_string().contains("disaster_subtype"));
    }

    #[test]
    fn test_schema_error_names_step_and_column() {
        let err = DecomposeError::MissingColumn {
            step: "dim_dates".into(),
            column: "end_date".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dim_dates"));
        assert!(msg.contains("end_date"));
    }
}
