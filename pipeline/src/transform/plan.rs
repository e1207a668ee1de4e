//! Decomposition plan definition
//!
//! The plan lists, in order, every extraction the decomposition runs. It is
//! plain JSON so a dataset with a different layout only needs a new plan file.
//!
//! ```json
//! {
//!   "fact_table": "fact_disasters",
//!   "row_id_column": "disaster_id",
//!   "steps": [
//!     { "kind": "hierarchy", "dimension": "dim_disaster_groups",
//!       "levels": ["disaster_group", "disaster_subgroup"], "foreign_key": "group_id" },
//!     { "kind": "flat", "dimension": "dim_appeals",
//!       "columns": ["appeal"], "foreign_key": "appeal_id" },
//!     { "kind": "date_range", "dimension": "dim_dates",
//!       "start": "start_date", "end": "end_date",
//!       "start_key": "start_date_id", "end_key": "end_date_id" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{PlanError, PlanResult};
use crate::validation::validate_plan_document;

/// An ordered set of extraction steps plus the fact table naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionPlan {
    /// Version of the plan format
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Name of the residual fact table
    #[serde(default = "default_fact_table")]
    pub fact_table: String,

    /// Surrogate row id added before any extraction
    #[serde(default = "default_row_id_column")]
    pub row_id_column: String,

    /// Extraction steps, run in order
    pub steps: Vec<ExtractionStep>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_fact_table() -> String {
    "fact_table".to_string()
}

fn default_row_id_column() -> String {
    "row_id".to_string()
}

/// One extraction run by the decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionStep {
    /// N level columns, outermost first, into a parent-linked dimension.
    Hierarchy {
        dimension: String,
        levels: Vec<String>,
        foreign_key: String,
    },

    /// K attribute columns into a deduplicated lookup dimension.
    Flat {
        dimension: String,
        columns: Vec<String>,
        foreign_key: String,
    },

    /// Start/end date columns into a contiguous calendar dimension.
    DateRange {
        dimension: String,
        start: String,
        end: String,
        start_key: String,
        end_key: String,
    },
}

impl ExtractionStep {
    /// Dimension produced by this step.
    pub fn dimension(&self) -> &str {
        match self {
            ExtractionStep::Hierarchy { dimension, .. }
            | ExtractionStep::Flat { dimension, .. }
            | ExtractionStep::DateRange { dimension, .. } => dimension,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionStep::Hierarchy { .. } => "hierarchy",
            ExtractionStep::Flat { .. } => "flat",
            ExtractionStep::DateRange { .. } => "date_range",
        }
    }

    /// Position of this kind in the mandatory step order.
    fn rank(&self) -> u8 {
        match self {
            ExtractionStep::Hierarchy { .. } => 0,
            ExtractionStep::Flat { .. } => 1,
            ExtractionStep::DateRange { .. } => 2,
        }
    }

    /// Columns consumed by this step, in order, without repeats.
    pub fn source_columns(&self) -> Vec<String> {
        match self {
            ExtractionStep::Hierarchy { levels, .. } => levels.clone(),
            ExtractionStep::Flat { columns, .. } => columns.clone(),
            ExtractionStep::DateRange { start, end, .. } if start == end => vec![start.clone()],
            ExtractionStep::DateRange { start, end, .. } => vec![start.clone(), end.clone()],
        }
    }

    /// Key columns added to the fact table by this step.
    pub fn foreign_keys(&self) -> Vec<String> {
        match self {
            ExtractionStep::Hierarchy { foreign_key, .. } | ExtractionStep::Flat { foreign_key, .. } => {
                vec![foreign_key.clone()]
            }
            ExtractionStep::DateRange { start_key, end_key, .. } => vec![start_key.clone(), end_key.clone()],
        }
    }

    pub fn hierarchy(dimension: &str, levels: &[&str], foreign_key: &str) -> Self {
        ExtractionStep::Hierarchy {
            dimension: dimension.to_string(),
            levels: levels.iter().map(|s| s.to_string()).collect(),
            foreign_key: foreign_key.to_string(),
        }
    }

    pub fn flat(dimension: &str, columns: &[&str], foreign_key: &str) -> Self {
        ExtractionStep::Flat {
            dimension: dimension.to_string(),
            columns: columns.iter().map(|s| s.to_string()).collect(),
            foreign_key: foreign_key.to_string(),
        }
    }

    pub fn date_range(dimension: &str, start: &str, end: &str, start_key: &str, end_key: &str) -> Self {
        ExtractionStep::DateRange {
            dimension: dimension.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            start_key: start_key.to_string(),
            end_key: end_key.to_string(),
        }
    }
}

impl DecompositionPlan {
    /// Create an empty plan
    pub fn new(fact_table: &str, row_id_column: &str) -> Self {
        Self {
            version: default_version(),
            description: String::new(),
            fact_table: fact_table.to_string(),
            row_id_column: row_id_column.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: ExtractionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse a plan from a JSON string without schema validation
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse a plan from a JSON value
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Load a plan document: schema validation, parsing and [`Self::check`].
    ///
    /// # Errors
    /// Returns [`PlanError`] when the JSON is malformed, fails the plan
    /// schema or the steps are out of order.
    pub fn load(json: &str) -> PlanResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        validate_plan_document(&value).map_err(|errors| PlanError::SchemaError { errors })?;
        let plan = Self::from_value(&value)?;
        plan.check()?;
        Ok(plan)
    }

    /// Read and [`load`](Self::load) a plan file.
    ///
    /// # Errors
    /// Returns [`PlanError`] when the file cannot be read or loaded.
    pub fn load_file(path: &std::path::Path) -> PlanResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::load(&content)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check step order (hierarchies, then flat dimensions, then date
    /// ranges) and that every dimension name is unique and differs from the
    /// fact table name.
    ///
    /// # Errors
    /// Returns [`PlanError::StepOrder`] or [`PlanError::DuplicateDimension`].
    pub fn check(&self) -> PlanResult<()> {
        // The fact table shares the export namespace with the dimensions.
        let mut names = HashSet::from([self.fact_table.as_str()]);
        for (i, step) in self.steps.iter().enumerate() {
            if !names.insert(step.dimension()) {
                return Err(PlanError::DuplicateDimension(step.dimension().to_string()));
            }
            if let Some(previous) = self.steps[..i].iter().find(|p| p.rank() > step.rank()) {
                return Err(PlanError::StepOrder {
                    step: step.dimension().to_string(),
                    kind: step.kind().to_string(),
                    previous: previous.dimension().to_string(),
                });
            }
        }
        Ok(())
    }

    /// All source columns referenced by the plan, sorted and deduplicated
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.steps.iter().flat_map(|s| s.source_columns()).collect();
        columns.sort();
        columns.dedup();
        columns
    }

    /// Names of every dimension the plan produces, in step order
    pub fn dimension_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.dimension().to_string()).collect()
    }

    /// Validate that all source columns exist in the input headers
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

/// Built-in plan for the EM-DAT disasters dataset (normalised column names).
///
/// Hierarchies come first, most specific first (types, then groups, then
/// associated disasters), then the flat dimensions, then the date range.
pub fn disaster_plan() -> DecompositionPlan {
    DecompositionPlan {
        version: default_version(),
        description: "EM-DAT disasters into fact_disasters and its dimensions".to_string(),
        fact_table: "fact_disasters".to_string(),
        row_id_column: "disaster_id".to_string(),
        steps: vec![
            ExtractionStep::hierarchy(
                "dim_disaster_types",
                &["disaster_type", "disaster_subtype", "disaster_subsubtype"],
                "type_id",
            ),
            ExtractionStep::hierarchy("dim_disaster_groups", &["disaster_group", "disaster_subgroup"], "group_id"),
            ExtractionStep::hierarchy(
                "dim_associated_disasters",
                &["associated_dis", "associated_dis2"],
                "associated_dis_id",
            ),
            ExtractionStep::flat("dim_disaster_names", &["event_name"], "name_id"),
            ExtractionStep::flat(
                "dim_locations",
                &["country", "iso", "region", "continent", "location", "latitude", "longitude"],
                "location_id",
            ),
            ExtractionStep::flat("dim_disaster_origins", &["origin"], "origin_id"),
            ExtractionStep::flat("dim_ofda_responses", &["ofda_response"], "ofda_response_id"),
            ExtractionStep::flat("dim_appeals", &["appeal"], "appeal_id"),
            ExtractionStep::flat("dim_declarations", &["declaration"], "declaration_id"),
            ExtractionStep::flat("dim_mag_scales", &["dis_mag_scale"], "dis_mag_scale_id"),
            ExtractionStep::flat("dim_adm_levels", &["adm_level"], "adm_level_id"),
            ExtractionStep::date_range("dim_dates", "start_date", "end_date", "start_date_id", "end_date_id"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_serialization() {
        let plan = disaster_plan();
        let json = plan.to_json().unwrap();
        let parsed = DecompositionPlan::load(&json).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn test_step_json_shape() {
        let json = serde_json::to_value(ExtractionStep::flat("dim_appeals", &["appeal"], "appeal_id")).unwrap();
        assert_eq!(json["kind"], "flat");
        assert_eq!(json["columns"][0], "appeal");
    }

    #[test]
    fn test_defaults_applied() {
        let plan = DecompositionPlan::load(
            r#"{ "steps": [ { "kind": "flat", "dimension": "dim_a", "columns": ["a"], "foreign_key": "a_id" } ] }"#,
        )
        .unwrap();
        assert_eq!(plan.fact_table, "fact_table");
        assert_eq!(plan.row_id_column, "row_id");
        assert_eq!(plan.version, "1.0");
    }

    #[test]
    fn test_validate_headers() {
        let plan = DecompositionPlan::new("fact", "id")
            .with_step(ExtractionStep::hierarchy("dim_g", &["group", "subgroup"], "g_id"))
            .with_step(ExtractionStep::date_range("dim_dates", "day", "day", "s_id", "e_id"));
        let headers = vec!["group".to_string(), "subgroup".to_string(), "day".to_string()];
        assert!(plan.validate_headers(&headers).is_ok());

        let result = plan.validate_headers(&headers[..1]);
        assert_eq!(result.unwrap_err(), vec!["day".to_string(), "subgroup".to_string()]);
    }

    #[test]
    fn test_step_order_enforced() {
        let plan = DecompositionPlan::new("fact", "id")
            .with_step(ExtractionStep::flat("dim_a", &["a"], "a_id"))
            .with_step(ExtractionStep::hierarchy("dim_h", &["x", "y"], "h_id"));
        assert!(matches!(plan.check(), Err(PlanError::StepOrder { .. })));
    }

    #[test]
    fn test_duplicate_dimension_rejected() {
        let plan = DecompositionPlan::new("fact", "id")
            .with_step(ExtractionStep::flat("dim_a", &["a"], "a_id"))
            .with_step(ExtractionStep::flat("dim_a", &["b"], "b_id"));
        assert!(matches!(plan.check(), Err(PlanError::DuplicateDimension(_))));
    }

    #[test]
    fn test_dimension_named_like_fact_table_rejected() {
        let plan = DecompositionPlan::new("dim_a", "row_id").with_step(ExtractionStep::flat("dim_a", &["a"], "a_id"));
        assert!(matches!(plan.check(), Err(PlanError::DuplicateDimension(ref name)) if name == "dim_a"));
    }

    #[test]
    fn test_schema_rejects_unknown_kind() {
        let result = DecompositionPlan::load(
            r#"{ "steps": [ { "kind": "pivot", "dimension": "dim_a", "columns": ["a"], "foreign_key": "a_id" } ] }"#,
        );
        assert!(matches!(result, Err(PlanError::SchemaError { .. })));
    }

    #[test]
    fn test_disaster_plan_is_ordered() {
        let plan = disaster_plan();
        assert!(plan.check().is_ok());
        assert_eq!(plan.steps.first().map(|s| s.dimension()), Some("dim_disaster_types"));
        assert_eq!(plan.steps.last().map(|s| s.kind()), Some("date_range"));
    }
}
