//! JSON Schema validation for decomposition plans.
//!
//! Plan documents are checked against `schemas/decomposition-plan.json`
//! (JSON Schema Draft 7, embedded at compile time) before they are
//! deserialised, so a bad plan file reports every problem at once instead of
//! the first serde error.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use disaster_etl::validation::validate_plan_document;
//!
//! let plan = json!({
//!     "steps": [
//!         { "kind": "flat", "dimension": "dim_appeals", "columns": ["appeal"], "foreign_key": "appeal_id" }
//!     ]
//! });
//! assert!(validate_plan_document(&plan).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

/// Embedded plan schema, parsed once.
static PLAN_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/decomposition-plan.json"))
        .map_err(|e| format!("Invalid embedded plan schema: {}", e))
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every validation error otherwise
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use disaster_etl::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": {
///         "name": { "type": "string" }
///     }
/// });
///
/// assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
/// assert!(validate(&schema, &json!({ "age": 42 })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Same as [`validate`], true/false only.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// The embedded decomposition plan schema.
pub fn plan_schema() -> Result<&'static Value, String> {
    (*PLAN_SCHEMA).as_ref().map_err(Clone::clone)
}

/// Validate a plan document against the embedded plan schema.
pub fn validate_plan_document(data: &Value) -> Result<(), Vec<String>> {
    let schema = plan_schema().map_err(|e| vec![e])?;
    validate(schema, data)
}

/// Quick check against the plan schema.
pub fn is_valid_plan_document(data: &Value) -> bool {
    plan_schema().map(|schema| is_valid(schema, data)).unwrap_or(false)
}
