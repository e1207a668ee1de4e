//! Plan registry - store and reuse decomposition plans
//!
//! Saves plans to disk and matches them to an input file by its columns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};
use crate::logs::log_warning;
use crate::transform::plan::DecompositionPlan;

/// Directory where plans are stored (relative to current dir)
pub const DEFAULT_REGISTRY_DIR: &str = ".disaster-etl/plans";

/// Minimum share of a plan's columns the input must have.
const MIN_COMPATIBILITY: f64 = 0.5;

/// A stored plan with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// The decomposition plan
    pub plan: DecompositionPlan,
    /// Columns the plan reads
    pub source_columns: Vec<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last time this plan was used
    pub last_used: Option<String>,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Number of times used
    pub use_count: u32,
}

/// Registry of stored decomposition plans
pub struct PlanRegistry {
    registry_dir: PathBuf,
    plans: HashMap<String, StoredPlan>,
}

impl PlanRegistry {
    /// Open the registry in the default directory
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_REGISTRY_DIR)
    }

    /// Open a registry in a custom directory, loading existing plans
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: PathBuf::from(dir.as_ref()),
            plans: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    pub fn dir(&self) -> &Path {
        &self.registry_dir
    }

    /// Load all plans from the registry directory. Unreadable files are
    /// skipped with a warning.
    fn load_all(&mut self) {
        let Ok(entries) = fs::read_dir(&self.registry_dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let stored = fs::read_to_string(&path)
                .map_err(RegistryError::from)
                .and_then(|content| serde_json::from_str::<StoredPlan>(&content).map_err(RegistryError::from));
            match stored {
                Ok(stored) => {
                    self.plans.insert(stored.id.clone(), stored);
                }
                Err(e) => log_warning(format!("Skipping stored plan {}: {}", path.display(), e)),
            }
        }
    }

    /// All stored plans, oldest first
    pub fn list(&self) -> Vec<&StoredPlan> {
        let mut plans: Vec<&StoredPlan> = self.plans.values().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        plans
    }

    pub fn get(&self, id: &str) -> Option<&StoredPlan> {
        self.plans.get(id)
    }

    /// Stored plans that fit the given headers, best first.
    ///
    /// A plan fits when more than half of its source columns are present.
    /// Ranking is compatibility × success rate.
    pub fn find_compatible(&self, headers: &[String]) -> Vec<(&StoredPlan, f64)> {
        let mut compatible: Vec<_> = self
            .plans
            .values()
            .filter_map(|p| {
                let score = compatibility(&p.source_columns, headers);
                (score > MIN_COMPATIBILITY).then_some((p, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            let score_a = a.1 * a.0.success_rate;
            let score_b = b.1 * b.0.success_rate;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        compatible
    }

    /// Save a plan under `name` and return its id
    pub fn save(&mut self, plan: DecompositionPlan, name: &str) -> RegistryResult<String> {
        fs::create_dir_all(&self.registry_dir)?;

        let id = self.generate_id(name);
        let stored = StoredPlan {
            id: id.clone(),
            name: name.to_string(),
            source_columns: plan.source_columns(),
            plan,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };

        self.write(&stored)?;
        self.plans.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a plan file. The file name is used when no name is given.
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let plan = DecompositionPlan::load_file(path)?;

        let plan_name = name.unwrap_or_else(|| path.file_stem().and_then(|s| s.to_str()).unwrap_or("imported"));

        self.save(plan, plan_name)
    }

    /// Update statistics after using a plan
    pub fn update_stats(&mut self, id: &str, success: bool) -> RegistryResult<()> {
        let stored = self
            .plans
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        // Exponential moving average
        stored.success_rate = if success {
            stored.success_rate * 0.9 + 0.1
        } else {
            stored.success_rate * 0.9
        };
        stored.last_used = Some(chrono::Utc::now().to_rfc3339());
        stored.use_count += 1;

        let stored = stored.clone();
        self.write(&stored)
    }

    /// Delete a plan from the registry
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.plans.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_of(id))?;
        Ok(())
    }

    fn path_of(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredPlan) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_of(&stored.id), content)?;
        Ok(())
    }

    /// Slug of `name` plus a timestamp, made unique within the registry
    fn generate_id(&self, name: &str) -> String {
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        let timestamp = chrono::Utc::now().timestamp_millis();
        let base = format!("{}-{}", slug, timestamp);
        let mut id = base.clone();
        let mut n = 1;
        while self.plans.contains_key(&id) {
            n += 1;
            id = format!("{}-{}", base, n);
        }
        id
    }
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of `stored` columns present in `headers`, case-insensitive.
fn compatibility(stored: &[String], headers: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let lower: Vec<String> = headers.iter().map(|c| c.to_lowercase()).collect();
    let match_count = stored
        .iter()
        .filter(|col| lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / stored.len() as f64
}
