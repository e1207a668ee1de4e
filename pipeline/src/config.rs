//! Environment configuration.
//!
//! `.env` is loaded by the binary before [`EtlConfig::from_env`] runs.
//!
//! | Variable                    | Default                |
//! |-----------------------------|------------------------|
//! | `DISASTER_ETL_REGISTRY_DIR` | `.disaster-etl/plans`  |
//! | `DISASTER_ETL_OUTPUT_DIR`   | `warehouse`            |
//! | `DISASTER_ETL_DROP_COLUMNS` | EM-DAT drop list       |

use std::path::PathBuf;

use crate::clean::CleanOptions;
use crate::registry::DEFAULT_REGISTRY_DIR;

pub const REGISTRY_DIR_VAR: &str = "DISASTER_ETL_REGISTRY_DIR";
pub const OUTPUT_DIR_VAR: &str = "DISASTER_ETL_OUTPUT_DIR";
pub const DROP_COLUMNS_VAR: &str = "DISASTER_ETL_DROP_COLUMNS";

const DEFAULT_OUTPUT_DIR: &str = "warehouse";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtlConfig {
    pub registry_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Comma-separated override of the cleaning drop list
    pub drop_columns: Option<Vec<String>>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            registry_dir: PathBuf::from(DEFAULT_REGISTRY_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            drop_columns: None,
        }
    }
}

impl EtlConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            registry_dir: get(REGISTRY_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.registry_dir),
            output_dir: get(OUTPUT_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.output_dir),
            drop_columns: get(DROP_COLUMNS_VAR).map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        }
    }

    /// EM-DAT cleaning options with the configured drop list applied.
    pub fn clean_options(&self) -> CleanOptions {
        let mut options = CleanOptions::disaster_defaults();
        if let Some(ref columns) = self.drop_columns {
            options.drop_columns = columns.clone();
        }
        options
    }
}
