//! Run configuration loaded from TOML.
//!
//! ```toml
//! [factory]
//! preload = ["sys_language", "be_groups"]
//!
//! [features.skip_empty_tables]
//! enable = true
//!
//! [tables.tt_content]
//! sortby = "sorting"
//!
//! [tables.sys_category_record_mm]
//! compound_key = ["uid_local", "uid_foreign"]
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{errors::ContentSyncError, identifier::DEFAULT_COMPOUND_KEY};

/// Per-table schema facts the repository needs but does not own.
pub trait SchemaProvider {
    /// Default sort column for a table, if the table defines one.
    fn sorting_field(&self, table: &str) -> Option<String>;
    /// Columns a combined identifier of this table is split into, in order.
    fn compound_key_columns(&self, table: &str) -> Vec<String>;
    /// Tables small and static enough to be cached whole.
    fn preload_tables(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub factory: FactoryConfig,
    pub features: FeaturesConfig,
    pub tables: BTreeMap<String, TableConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    pub preload: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub skip_empty_tables: SkipEmptyTablesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipEmptyTablesConfig {
    pub enable: bool,
}

impl Default for SkipEmptyTablesConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Manual sorting column.
    pub sortby: Option<String>,
    /// Creation date column, used for ordering when there is no `sortby`.
    pub crdate: Option<String>,
    pub compound_key: Option<Vec<String>>,
}

impl SyncConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ContentSyncError> {
        let config: SyncConfig =
            toml::from_str(source).map_err(|e| ContentSyncError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ContentSyncError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| ContentSyncError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ContentSyncError> {
        if self.factory.preload.iter().any(|table| table.trim().is_empty()) {
            return Err(ContentSyncError::config(
                "factory.preload must not contain empty table names",
            ));
        }
        for (table, config) in &self.tables {
            if let Some(columns) = &config.compound_key {
                if columns.is_empty() || columns.iter().any(|c| c.trim().is_empty()) {
                    return Err(ContentSyncError::config(format!(
                        "tables.{table}.compound_key must list at least one column name"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn with_preload(mut self, tables: &[&str]) -> Self {
        self.factory.preload = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_table(mut self, table: &str, config: TableConfig) -> Self {
        self.tables.insert(table.to_string(), config);
        self
    }

    pub fn skip_empty_tables_enabled(&self) -> bool {
        self.features.skip_empty_tables.enable
    }
}

impl SchemaProvider for SyncConfig {
    fn sorting_field(&self, table: &str) -> Option<String> {
        let config = self.tables.get(table)?;
        config
            .sortby
            .as_ref()
            .filter(|column| !column.is_empty())
            .or(config.crdate.as_ref().filter(|column| !column.is_empty()))
            .cloned()
    }

    fn compound_key_columns(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .and_then(|config| config.compound_key.clone())
            .unwrap_or_else(|| DEFAULT_COMPOUND_KEY.iter().map(|c| c.to_string()).collect())
    }

    fn preload_tables(&self) -> Vec<String> {
        self.factory.preload.clone()
    }
}

impl<S> SchemaProvider for &S
where
    S: SchemaProvider + ?Sized,
{
    fn sorting_field(&self, table: &str) -> Option<String> {
        (*self).sorting_field(table)
    }

    fn compound_key_columns(&self, table: &str) -> Vec<String> {
        (*self).compound_key_columns(table)
    }

    fn preload_tables(&self) -> Vec<String> {
        (*self).preload_tables()
    }
}
