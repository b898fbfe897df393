//! Migration session and configuration.
//!
//! A [`MigrationSession`] is constructed once per invocation and passed by
//! reference into the diff engine, ledger, and executor. There is no global
//! connection or configuration state, so multiple sessions can coexist in
//! one process (tests rely on this).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::SchemaAdapter;
use crate::error::Result;
use crate::schema::LiveSchema;

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "strata_migrations";

/// Configuration for one migration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Directory holding migration unit files.
    pub migrations_dir: PathBuf,
    /// Name of the ledger table.
    pub ledger_table: String,
    /// Schema to operate in, when not the connection default.
    pub schema: Option<String>,
    /// Whether the snapshot generator omits the AUTO_INCREMENT seed option.
    pub skip_auto_increment: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            schema: None,
            skip_auto_increment: false,
        }
    }
}

impl MigrationConfig {
    /// Creates a configuration rooted at the given migrations directory.
    #[must_use]
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            ..Self::default()
        }
    }

    /// Overrides the ledger table name.
    #[must_use]
    pub fn ledger_table(mut self, name: impl Into<String>) -> Self {
        self.ledger_table = name.into();
        self
    }

    /// Sets the target schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Makes the snapshot generator omit the AUTO_INCREMENT seed option.
    #[must_use]
    pub fn skip_auto_increment(mut self) -> Self {
        self.skip_auto_increment = true;
        self
    }
}

/// One migration invocation's worth of shared state: the adapter plus the
/// configuration.
pub struct MigrationSession {
    adapter: Arc<dyn SchemaAdapter>,
    config: MigrationConfig,
}

impl MigrationSession {
    /// Creates a session over the given adapter and configuration.
    #[must_use]
    pub fn new(adapter: Arc<dyn SchemaAdapter>, config: MigrationConfig) -> Self {
        Self { adapter, config }
    }

    /// Returns the schema adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn SchemaAdapter {
        self.adapter.as_ref()
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.config.migrations_dir
    }

    /// Introspects the live state of a table, or `None` when it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn introspect(&self, table: &str, schema: Option<&str>) -> Result<Option<LiveSchema>> {
        if !self.adapter.table_exists(table, schema).await? {
            return Ok(None);
        }
        Ok(Some(LiveSchema {
            columns: self.adapter.describe_columns(table, schema).await?,
            indexes: self.adapter.describe_indexes(table, schema).await?,
            references: self.adapter.describe_references(table, schema).await?,
        }))
    }
}
