//! Schema adapter abstraction.
//!
//! The engine never talks to a database directly: introspection, DDL, and
//! the ledger's row operations all go through [`SchemaAdapter`]. Two
//! implementations ship with the crate — an in-memory adapter used as the
//! reference semantics and test double, and a SQLite adapter backed by
//! `sqlx`.

mod memory;
mod sqlite;

pub use memory::MemoryAdapter;
pub use sqlite::SqliteAdapter;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::operations::SchemaOp;
use crate::schema::{ColumnDescriptor, IndexDescriptor, ReferenceDescriptor, TableDefinition};

/// A single result row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// A conjunction of column/value equality clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<(String, Value)>,
}

impl Predicate {
    /// Creates an empty predicate, matching every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality clause.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((column.into(), value.into()));
        self
    }

    /// Returns whether the predicate has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the equality clauses.
    #[must_use]
    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// Evaluates the predicate against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

/// Database access surface consumed by the diff engine, ledger, and executor.
///
/// Implementations are expected to be used from a single logical task at a
/// time; the engine never issues concurrent calls against one adapter.
#[async_trait]
pub trait SchemaAdapter: Send + Sync {
    /// Returns the dialect name (e.g. `"sqlite"`, `"memory"`).
    fn dialect(&self) -> &'static str;

    // -- introspection ------------------------------------------------------

    /// Returns whether the table exists.
    async fn table_exists(&self, table: &str, schema: Option<&str>) -> Result<bool>;

    /// Lists the user tables visible in the schema.
    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<String>>;

    /// Describes the table's columns, in storage order.
    async fn describe_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnDescriptor>>;

    /// Describes the table's indexes, including the primary key.
    async fn describe_indexes(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<IndexDescriptor>>;

    /// Describes the table's foreign-key references.
    async fn describe_references(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ReferenceDescriptor>>;

    /// Returns the table's options (storage engine, collation, ...).
    async fn table_options(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<(String, String)>>;

    // -- DDL ----------------------------------------------------------------

    /// Creates a table with its columns, indexes, and references in one step.
    async fn create_table(&self, definition: &TableDefinition) -> Result<()>;

    /// Adds a column.
    async fn add_column(
        &self,
        table: &str,
        schema: Option<&str>,
        column: &ColumnDescriptor,
    ) -> Result<()>;

    /// Replaces a column's definition.
    async fn modify_column(
        &self,
        table: &str,
        schema: Option<&str>,
        column: &ColumnDescriptor,
    ) -> Result<()>;

    /// Drops a column.
    async fn drop_column(&self, table: &str, schema: Option<&str>, column: &str) -> Result<()>;

    /// Creates a secondary index.
    async fn add_index(
        &self,
        table: &str,
        schema: Option<&str>,
        index: &IndexDescriptor,
    ) -> Result<()>;

    /// Drops a secondary index.
    async fn drop_index(&self, table: &str, schema: Option<&str>, index: &str) -> Result<()>;

    /// Installs the primary key.
    async fn add_primary_key(
        &self,
        table: &str,
        schema: Option<&str>,
        index: &IndexDescriptor,
    ) -> Result<()>;

    /// Drops the primary key.
    async fn drop_primary_key(&self, table: &str, schema: Option<&str>) -> Result<()>;

    /// Adds a foreign-key constraint.
    async fn add_foreign_key(
        &self,
        table: &str,
        schema: Option<&str>,
        reference: &ReferenceDescriptor,
    ) -> Result<()>;

    /// Drops a foreign-key constraint.
    async fn drop_foreign_key(
        &self,
        table: &str,
        schema: Option<&str>,
        reference: &str,
    ) -> Result<()>;

    // -- data access --------------------------------------------------------

    /// Executes a raw statement, returning the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Runs a raw query and returns all rows.
    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>>;

    /// Runs a raw query and returns the first row, if any.
    async fn fetch_one(&self, sql: &str) -> Result<Option<Row>>;

    /// Selects rows matching the predicate. An empty column list selects all
    /// columns.
    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        predicate: &Predicate,
    ) -> Result<Vec<Row>>;

    /// Inserts one row given parallel column/value slices.
    async fn insert(&self, table: &str, columns: &[&str], values: &[Value]) -> Result<()>;

    /// Deletes rows matching the predicate, returning the deleted count.
    async fn delete(&self, table: &str, predicate: &Predicate) -> Result<u64>;

    // -- session toggles ----------------------------------------------------

    /// Enables or disables foreign-key enforcement for the session, where the
    /// dialect supports it. Migration runs disable enforcement because the
    /// diff phases may transiently violate referential integrity.
    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()>;

    /// Applies one structural operation by dispatching to the DDL verbs.
    async fn apply(&self, op: &SchemaOp) -> Result<()> {
        match op {
            SchemaOp::CreateTable { definition } => self.create_table(definition).await,
            SchemaOp::AddColumn {
                table,
                schema,
                column,
            } => self.add_column(table, schema.as_deref(), column).await,
            SchemaOp::ModifyColumn {
                table,
                schema,
                column,
            } => self.modify_column(table, schema.as_deref(), column).await,
            SchemaOp::DropColumn {
                table,
                schema,
                column_name,
            } => self.drop_column(table, schema.as_deref(), column_name).await,
            SchemaOp::AddIndex {
                table,
                schema,
                index,
            } => self.add_index(table, schema.as_deref(), index).await,
            SchemaOp::DropIndex {
                table,
                schema,
                index_name,
            } => self.drop_index(table, schema.as_deref(), index_name).await,
            SchemaOp::AddPrimaryKey {
                table,
                schema,
                index,
            } => self.add_primary_key(table, schema.as_deref(), index).await,
            SchemaOp::DropPrimaryKey { table, schema } => {
                self.drop_primary_key(table, schema.as_deref()).await
            }
            SchemaOp::AddForeignKey {
                table,
                schema,
                reference,
            } => {
                self.add_foreign_key(table, schema.as_deref(), reference)
                    .await
            }
            SchemaOp::DropForeignKey {
                table,
                schema,
                reference_name,
            } => {
                self.drop_foreign_key(table, schema.as_deref(), reference_name)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_matches() {
        let mut row = Row::new();
        row.insert("migration".to_string(), Value::from("2023_01_add_users"));
        row.insert("batch".to_string(), Value::from(3));

        assert!(Predicate::new().matches(&row));
        assert!(Predicate::new().eq("batch", 3).matches(&row));
        assert!(
            Predicate::new()
                .eq("batch", 3)
                .eq("migration", "2023_01_add_users")
                .matches(&row)
        );
        assert!(!Predicate::new().eq("batch", 4).matches(&row));
        assert!(!Predicate::new().eq("missing", 1).matches(&row));
    }
}
