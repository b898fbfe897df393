//! In-memory schema adapter.
//!
//! Holds table definitions and rows in process memory. This adapter is the
//! reference implementation of the DDL semantics (every verb is supported)
//! and the fixture most tests run against: introspection returns exactly
//! the descriptors that DDL installed, so a snapshot taken from it
//! re-reconciles to zero operations.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{MigrateError, Result};
use crate::schema::{
    ColumnDescriptor, ColumnPosition, IndexDescriptor, ReferenceDescriptor, TableDefinition,
    PRIMARY_KEY_NAME,
};

use super::{Predicate, Row, SchemaAdapter};

#[derive(Debug, Default)]
struct MemoryState {
    tables: Vec<TableDefinition>,
    rows: Vec<(String, Vec<Row>)>,
    executed: Vec<String>,
    fk_toggles: Vec<bool>,
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&TableDefinition> {
        self.tables
            .iter()
            .find(|t| t.table_name == name)
            .ok_or_else(|| MigrateError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableDefinition> {
        self.tables
            .iter_mut()
            .find(|t| t.table_name == name)
            .ok_or_else(|| MigrateError::TableNotFound(name.to_string()))
    }

    fn rows_mut(&mut self, table: &str) -> &mut Vec<Row> {
        if let Some(i) = self.rows.iter().position(|(name, _)| name == table) {
            return &mut self.rows[i].1;
        }
        self.rows.push((table.to_string(), Vec::new()));
        let last = self.rows.len() - 1;
        &mut self.rows[last].1
    }
}

/// Schema adapter over in-process state.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    inner: Mutex<MemoryState>,
}

impl MemoryAdapter {
    /// Creates an empty in-memory adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw statements passed to [`SchemaAdapter::execute`].
    #[must_use]
    pub fn executed_statements(&self) -> Vec<String> {
        self.inner.lock().expect("adapter state").executed.clone()
    }

    /// Returns the history of foreign-key-check toggles, oldest first.
    #[must_use]
    pub fn foreign_key_toggles(&self) -> Vec<bool> {
        self.inner.lock().expect("adapter state").fk_toggles.clone()
    }

    /// Returns a copy of the stored rows of a table.
    #[must_use]
    pub fn stored_rows(&self, table: &str) -> Vec<Row> {
        let state = self.inner.lock().expect("adapter state");
        state
            .rows
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SchemaAdapter for MemoryAdapter {
    fn dialect(&self) -> &'static str {
        "memory"
    }

    async fn table_exists(&self, table: &str, _schema: Option<&str>) -> Result<bool> {
        let state = self.inner.lock().expect("adapter state");
        Ok(state.tables.iter().any(|t| t.table_name == table))
    }

    async fn list_tables(&self, _schema: Option<&str>) -> Result<Vec<String>> {
        let state = self.inner.lock().expect("adapter state");
        let mut names: Vec<String> =
            state.tables.iter().map(|t| t.table_name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn describe_columns(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ColumnDescriptor>> {
        let state = self.inner.lock().expect("adapter state");
        Ok(state.table(table)?.columns.clone())
    }

    async fn describe_indexes(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<IndexDescriptor>> {
        let state = self.inner.lock().expect("adapter state");
        Ok(state.table(table)?.indexes.clone())
    }

    async fn describe_references(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ReferenceDescriptor>> {
        let state = self.inner.lock().expect("adapter state");
        Ok(state.table(table)?.references.clone())
    }

    async fn table_options(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<(String, String)>> {
        let state = self.inner.lock().expect("adapter state");
        Ok(state.table(table)?.options.clone())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        definition.validate()?;
        let mut state = self.inner.lock().expect("adapter state");
        if state
            .tables
            .iter()
            .any(|t| t.table_name == definition.table_name)
        {
            return Err(MigrateError::InvalidState(format!(
                "Table '{}' already exists",
                definition.table_name
            )));
        }
        state.tables.push(definition.clone());
        Ok(())
    }

    async fn add_column(
        &self,
        table: &str,
        _schema: Option<&str>,
        column: &ColumnDescriptor,
    ) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        let t = state.table_mut(table)?;
        if t.get_column(&column.name).is_some() {
            return Err(MigrateError::InvalidState(format!(
                "Column '{}' already exists in table '{}'",
                column.name, table
            )));
        }
        let at = match &column.position {
            Some(ColumnPosition::First) => 0,
            Some(ColumnPosition::After(prev)) => t
                .columns
                .iter()
                .position(|c| &c.name == prev)
                .map_or(t.columns.len(), |i| i + 1),
            None => t.columns.len(),
        };
        t.columns.insert(at, column.clone());
        Ok(())
    }

    async fn modify_column(
        &self,
        table: &str,
        _schema: Option<&str>,
        column: &ColumnDescriptor,
    ) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        let t = state.table_mut(table)?;
        let i = t
            .columns
            .iter()
            .position(|c| c.name == column.name)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Column '{}' does not exist in table '{}'",
                    column.name, table
                ))
            })?;
        // Keep the stored position so modification does not reorder columns.
        let position = t.columns[i].position.clone();
        t.columns[i] = ColumnDescriptor {
            position,
            ..column.clone()
        };
        Ok(())
    }

    async fn drop_column(&self, table: &str, _schema: Option<&str>, column: &str) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        let t = state.table_mut(table)?;
        let i = t
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Column '{}' does not exist in table '{}'",
                    column, table
                ))
            })?;
        t.columns.remove(i);
        Ok(())
    }

    async fn add_index(
        &self,
        table: &str,
        _schema: Option<&str>,
        index: &IndexDescriptor,
    ) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        let t = state.table_mut(table)?;
        if t.get_index(&index.name).is_some() {
            return Err(MigrateError::InvalidState(format!(
                "Index '{}' already exists on table '{}'",
                index.name, table
            )));
        }
        t.indexes.push(index.clone());
        Ok(())
    }

    async fn drop_index(&self, table: &str, _schema: Option<&str>, index: &str) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        let t = state.table_mut(table)?;
        let i = t
            .indexes
            .iter()
            .position(|x| x.name == index)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Index '{}' does not exist on table '{}'",
                    index, table
                ))
            })?;
        t.indexes.remove(i);
        Ok(())
    }

    async fn add_primary_key(
        &self,
        table: &str,
        schema: Option<&str>,
        index: &IndexDescriptor,
    ) -> Result<()> {
        self.add_index(table, schema, index).await
    }

    async fn drop_primary_key(&self, table: &str, schema: Option<&str>) -> Result<()> {
        self.drop_index(table, schema, PRIMARY_KEY_NAME).await
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        _schema: Option<&str>,
        reference: &ReferenceDescriptor,
    ) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        let t = state.table_mut(table)?;
        if t.get_reference(&reference.name).is_some() {
            return Err(MigrateError::InvalidState(format!(
                "Foreign key '{}' already exists on table '{}'",
                reference.name, table
            )));
        }
        t.references.push(reference.clone());
        Ok(())
    }

    async fn drop_foreign_key(
        &self,
        table: &str,
        _schema: Option<&str>,
        reference: &str,
    ) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        let t = state.table_mut(table)?;
        let i = t
            .references
            .iter()
            .position(|r| r.name == reference)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Foreign key '{}' does not exist on table '{}'",
                    reference, table
                ))
            })?;
        t.references.remove(i);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut state = self.inner.lock().expect("adapter state");
        state.executed.push(sql.to_string());
        Ok(0)
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>> {
        // Not a SQL engine; raw queries are recorded and return nothing.
        let mut state = self.inner.lock().expect("adapter state");
        state.executed.push(sql.to_string());
        Ok(Vec::new())
    }

    async fn fetch_one(&self, sql: &str) -> Result<Option<Row>> {
        Ok(self.fetch_all(sql).await?.into_iter().next())
    }

    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        predicate: &Predicate,
    ) -> Result<Vec<Row>> {
        let state = self.inner.lock().expect("adapter state");
        let rows = state
            .rows
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or_default();

        Ok(rows
            .iter()
            .filter(|row| predicate.matches(row))
            .map(|row| {
                if columns.is_empty() {
                    row.clone()
                } else {
                    row.iter()
                        .filter(|(name, _)| columns.contains(&name.as_str()))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                }
            })
            .collect())
    }

    async fn insert(&self, table: &str, columns: &[&str], values: &[Value]) -> Result<()> {
        if columns.len() != values.len() {
            return Err(MigrateError::InvalidState(format!(
                "Insert into '{}' with {} columns but {} values",
                table,
                columns.len(),
                values.len()
            )));
        }
        let mut state = self.inner.lock().expect("adapter state");
        let row: Row = columns
            .iter()
            .map(|c| (*c).to_string())
            .zip(values.iter().cloned())
            .collect();
        state.rows_mut(table).push(row);
        Ok(())
    }

    async fn delete(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        let mut state = self.inner.lock().expect("adapter state");
        let rows = state.rows_mut(table);
        let before = rows.len();
        rows.retain(|row| !predicate.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        let mut state = self.inner.lock().expect("adapter state");
        state.fk_toggles.push(enabled);
        Ok(())
    }
}
