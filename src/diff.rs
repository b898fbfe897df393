//! The diff engine.
//!
//! [`Reconciler`] compares a desired [`TableDefinition`] against a live,
//! introspected [`LiveSchema`] and emits the minimal ordered list of
//! [`SchemaOp`]s that reconciles the two. The engine is stateless: it owns
//! nothing and touches no database.
//!
//! Operations are emitted in three fixed phases — columns, then references,
//! then indexes — because foreign keys and indexes may depend on column
//! existence, and dropping a column before a dependent constraint is invalid
//! on some dialects.

use crate::error::Result;
use crate::operations::SchemaOp;
use crate::schema::{
    ColumnDescriptor, IndexDescriptor, LiveSchema, ReferenceDescriptor, TableDefinition,
    PRIMARY_KEY_NAME,
};

/// Computes the structural operations reconciling live state with a desired
/// definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Diffs the desired definition against the live schema.
    ///
    /// When `live` is `None` the table does not exist and a single
    /// `CreateTable` operation is emitted; the adapter's create-table
    /// implementation instantiates columns, indexes, and references
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MigrateError::EmptyDefinition`] when the desired
    /// definition declares no columns.
    pub fn reconcile(
        &self,
        desired: &TableDefinition,
        live: Option<&LiveSchema>,
    ) -> Result<Vec<SchemaOp>> {
        desired.validate()?;

        let Some(live) = live else {
            return Ok(vec![SchemaOp::create_table(desired.clone())]);
        };

        let mut ops = Vec::new();
        self.diff_columns(desired, live, &mut ops);
        self.diff_references(desired, live, &mut ops);
        self.diff_indexes(desired, live, &mut ops);
        Ok(ops)
    }

    fn diff_columns(&self, desired: &TableDefinition, live: &LiveSchema, ops: &mut Vec<SchemaOp>) {
        let table = &desired.table_name;
        let schema = desired.schema.clone();

        for column in &desired.columns {
            match live.get_column(&column.name) {
                None => ops.push(SchemaOp::add_column(table, schema.clone(), column.clone())),
                Some(live_column) => {
                    if column_changed(live_column, column) {
                        ops.push(SchemaOp::modify_column(
                            table,
                            schema.clone(),
                            column.clone(),
                        ));
                    }
                }
            }
        }

        for live_column in &live.columns {
            if desired.get_column(&live_column.name).is_none() {
                ops.push(SchemaOp::drop_column(
                    table,
                    schema.clone(),
                    live_column.name.clone(),
                ));
            }
        }
    }

    fn diff_references(
        &self,
        desired: &TableDefinition,
        live: &LiveSchema,
        ops: &mut Vec<SchemaOp>,
    ) {
        let table = &desired.table_name;
        let schema = desired.schema.clone();

        for reference in &desired.references {
            match live.get_reference(&reference.name) {
                None => ops.push(SchemaOp::add_foreign_key(
                    table,
                    schema.clone(),
                    reference.clone(),
                )),
                Some(live_reference) => {
                    if reference_changed(live_reference, reference) {
                        // The pair is emitted together so no window without a
                        // matching constraint is visible between operations.
                        ops.push(SchemaOp::drop_foreign_key(
                            table,
                            schema.clone(),
                            reference.name.clone(),
                        ));
                        ops.push(SchemaOp::add_foreign_key(
                            table,
                            schema.clone(),
                            reference.clone(),
                        ));
                    }
                }
            }
        }

        for live_reference in &live.references {
            if desired.get_reference(&live_reference.name).is_none() {
                ops.push(SchemaOp::drop_foreign_key(
                    table,
                    schema.clone(),
                    live_reference.name.clone(),
                ));
            }
        }
    }

    fn diff_indexes(&self, desired: &TableDefinition, live: &LiveSchema, ops: &mut Vec<SchemaOp>) {
        let table = &desired.table_name;
        let schema = desired.schema.clone();

        for index in &desired.indexes {
            match live.get_index(&index.name) {
                None => {
                    if index.name == PRIMARY_KEY_NAME {
                        ops.push(SchemaOp::add_primary_key(
                            table,
                            schema.clone(),
                            index.clone(),
                        ));
                    } else {
                        ops.push(SchemaOp::add_index(table, schema.clone(), index.clone()));
                    }
                }
                Some(live_index) => {
                    if !index.same_columns(&live_index.columns) {
                        if index.name == PRIMARY_KEY_NAME {
                            ops.push(SchemaOp::drop_primary_key(table, schema.clone()));
                            ops.push(SchemaOp::add_primary_key(
                                table,
                                schema.clone(),
                                index.clone(),
                            ));
                        } else {
                            ops.push(SchemaOp::drop_index(
                                table,
                                schema.clone(),
                                index.name.clone(),
                            ));
                            ops.push(SchemaOp::add_index(table, schema.clone(), index.clone()));
                        }
                    }
                }
            }
        }

        for live_index in &live.indexes {
            if desired.get_index(&live_index.name).is_none() {
                if live_index.name == PRIMARY_KEY_NAME {
                    ops.push(SchemaOp::drop_primary_key(table, schema.clone()));
                } else {
                    ops.push(SchemaOp::drop_index(
                        table,
                        schema.clone(),
                        live_index.name.clone(),
                    ));
                }
            }
        }
    }
}

/// Compares a live column against the desired descriptor.
///
/// Only type, size, nullability, and default participate: position changes
/// alone never trigger a modify, absent size means "no constraint" rather
/// than zero, and auto-increment columns never diff on their default.
fn column_changed(live: &ColumnDescriptor, desired: &ColumnDescriptor) -> bool {
    if live.column_type != desired.column_type {
        return true;
    }
    match (desired.size, live.size) {
        (Some(want), Some(have)) if want != have => return true,
        (Some(_), None) => return true,
        _ => {}
    }
    if live.not_null != desired.not_null {
        return true;
    }
    if !desired.auto_increment && live.default != desired.default {
        return true;
    }
    false
}

/// Compares a live reference against the desired descriptor.
///
/// Column sets are compared by membership and count, not sequence.
fn reference_changed(live: &ReferenceDescriptor, desired: &ReferenceDescriptor) -> bool {
    if live.referenced_table != desired.referenced_table {
        return true;
    }
    if live.columns.len() != desired.columns.len() {
        return true;
    }
    if live.referenced_columns.len() != desired.referenced_columns.len() {
        return true;
    }
    if desired.columns.iter().any(|c| !live.columns.contains(c)) {
        return true;
    }
    desired
        .referenced_columns
        .iter()
        .any(|c| !live.referenced_columns.contains(c))
}
