//! Structural operations emitted by the diff engine.
//!
//! Each variant corresponds to one DDL verb on the schema adapter. The diff
//! engine emits them in a fixed phase order (columns, references, indexes)
//! and the executor applies them through [`crate::adapter::SchemaAdapter`].

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnDescriptor, IndexDescriptor, ReferenceDescriptor, TableDefinition};

/// A single structural operation against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaOp {
    /// Create the whole table, including columns, indexes, and references.
    CreateTable {
        /// The complete desired definition.
        definition: TableDefinition,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// Column to add.
        column: ColumnDescriptor,
    },

    /// Replace an existing column's definition with the desired one.
    ModifyColumn {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// The desired column definition.
        column: ColumnDescriptor,
    },

    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// Column name.
        column_name: String,
    },

    /// Create a secondary index.
    AddIndex {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// Index to create.
        index: IndexDescriptor,
    },

    /// Drop a secondary index.
    DropIndex {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// Index name.
        index_name: String,
    },

    /// Install the table's primary key.
    AddPrimaryKey {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// The primary-key index descriptor.
        index: IndexDescriptor,
    },

    /// Drop the table's primary key.
    DropPrimaryKey {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
    },

    /// Add a foreign-key constraint.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// Reference to add.
        reference: ReferenceDescriptor,
    },

    /// Drop a foreign-key constraint.
    DropForeignKey {
        /// Table name.
        table: String,
        /// Schema, when not the connection default.
        schema: Option<String>,
        /// Constraint name.
        reference_name: String,
    },
}

impl SchemaOp {
    /// Creates a `CreateTable` operation.
    #[must_use]
    pub fn create_table(definition: TableDefinition) -> Self {
        Self::CreateTable { definition }
    }

    /// Creates an `AddColumn` operation.
    #[must_use]
    pub fn add_column(
        table: impl Into<String>,
        schema: Option<String>,
        column: ColumnDescriptor,
    ) -> Self {
        Self::AddColumn {
            table: table.into(),
            schema,
            column,
        }
    }

    /// Creates a `ModifyColumn` operation.
    #[must_use]
    pub fn modify_column(
        table: impl Into<String>,
        schema: Option<String>,
        column: ColumnDescriptor,
    ) -> Self {
        Self::ModifyColumn {
            table: table.into(),
            schema,
            column,
        }
    }

    /// Creates a `DropColumn` operation.
    #[must_use]
    pub fn drop_column(
        table: impl Into<String>,
        schema: Option<String>,
        column_name: impl Into<String>,
    ) -> Self {
        Self::DropColumn {
            table: table.into(),
            schema,
            column_name: column_name.into(),
        }
    }

    /// Creates an `AddIndex` operation.
    #[must_use]
    pub fn add_index(
        table: impl Into<String>,
        schema: Option<String>,
        index: IndexDescriptor,
    ) -> Self {
        Self::AddIndex {
            table: table.into(),
            schema,
            index,
        }
    }

    /// Creates a `DropIndex` operation.
    #[must_use]
    pub fn drop_index(
        table: impl Into<String>,
        schema: Option<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self::DropIndex {
            table: table.into(),
            schema,
            index_name: index_name.into(),
        }
    }

    /// Creates an `AddPrimaryKey` operation.
    #[must_use]
    pub fn add_primary_key(
        table: impl Into<String>,
        schema: Option<String>,
        index: IndexDescriptor,
    ) -> Self {
        Self::AddPrimaryKey {
            table: table.into(),
            schema,
            index,
        }
    }

    /// Creates a `DropPrimaryKey` operation.
    #[must_use]
    pub fn drop_primary_key(table: impl Into<String>, schema: Option<String>) -> Self {
        Self::DropPrimaryKey {
            table: table.into(),
            schema,
        }
    }

    /// Creates an `AddForeignKey` operation.
    #[must_use]
    pub fn add_foreign_key(
        table: impl Into<String>,
        schema: Option<String>,
        reference: ReferenceDescriptor,
    ) -> Self {
        Self::AddForeignKey {
            table: table.into(),
            schema,
            reference,
        }
    }

    /// Creates a `DropForeignKey` operation.
    #[must_use]
    pub fn drop_foreign_key(
        table: impl Into<String>,
        schema: Option<String>,
        reference_name: impl Into<String>,
    ) -> Self {
        Self::DropForeignKey {
            table: table.into(),
            schema,
            reference_name: reference_name.into(),
        }
    }

    /// Returns the name of the table this operation targets.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { definition } => &definition.table_name,
            Self::AddColumn { table, .. }
            | Self::ModifyColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddPrimaryKey { table, .. }
            | Self::DropPrimaryKey { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. } => table,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { definition } => {
                format!("Create table '{}'", definition.table_name)
            }
            Self::AddColumn { table, column, .. } => {
                format!("Add column '{}' to table '{}'", column.name, table)
            }
            Self::ModifyColumn { table, column, .. } => {
                format!("Modify column '{}' of table '{}'", column.name, table)
            }
            Self::DropColumn {
                table, column_name, ..
            } => format!("Drop column '{}' from table '{}'", column_name, table),
            Self::AddIndex { table, index, .. } => {
                format!("Add index '{}' to table '{}'", index.name, table)
            }
            Self::DropIndex {
                table, index_name, ..
            } => format!("Drop index '{}' from table '{}'", index_name, table),
            Self::AddPrimaryKey { table, .. } => {
                format!("Add primary key to table '{}'", table)
            }
            Self::DropPrimaryKey { table, .. } => {
                format!("Drop primary key from table '{}'", table)
            }
            Self::AddForeignKey {
                table, reference, ..
            } => format!(
                "Add foreign key '{}' to table '{}'",
                reference.name, table
            ),
            Self::DropForeignKey {
                table,
                reference_name,
                ..
            } => format!(
                "Drop foreign key '{}' from table '{}'",
                reference_name, table
            ),
        }
    }
}
