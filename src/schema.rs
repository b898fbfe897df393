//! Schema model types.
//!
//! These immutable value types describe tables, columns, indexes, and
//! foreign-key references. The same types are used for the desired
//! definition a migration unit declares and for the live schema
//! introspected from an existing table.

use serde::{Deserialize, Serialize};

/// The literal name that marks an index as the table's primary key.
pub const PRIMARY_KEY_NAME: &str = "PRIMARY";

/// Column types supported by the migration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInteger,
    /// Variable-length character string.
    Varchar,
    /// Fixed-length character string.
    Char,
    /// Date only.
    Date,
    /// Date and time.
    DateTime,
    /// Timestamp.
    Timestamp,
    /// Decimal with precision and scale.
    Decimal,
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Floating point (single precision).
    Float,
    /// Floating point (double precision).
    Double,
    /// Tiny binary large object.
    TinyBlob,
    /// Binary large object.
    Blob,
    /// Medium binary large object.
    MediumBlob,
    /// Long binary large object.
    LongBlob,
    /// JSON data.
    Json,
    /// Binary JSON data.
    Jsonb,
}

impl ColumnType {
    /// Returns the canonical SQL keyword for this type.
    #[must_use]
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::BigInteger => "BIGINT",
            Self::Varchar => "VARCHAR",
            Self::Char => "CHAR",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Decimal => "DECIMAL",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::TinyBlob => "TINYBLOB",
            Self::Blob => "BLOB",
            Self::MediumBlob => "MEDIUMBLOB",
            Self::LongBlob => "LONGBLOB",
            Self::Json => "JSON",
            Self::Jsonb => "JSONB",
        }
    }

    /// Parses a SQL type keyword back into a `ColumnType`.
    ///
    /// Returns `None` for keywords outside the supported enumeration, which
    /// callers surface as [`crate::MigrateError::UnknownColumnType`].
    #[must_use]
    pub fn from_sql_name(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "MEDIUMINT" => Some(Self::Integer),
            "BIGINT" => Some(Self::BigInteger),
            "VARCHAR" => Some(Self::Varchar),
            "CHAR" => Some(Self::Char),
            "DATE" => Some(Self::Date),
            "DATETIME" => Some(Self::DateTime),
            "TIMESTAMP" => Some(Self::Timestamp),
            "DECIMAL" | "NUMERIC" => Some(Self::Decimal),
            "TEXT" => Some(Self::Text),
            "BOOLEAN" | "BOOL" => Some(Self::Boolean),
            "FLOAT" | "REAL" => Some(Self::Float),
            "DOUBLE" | "DOUBLE PRECISION" => Some(Self::Double),
            "TINYBLOB" => Some(Self::TinyBlob),
            "BLOB" => Some(Self::Blob),
            "MEDIUMBLOB" => Some(Self::MediumBlob),
            "LONGBLOB" => Some(Self::LongBlob),
            "JSON" => Some(Self::Json),
            "JSONB" => Some(Self::Jsonb),
            _ => None,
        }
    }

    /// Returns whether this type carries a size in its SQL rendering.
    #[must_use]
    pub fn is_sized(&self) -> bool {
        matches!(
            self,
            Self::Integer
                | Self::BigInteger
                | Self::Varchar
                | Self::Char
                | Self::Decimal
                | Self::Boolean
        )
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => expr.clone(),
        }
    }
}

/// Declared placement of a column within its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnPosition {
    /// The column is the first of the table.
    First,
    /// The column follows the named column.
    After(String),
}

/// Description of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Declared size, when the type carries one. Absence means
    /// "no constraint", not zero.
    pub size: Option<u32>,
    /// Declared scale for decimal types.
    pub scale: Option<u32>,
    /// Whether the column is unsigned.
    pub unsigned: bool,
    /// Whether the column rejects NULL values.
    pub not_null: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Default value, if any.
    pub default: Option<DefaultValue>,
    /// Declared placement relative to the previous column.
    pub position: Option<ColumnPosition>,
}

impl ColumnDescriptor {
    /// Creates a new column descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            size: None,
            scale: None,
            unsigned: false,
            not_null: false,
            auto_increment: false,
            default: None,
            position: None,
        }
    }

    /// Sets the declared size.
    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the declared scale.
    #[must_use]
    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Marks the column as unsigned.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Marks the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column as auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Places the column first in the table.
    #[must_use]
    pub fn first(mut self) -> Self {
        self.position = Some(ColumnPosition::First);
        self
    }

    /// Places the column after the named column.
    #[must_use]
    pub fn after(mut self, column: impl Into<String>) -> Self {
        self.position = Some(ColumnPosition::After(column.into()));
        self
    }
}

/// Index classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// The table's primary key.
    Primary,
    /// A unique secondary index.
    Unique,
    /// A plain secondary index.
    Plain,
}

/// Description of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name. The literal [`PRIMARY_KEY_NAME`] marks the primary key.
    pub name: String,
    /// Index classification.
    pub kind: IndexKind,
    /// Columns covered by the index.
    pub columns: Vec<String>,
}

impl IndexDescriptor {
    /// Creates a new index descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: Vec::new(),
        }
    }

    /// Creates the primary-key index descriptor over the given columns.
    #[must_use]
    pub fn primary(columns: Vec<String>) -> Self {
        Self {
            name: PRIMARY_KEY_NAME.to_string(),
            kind: IndexKind::Primary,
            columns,
        }
    }

    /// Adds a column to the index.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Compares column sets by membership and count, ignoring sequence.
    #[must_use]
    pub fn same_columns(&self, other: &[String]) -> bool {
        self.columns.len() == other.len()
            && self.columns.iter().all(|c| other.contains(c))
    }
}

/// Referential action for ON UPDATE / ON DELETE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReferentialAction {
    /// No action.
    #[default]
    NoAction,
    /// Restrict.
    Restrict,
    /// Cascade to referencing rows.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
    /// Set referencing columns to their default.
    SetDefault,
}

impl ReferentialAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses a SQL action clause.
    #[must_use]
    pub fn from_sql(action: &str) -> Self {
        match action.to_ascii_uppercase().as_str() {
            "RESTRICT" => Self::Restrict,
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }
}

/// Description of a foreign-key reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescriptor {
    /// Constraint name.
    pub name: String,
    /// Referenced table name.
    pub referenced_table: String,
    /// Referenced schema, when it differs from the table's.
    pub referenced_schema: Option<String>,
    /// Local columns, in declaration order.
    pub columns: Vec<String>,
    /// Referenced columns, in declaration order.
    pub referenced_columns: Vec<String>,
    /// Action on update.
    pub on_update: ReferentialAction,
    /// Action on delete.
    pub on_delete: ReferentialAction,
}

impl ReferenceDescriptor {
    /// Creates a new reference descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, referenced_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            referenced_table: referenced_table.into(),
            referenced_schema: None,
            columns: Vec::new(),
            referenced_columns: Vec::new(),
            on_update: ReferentialAction::NoAction,
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Sets the referenced schema.
    #[must_use]
    pub fn referenced_schema(mut self, schema: impl Into<String>) -> Self {
        self.referenced_schema = Some(schema.into());
        self
    }

    /// Adds a local column.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Adds a referenced column.
    #[must_use]
    pub fn referenced_column(mut self, column: impl Into<String>) -> Self {
        self.referenced_columns.push(column.into());
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// The desired definition of one table.
///
/// Column order is significant: unless a column sets an explicit position,
/// [`TableDefinition::column`] assigns `First` to the first column and
/// `After(previous)` to each subsequent one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub table_name: String,
    /// Schema the table lives in, when not the connection default.
    pub schema: Option<String>,
    /// Columns, in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    /// Indexes.
    pub indexes: Vec<IndexDescriptor>,
    /// Foreign-key references.
    pub references: Vec<ReferenceDescriptor>,
    /// Table options (storage engine, collation, auto-increment seed, ...).
    pub options: Vec<(String, String)>,
}

impl TableDefinition {
    /// Creates a new, empty table definition.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            references: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a column, assigning its position from declaration order when the
    /// descriptor does not carry one.
    #[must_use]
    pub fn column(mut self, mut column: ColumnDescriptor) -> Self {
        if column.position.is_none() {
            column.position = match self.columns.last() {
                None => Some(ColumnPosition::First),
                Some(prev) => Some(ColumnPosition::After(prev.name.clone())),
            };
        }
        self.columns.push(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign-key reference.
    #[must_use]
    pub fn reference(mut self, reference: ReferenceDescriptor) -> Self {
        self.references.push(reference);
        self
    }

    /// Adds a table option.
    #[must_use]
    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Gets a reference by name.
    #[must_use]
    pub fn get_reference(&self, name: &str) -> Option<&ReferenceDescriptor> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Checks the structural invariants of the definition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MigrateError::EmptyDefinition`] when the definition
    /// holds no columns.
    pub fn validate(&self) -> crate::Result<()> {
        if self.columns.is_empty() {
            return Err(crate::MigrateError::EmptyDefinition(
                self.table_name.clone(),
            ));
        }
        Ok(())
    }
}

/// The introspected state of an existing table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LiveSchema {
    /// Introspected columns, in storage order.
    pub columns: Vec<ColumnDescriptor>,
    /// Introspected indexes.
    pub indexes: Vec<IndexDescriptor>,
    /// Introspected foreign-key references.
    pub references: Vec<ReferenceDescriptor>,
}

impl LiveSchema {
    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Gets a reference by name.
    #[must_use]
    pub fn get_reference(&self, name: &str) -> Option<&ReferenceDescriptor> {
        self.references.iter().find(|r| r.name == name)
    }
}
