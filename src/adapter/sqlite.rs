//! SQLite schema adapter backed by `sqlx`.
//!
//! SQLite preserves declared column types verbatim, so introspection here
//! parses the declared type text back into [`ColumnType`] and a snapshot of
//! a table created through this adapter re-reconciles to zero operations
//! for the shapes SQLite can express.
//!
//! SQLite has limited ALTER TABLE support: modifying a column and altering
//! primary or foreign keys after creation require the table-recreation
//! strategy, which this adapter does not perform. Those verbs return
//! [`MigrateError::Unsupported`]. Foreign-key constraint names are not
//! exposed by `PRAGMA foreign_key_list`, so introspected references carry
//! synthesized `fk_<table>_<id>` names.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::schema::{
    ColumnDescriptor, ColumnPosition, ColumnType, DefaultValue, IndexDescriptor, IndexKind,
    ReferenceDescriptor, ReferentialAction, TableDefinition, PRIMARY_KEY_NAME,
};

use super::{Predicate, Row, SchemaAdapter};

/// Schema adapter for SQLite databases.
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    /// Creates an adapter over an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to the given SQLite database.
    ///
    /// A single connection is used so that `:memory:` databases keep their
    /// state across calls.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Configuration`] when the URL cannot be opened.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| MigrateError::Configuration(format!("cannot open '{url}': {e}")))?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn unsupported(&self, operation: impl Into<String>) -> MigrateError {
        MigrateError::Unsupported {
            dialect: self.dialect(),
            operation: operation.into(),
        }
    }

    async fn table_sql(&self, table: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(sql,)| sql))
    }
}

/// Renders the CREATE TABLE statement for a definition.
fn create_table_sql(definition: &TableDefinition) -> String {
    let primary = definition
        .indexes
        .iter()
        .find(|i| i.kind == IndexKind::Primary || i.name == PRIMARY_KEY_NAME);

    // A single-column integer primary key over an auto-increment column
    // must be declared inline as INTEGER PRIMARY KEY AUTOINCREMENT.
    let inline_pk = primary.and_then(|pk| {
        if pk.columns.len() != 1 {
            return None;
        }
        let column = definition.get_column(&pk.columns[0])?;
        if column.auto_increment
            && matches!(
                column.column_type,
                ColumnType::Integer | ColumnType::BigInteger
            )
        {
            Some(column.name.clone())
        } else {
            None
        }
    });

    let mut defs = Vec::new();
    for column in &definition.columns {
        if inline_pk.as_deref() == Some(column.name.as_str()) {
            defs.push(format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                quote_ident(&column.name)
            ));
        } else {
            defs.push(column_definition(column));
        }
    }

    if let Some(pk) = primary {
        if inline_pk.is_none() {
            let quoted: Vec<String> = pk.columns.iter().map(|c| quote_ident(c)).collect();
            defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }
    }

    for reference in &definition.references {
        defs.push(foreign_key_clause(reference));
    }

    format!(
        "CREATE TABLE {} (\n  {}\n)",
        quote_ident(&definition.table_name),
        defs.join(",\n  ")
    )
}

#[async_trait]
impl SchemaAdapter for SqliteAdapter {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    async fn table_exists(&self, table: &str, _schema: Option<&str>) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn list_tables(&self, _schema: Option<&str>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn describe_columns(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ColumnDescriptor>> {
        if !self.table_exists(table, None).await? {
            return Err(MigrateError::TableNotFound(table.to_string()));
        }
        let create_sql = self.table_sql(table).await?.unwrap_or_default();
        let has_autoincrement = create_sql.to_ascii_uppercase().contains("AUTOINCREMENT");

        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::new();
        let mut previous: Option<String> = None;
        for row in rows {
            let name: String = row.try_get("name")?;
            let declared: String = row.try_get("type")?;
            let not_null: i64 = row.try_get("notnull")?;
            let dflt_value: Option<String> = row.try_get("dflt_value")?;
            let pk: i64 = row.try_get("pk")?;

            let (column_type, size, scale, unsigned) = parse_declared_type(&declared)
                .ok_or_else(|| MigrateError::UnknownColumnType {
                    table: table.to_string(),
                    column: name.clone(),
                    declared: declared.clone(),
                })?;

            let auto_increment = pk > 0
                && has_autoincrement
                && matches!(column_type, ColumnType::Integer | ColumnType::BigInteger);

            let position = match &previous {
                None => ColumnPosition::First,
                Some(prev) => ColumnPosition::After(prev.clone()),
            };

            columns.push(ColumnDescriptor {
                name: name.clone(),
                column_type,
                size,
                scale,
                unsigned,
                not_null: not_null != 0 || auto_increment,
                auto_increment,
                default: dflt_value.as_deref().map(parse_default),
                position: Some(position),
            });
            previous = Some(name);
        }

        Ok(columns)
    }

    async fn describe_indexes(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<IndexDescriptor>> {
        if !self.table_exists(table, None).await? {
            return Err(MigrateError::TableNotFound(table.to_string()));
        }

        let mut indexes = Vec::new();

        // Primary key columns come from table_info; rowid primary keys have
        // no backing index entry.
        let info_rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;
        let mut pk_columns: Vec<(i64, String)> = Vec::new();
        for row in &info_rows {
            let pk: i64 = row.try_get("pk")?;
            if pk > 0 {
                pk_columns.push((pk, row.try_get("name")?));
            }
        }
        pk_columns.sort_by_key(|(order, _)| *order);
        if !pk_columns.is_empty() {
            indexes.push(IndexDescriptor::primary(
                pk_columns.into_iter().map(|(_, name)| name).collect(),
            ));
        }

        let list_rows = sqlx::query(&format!("PRAGMA index_list({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;
        for row in list_rows {
            let name: String = row.try_get("name")?;
            if name.starts_with("sqlite_autoindex_") {
                continue;
            }
            let unique: i64 = row.try_get("unique")?;
            let origin: String = row.try_get("origin")?;
            if origin == "pk" {
                continue;
            }

            let column_rows = sqlx::query(&format!("PRAGMA index_info({})", quote_ident(&name)))
                .fetch_all(&self.pool)
                .await?;
            let mut columns: Vec<(i64, String)> = Vec::new();
            for column_row in column_rows {
                let seqno: i64 = column_row.try_get("seqno")?;
                let column: String = column_row.try_get("name")?;
                columns.push((seqno, column));
            }
            columns.sort_by_key(|(seqno, _)| *seqno);

            indexes.push(IndexDescriptor {
                name,
                kind: if unique != 0 {
                    IndexKind::Unique
                } else {
                    IndexKind::Plain
                },
                columns: columns.into_iter().map(|(_, name)| name).collect(),
            });
        }

        Ok(indexes)
    }

    async fn describe_references(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ReferenceDescriptor>> {
        if !self.table_exists(table, None).await? {
            return Err(MigrateError::TableNotFound(table.to_string()));
        }

        let rows = sqlx::query(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;

        let mut references: Vec<(i64, ReferenceDescriptor)> = Vec::new();
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let referenced_table: String = row.try_get("table")?;
            let from: String = row.try_get("from")?;
            let to: Option<String> = row.try_get("to")?;
            let on_update: String = row.try_get("on_update")?;
            let on_delete: String = row.try_get("on_delete")?;

            let at = match references.iter().position(|(rid, _)| *rid == id) {
                Some(at) => at,
                None => {
                    references.push((
                        id,
                        ReferenceDescriptor::new(format!("fk_{table}_{id}"), referenced_table)
                            .on_update(ReferentialAction::from_sql(&on_update))
                            .on_delete(ReferentialAction::from_sql(&on_delete)),
                    ));
                    references.len() - 1
                }
            };
            let reference = &mut references[at].1;
            reference.columns.push(from);
            if let Some(to) = to {
                reference.referenced_columns.push(to);
            }
        }

        references.sort_by_key(|(id, _)| *id);
        Ok(references.into_iter().map(|(_, r)| r).collect())
    }

    async fn table_options(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<(String, String)>> {
        // SQLite has no per-table storage options.
        Ok(Vec::new())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        definition.validate()?;
        let sql = create_table_sql(definition);
        debug!(sql = %sql, "Creating table");
        sqlx::query(&sql).execute(&self.pool).await?;

        for index in &definition.indexes {
            if index.kind == IndexKind::Primary || index.name == PRIMARY_KEY_NAME {
                continue;
            }
            self.add_index(&definition.table_name, None, index).await?;
        }
        Ok(())
    }

    async fn add_column(
        &self,
        table: &str,
        _schema: Option<&str>,
        column: &ColumnDescriptor,
    ) -> Result<()> {
        // ALTER TABLE cannot place columns; position is ignored here.
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column_definition(column)
        );
        debug!(sql = %sql, "Adding column");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn modify_column(
        &self,
        table: &str,
        _schema: Option<&str>,
        column: &ColumnDescriptor,
    ) -> Result<()> {
        Err(self.unsupported(format!(
            "Modifying column '{}' of table '{}'",
            column.name, table
        )))
    }

    async fn drop_column(&self, table: &str, _schema: Option<&str>, column: &str) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(column)
        );
        debug!(sql = %sql, "Dropping column");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_index(
        &self,
        table: &str,
        _schema: Option<&str>,
        index: &IndexDescriptor,
    ) -> Result<()> {
        let quoted: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.kind == IndexKind::Unique {
                "UNIQUE "
            } else {
                ""
            },
            quote_ident(&index.name),
            quote_ident(table),
            quoted.join(", ")
        );
        debug!(sql = %sql, "Creating index");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn drop_index(&self, table: &str, _schema: Option<&str>, index: &str) -> Result<()> {
        let sql = format!("DROP INDEX {}", quote_ident(index));
        debug!(sql = %sql, table = %table, "Dropping index");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_primary_key(
        &self,
        table: &str,
        _schema: Option<&str>,
        _index: &IndexDescriptor,
    ) -> Result<()> {
        Err(self.unsupported(format!("Adding a primary key to table '{table}'")))
    }

    async fn drop_primary_key(&self, table: &str, _schema: Option<&str>) -> Result<()> {
        Err(self.unsupported(format!("Dropping the primary key of table '{table}'")))
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        _schema: Option<&str>,
        reference: &ReferenceDescriptor,
    ) -> Result<()> {
        Err(self.unsupported(format!(
            "Adding foreign key '{}' to table '{}'",
            reference.name, table
        )))
    }

    async fn drop_foreign_key(
        &self,
        table: &str,
        _schema: Option<&str>,
        reference: &str,
    ) -> Result<()> {
        Err(self.unsupported(format!(
            "Dropping foreign key '{reference}' from table '{table}'"
        )))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!(sql = %sql, "Executing statement");
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    async fn fetch_one(&self, sql: &str) -> Result<Option<Row>> {
        let row = sqlx::query(sql).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_map))
    }

    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        predicate: &Predicate,
    ) -> Result<Vec<Row>> {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", projection, quote_ident(table));
        sql.push_str(&where_clause(predicate));

        let mut query = sqlx::query(&sql);
        for (_, value) in predicate.clauses() {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_map).collect())
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
        let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            quoted.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        let mut sql = format!("DELETE FROM {}", quote_ident(table));
        sql.push_str(&where_clause(predicate));

        let mut query = sqlx::query(&sql);
        for (_, value) in predicate.clauses() {
            query = bind_value(query, value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Quotes an identifier for SQLite.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders one column definition.
fn column_definition(column: &ColumnDescriptor) -> String {
    let mut parts = vec![quote_ident(&column.name), type_sql(column)];
    if column.not_null {
        parts.push("NOT NULL".to_string());
    }
    if let Some(default) = &column.default {
        parts.push(format!("DEFAULT {}", default.to_sql()));
    }
    parts.join(" ")
}

/// Renders the declared SQL type for a column.
///
/// Integer family and boolean types are rendered unsized; SQLite is one of
/// the dialects that omit integer sizes.
fn type_sql(column: &ColumnDescriptor) -> String {
    let base = match column.column_type {
        ColumnType::Varchar => format!("VARCHAR({})", column.size.unwrap_or(255)),
        ColumnType::Char => format!("CHAR({})", column.size.unwrap_or(1)),
        ColumnType::Decimal => match (column.size, column.scale) {
            (Some(precision), Some(scale)) => format!("DECIMAL({precision},{scale})"),
            (Some(precision), None) => format!("DECIMAL({precision})"),
            _ => "DECIMAL".to_string(),
        },
        other => other.sql_name().to_string(),
    };
    if column.unsigned {
        format!("{base} UNSIGNED")
    } else {
        base
    }
}

/// Renders an inline FOREIGN KEY clause for CREATE TABLE.
fn foreign_key_clause(reference: &ReferenceDescriptor) -> String {
    let columns: Vec<String> = reference.columns.iter().map(|c| quote_ident(c)).collect();
    let referenced: Vec<String> = reference
        .referenced_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect();
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
        quote_ident(&reference.name),
        columns.join(", "),
        quote_ident(&reference.referenced_table),
        referenced.join(", "),
        reference.on_update.to_sql(),
        reference.on_delete.to_sql()
    )
}

/// Renders the WHERE clause for a predicate (placeholders only).
fn where_clause(predicate: &Predicate) -> String {
    if predicate.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = predicate
        .clauses()
        .iter()
        .map(|(column, _)| format!("{} = ?", quote_ident(column)))
        .collect();
    format!(" WHERE {}", clauses.join(" AND "))
}

/// Binds one JSON value to the next placeholder.
fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Converts a SQLite row into a generic column/value map.
fn row_to_map(row: &SqliteRow) -> Row {
    let mut map = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INTEGER" => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "REAL" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "BLOB" => None,
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
        };
        map.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    map
}

/// Parses a declared SQL type into type, size, scale, and signedness.
fn parse_declared_type(declared: &str) -> Option<(ColumnType, Option<u32>, Option<u32>, bool)> {
    let mut text = declared.trim().to_ascii_uppercase();
    let unsigned = text.ends_with(" UNSIGNED");
    if unsigned {
        text.truncate(text.len() - " UNSIGNED".len());
    }
    let text = text.trim();

    let (keyword, args) = match text.find('(') {
        Some(open) => {
            let close = text.rfind(')')?;
            (text[..open].trim(), Some(&text[open + 1..close]))
        }
        None => (text, None),
    };

    let column_type = ColumnType::from_sql_name(keyword)?;

    let (size, scale) = match args {
        None => (None, None),
        Some(args) => {
            let mut parts = args.split(',').map(str::trim);
            let size = parts.next().and_then(|p| p.parse::<u32>().ok());
            let scale = parts.next().and_then(|p| p.parse::<u32>().ok());
            (size, scale)
        }
    };

    Some((column_type, size, scale, unsigned))
}

/// Parses a `dflt_value` from `PRAGMA table_info`.
fn parse_default(raw: &str) -> DefaultValue {
    let text = raw.trim();
    if text.eq_ignore_ascii_case("NULL") {
        return DefaultValue::Null;
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return DefaultValue::String(text[1..text.len() - 1].replace("''", "'"));
    }
    if let Ok(i) = text.parse::<i64>() {
        return DefaultValue::Integer(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return DefaultValue::Float(f);
    }
    DefaultValue::Expression(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_adapter() -> SqliteAdapter {
        SqliteAdapter::connect(":memory:")
            .await
            .expect("in-memory SQLite")
    }

    fn orders_table() -> TableDefinition {
        TableDefinition::new("orders")
            .column(
                ColumnDescriptor::new("id", ColumnType::Integer)
                    .not_null()
                    .auto_increment(),
            )
            .column(
                ColumnDescriptor::new("reference", ColumnType::Varchar)
                    .size(64)
                    .not_null(),
            )
            .column(
                ColumnDescriptor::new("total", ColumnType::Decimal)
                    .size(10)
                    .scale(2),
            )
            .column(
                ColumnDescriptor::new("status", ColumnType::Varchar)
                    .size(16)
                    .default(DefaultValue::String("new".to_string())),
            )
            .index(IndexDescriptor::primary(vec!["id".to_string()]))
            .index(
                IndexDescriptor::new("idx_orders_reference", IndexKind::Unique)
                    .column("reference"),
            )
    }

    #[test]
    fn test_parse_declared_type() {
        assert_eq!(
            parse_declared_type("VARCHAR(50)"),
            Some((ColumnType::Varchar, Some(50), None, false))
        );
        assert_eq!(
            parse_declared_type("DECIMAL(10,2)"),
            Some((ColumnType::Decimal, Some(10), Some(2), false))
        );
        assert_eq!(
            parse_declared_type("INTEGER UNSIGNED"),
            Some((ColumnType::Integer, None, None, true))
        );
        assert_eq!(
            parse_declared_type("text"),
            Some((ColumnType::Text, None, None, false))
        );
        assert_eq!(parse_declared_type("GEOMETRY"), None);
    }

    #[test]
    fn test_parse_default() {
        assert_eq!(parse_default("NULL"), DefaultValue::Null);
        assert_eq!(parse_default("42"), DefaultValue::Integer(42));
        assert_eq!(parse_default("1.5"), DefaultValue::Float(1.5));
        assert_eq!(
            parse_default("'it''s'"),
            DefaultValue::String("it's".to_string())
        );
        assert_eq!(
            parse_default("CURRENT_TIMESTAMP"),
            DefaultValue::Expression("CURRENT_TIMESTAMP".to_string())
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[tokio::test]
    async fn test_create_table_and_introspect() {
        let adapter = memory_adapter().await;
        adapter.create_table(&orders_table()).await.unwrap();

        assert!(adapter.table_exists("orders", None).await.unwrap());
        assert_eq!(adapter.list_tables(None).await.unwrap(), vec!["orders"]);

        let columns = adapter.describe_columns("orders", None).await.unwrap();
        assert_eq!(columns.len(), 4);

        let id = &columns[0];
        assert_eq!(id.name, "id");
        assert_eq!(id.column_type, ColumnType::Integer);
        assert!(id.auto_increment);
        assert!(id.not_null);

        let reference = &columns[1];
        assert_eq!(reference.column_type, ColumnType::Varchar);
        assert_eq!(reference.size, Some(64));
        assert!(reference.not_null);
        assert_eq!(
            reference.position,
            Some(ColumnPosition::After("id".to_string()))
        );

        let total = &columns[2];
        assert_eq!(total.column_type, ColumnType::Decimal);
        assert_eq!(total.size, Some(10));
        assert_eq!(total.scale, Some(2));

        let status = &columns[3];
        assert_eq!(
            status.default,
            Some(DefaultValue::String("new".to_string()))
        );
    }

    #[tokio::test]
    async fn test_describe_indexes() {
        let adapter = memory_adapter().await;
        adapter.create_table(&orders_table()).await.unwrap();

        let indexes = adapter.describe_indexes("orders", None).await.unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, PRIMARY_KEY_NAME);
        assert_eq!(indexes[0].columns, vec!["id"]);
        assert_eq!(indexes[1].name, "idx_orders_reference");
        assert_eq!(indexes[1].kind, IndexKind::Unique);
    }

    #[tokio::test]
    async fn test_add_and_drop_column() {
        let adapter = memory_adapter().await;
        adapter.create_table(&orders_table()).await.unwrap();

        adapter
            .add_column(
                "orders",
                None,
                &ColumnDescriptor::new("note", ColumnType::Text),
            )
            .await
            .unwrap();
        let columns = adapter.describe_columns("orders", None).await.unwrap();
        assert!(columns.iter().any(|c| c.name == "note"));

        adapter.drop_column("orders", None, "note").await.unwrap();
        let columns = adapter.describe_columns("orders", None).await.unwrap();
        assert!(!columns.iter().any(|c| c.name == "note"));
    }

    #[tokio::test]
    async fn test_add_and_drop_index() {
        let adapter = memory_adapter().await;
        adapter.create_table(&orders_table()).await.unwrap();

        adapter
            .add_index(
                "orders",
                None,
                &IndexDescriptor::new("idx_orders_status", IndexKind::Plain).column("status"),
            )
            .await
            .unwrap();
        let indexes = adapter.describe_indexes("orders", None).await.unwrap();
        assert!(indexes.iter().any(|i| i.name == "idx_orders_status"));

        adapter
            .drop_index("orders", None, "idx_orders_status")
            .await
            .unwrap();
        let indexes = adapter.describe_indexes("orders", None).await.unwrap();
        assert!(!indexes.iter().any(|i| i.name == "idx_orders_status"));
    }

    #[tokio::test]
    async fn test_describe_references() {
        let adapter = memory_adapter().await;
        adapter
            .create_table(
                &TableDefinition::new("users")
                    .column(
                        ColumnDescriptor::new("id", ColumnType::Integer)
                            .not_null()
                            .auto_increment(),
                    )
                    .index(IndexDescriptor::primary(vec!["id".to_string()])),
            )
            .await
            .unwrap();
        adapter
            .create_table(
                &TableDefinition::new("sessions")
                    .column(ColumnDescriptor::new("token", ColumnType::Varchar).size(64))
                    .column(ColumnDescriptor::new("user_id", ColumnType::Integer))
                    .reference(
                        ReferenceDescriptor::new("fk_sessions_user", "users")
                            .column("user_id")
                            .referenced_column("id")
                            .on_delete(ReferentialAction::Cascade),
                    ),
            )
            .await
            .unwrap();

        let references = adapter.describe_references("sessions", None).await.unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].referenced_table, "users");
        assert_eq!(references[0].columns, vec!["user_id"]);
        assert_eq!(references[0].referenced_columns, vec!["id"]);
        assert_eq!(references[0].on_delete, ReferentialAction::Cascade);
    }

    #[tokio::test]
    async fn test_modify_column_is_unsupported() {
        let adapter = memory_adapter().await;
        adapter.create_table(&orders_table()).await.unwrap();

        let result = adapter
            .modify_column(
                "orders",
                None,
                &ColumnDescriptor::new("status", ColumnType::Varchar).size(32),
            )
            .await;
        assert!(matches!(result, Err(MigrateError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn test_insert_select_delete() {
        let adapter = memory_adapter().await;
        adapter
            .execute("CREATE TABLE kv (key TEXT NOT NULL, value INTEGER)")
            .await
            .unwrap();

        adapter
            .insert("kv", &["key", "value"], &[Value::from("a"), Value::from(1)])
            .await
            .unwrap();
        adapter
            .insert("kv", &["key", "value"], &[Value::from("b"), Value::from(2)])
            .await
            .unwrap();

        let rows = adapter
            .select("kv", &[], &Predicate::new().eq("key", "b"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("value"), Some(&Value::from(2)));

        let deleted = adapter
            .delete("kv", &Predicate::new().eq("key", "a"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = adapter.select("kv", &[], &Predicate::new()).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_introspection_errors() {
        let adapter = memory_adapter().await;
        let result = adapter.describe_columns("ghost", None).await;
        assert!(matches!(result, Err(MigrateError::TableNotFound(_))));
    }
}
