//! Schema snapshot generator.
//!
//! Converts a live, introspected table into a [`TableDefinition`] and
//! renders it as a migration unit source file. Descriptors produced here are
//! structurally identical to direct introspection output, so a freshly
//! generated unit reconciles to zero operations when applied against the
//! table it was captured from.
//!
//! Generation is read-only with respect to the target database, except for
//! the optional row export: [`ExportData::Always`] and
//! [`ExportData::OnCreate`] dump the table's rows to a `<table>.dat` side
//! file at generation time, and `Always` additionally wires data loading
//! into the generated `up`/`down` hooks.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapter::Predicate;
use crate::error::{MigrateError, Result};
use crate::registry::entry_name;
use crate::schema::{
    ColumnDescriptor, ColumnType, DefaultValue, IndexDescriptor, ReferenceDescriptor,
    ReferentialAction, TableDefinition,
};
use crate::session::MigrationSession;

/// Row-export behavior of a generated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportData {
    /// No data export.
    #[default]
    None,
    /// Dump rows at generation time and reload them on every forward apply.
    Always,
    /// Dump rows at generation time only (intended for the initial creation).
    OnCreate,
}

/// A migration unit source artifact produced by the generator.
#[derive(Debug, Clone)]
pub struct GeneratedUnit {
    /// The unit's identifier (also the file stem).
    pub identifier: String,
    /// Path the source file was written to.
    pub path: PathBuf,
    /// The rendered source.
    pub source: String,
}

/// Captures live tables as table definitions and migration unit sources.
pub struct SnapshotGenerator<'a> {
    session: &'a MigrationSession,
}

impl<'a> SnapshotGenerator<'a> {
    /// Creates a generator over the session.
    #[must_use]
    pub fn new(session: &'a MigrationSession) -> Self {
        Self { session }
    }

    /// Builds a [`TableDefinition`] from the live table.
    ///
    /// Introspected descriptors are carried over with the generation rules of
    /// the engine applied: sized types default to size 1 when introspection
    /// reported none (except integer and boolean types on dialects that omit
    /// their sizes), auto-increment columns lose their default, and
    /// First/After positions are assigned from column order.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::TableNotFound`] when the table does not
    /// exist; introspection errors surface unmodified.
    pub async fn snapshot(&self, table: &str) -> Result<TableDefinition> {
        let schema = self.session.config().schema.as_deref();
        let adapter = self.session.adapter();

        if !adapter.table_exists(table, schema).await? {
            return Err(MigrateError::TableNotFound(table.to_string()));
        }

        let sized_integers = !omits_integer_size(adapter.dialect());
        let mut definition = TableDefinition::new(table);
        if let Some(schema) = schema {
            definition = definition.schema(schema);
        }

        for column in adapter.describe_columns(table, schema).await? {
            let mut column = column;
            let integer_like = matches!(
                column.column_type,
                ColumnType::Boolean | ColumnType::Integer | ColumnType::BigInteger
            );
            if column.size.is_none()
                && column.column_type.is_sized()
                && (sized_integers || !integer_like)
            {
                column.size = Some(1);
            }
            if column.auto_increment {
                column.default = None;
            }
            column.position = None;
            definition = definition.column(column);
        }

        for index in adapter.describe_indexes(table, schema).await? {
            definition = definition.index(index);
        }
        for reference in adapter.describe_references(table, schema).await? {
            definition = definition.reference(reference);
        }
        for (name, value) in adapter.table_options(table, schema).await? {
            let value = if self.session.config().skip_auto_increment
                && name.eq_ignore_ascii_case("AUTO_INCREMENT")
            {
                String::new()
            } else {
                value
            };
            definition = definition.option(name.to_uppercase(), value);
        }

        Ok(definition)
    }

    /// Snapshots every table except the ledger table.
    ///
    /// # Errors
    ///
    /// Surfaces introspection errors unmodified.
    pub async fn snapshot_all(&self) -> Result<Vec<TableDefinition>> {
        let schema = self.session.config().schema.as_deref();
        let ledger_table = &self.session.config().ledger_table;

        let mut definitions = Vec::new();
        for table in self.session.adapter().list_tables(schema).await? {
            if &table == ledger_table {
                continue;
            }
            definitions.push(self.snapshot(&table).await?);
        }
        Ok(definitions)
    }

    /// Builds a fresh, date-prefixed identifier for a generated unit.
    #[must_use]
    pub fn next_identifier(&self, table: &str) -> String {
        let now = Utc::now();
        format!(
            "{}_{:06}_create_{}",
            now.format("%Y%m%d"),
            now.timestamp() % 1_000_000,
            table.to_lowercase()
        )
    }

    /// Renders the unit source for a captured definition.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidIdentifier`] for malformed
    /// identifiers.
    pub fn render_unit(
        &self,
        identifier: &str,
        definition: &TableDefinition,
        export: ExportData,
    ) -> Result<String> {
        let struct_name = entry_name(identifier)?;
        let table = &definition.table_name;

        let mut src = String::new();
        src.push_str("use strata_migrate::prelude::*;\n\n");
        src.push_str(&format!("pub struct {struct_name};\n\n"));
        src.push_str("#[async_trait::async_trait]\n");
        src.push_str(&format!("impl MigrationUnit for {struct_name} {{\n"));

        src.push_str("    fn morph(&self) -> Option<TableDefinition> {\n");
        src.push_str("        Some(\n");
        src.push_str(&render_definition(definition, 12));
        src.push_str(",\n        )\n");
        src.push_str("    }\n\n");

        match export {
            ExportData::Always => {
                src.push_str(
                    "    async fn up(&self, session: &MigrationSession) -> Result<()> {\n",
                );
                src.push_str(&format!(
                    "        load_dump(session, \"{table}\", include_str!(\"{table}.dat\")).await\n"
                ));
                src.push_str("    }\n\n");
                src.push_str(
                    "    async fn down(&self, session: &MigrationSession) -> Result<()> {\n",
                );
                src.push_str(&format!(
                    "        clear_table(session, \"{table}\").await\n"
                ));
                src.push_str("    }\n");
            }
            ExportData::OnCreate => {
                // Rows are loaded only into a freshly created (empty) table.
                src.push_str(
                    "    async fn up(&self, session: &MigrationSession) -> Result<()> {\n",
                );
                src.push_str(&format!(
                    "        if table_is_empty(session, \"{table}\").await? {{\n"
                ));
                src.push_str(&format!(
                    "            load_dump(session, \"{table}\", include_str!(\"{table}.dat\")).await?;\n"
                ));
                src.push_str("        }\n");
                src.push_str("        Ok(())\n");
                src.push_str("    }\n\n");
                src.push_str(
                    "    async fn down(&self, _session: &MigrationSession) -> Result<()> {\n",
                );
                src.push_str("        Ok(())\n");
                src.push_str("    }\n");
            }
            ExportData::None => {
                src.push_str(
                    "    async fn up(&self, _session: &MigrationSession) -> Result<()> {\n",
                );
                src.push_str("        Ok(())\n");
                src.push_str("    }\n\n");
                src.push_str(
                    "    async fn down(&self, _session: &MigrationSession) -> Result<()> {\n",
                );
                src.push_str("        Ok(())\n");
                src.push_str("    }\n");
            }
        }

        src.push_str("}\n");
        Ok(src)
    }

    /// Snapshots a table and writes the generated unit (and, when requested,
    /// its data dump) into the migrations directory.
    ///
    /// # Errors
    ///
    /// Returns directory errors when the migrations directory cannot be
    /// created or written; introspection errors surface unmodified.
    pub async fn generate(&self, table: &str, export: ExportData) -> Result<GeneratedUnit> {
        let definition = self.snapshot(table).await?;
        let identifier = self.next_identifier(table);
        let source = self.render_unit(&identifier, &definition, export)?;

        let dir = self.session.migrations_dir();
        if !dir.is_dir() {
            std::fs::create_dir_all(dir)
                .map_err(|_| MigrateError::DirectoryUnwritable(dir.to_path_buf()))?;
        }

        let path = dir.join(format!("{identifier}.rs"));
        std::fs::write(&path, &source)
            .map_err(|_| MigrateError::DirectoryUnwritable(dir.to_path_buf()))?;

        if export != ExportData::None {
            self.dump_rows(&definition).await?;
        }

        info!(identifier = %identifier, table = %table, "Generated migration unit");
        Ok(GeneratedUnit {
            identifier,
            path,
            source,
        })
    }

    /// Dumps the table's rows to `<table>.dat` next to the generated unit.
    ///
    /// Values are written one row per line, comma-separated, with `NULL`
    /// marking SQL NULL. Values containing commas or newlines are not
    /// escaped.
    async fn dump_rows(&self, definition: &TableDefinition) -> Result<()> {
        let table = &definition.table_name;
        let rows = self
            .session
            .adapter()
            .select(table, &[], &Predicate::new())
            .await?;

        let mut dump = String::new();
        for row in &rows {
            let fields: Vec<String> = definition
                .columns
                .iter()
                .map(|column| value_to_field(row.get(&column.name)))
                .collect();
            dump.push_str(&fields.join(","));
            dump.push('\n');
        }

        let path = self.session.migrations_dir().join(format!("{table}.dat"));
        std::fs::write(&path, dump)?;
        Ok(())
    }
}

/// Loads a `<table>.dat` dump produced by the generator into the table.
///
/// # Errors
///
/// Surfaces adapter errors unmodified.
pub async fn load_dump(session: &MigrationSession, table: &str, data: &str) -> Result<()> {
    let schema = session.config().schema.as_deref();
    let columns = session.adapter().describe_columns(table, schema).await?;
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

    for line in data.lines() {
        if line.is_empty() {
            continue;
        }
        let values: Vec<Value> = line.split(',').map(field_to_value).collect();
        session.adapter().insert(table, &names, &values).await?;
    }
    Ok(())
}

/// Deletes every row of the table (the reverse of [`load_dump`]).
///
/// # Errors
///
/// Surfaces adapter errors unmodified.
pub async fn clear_table(session: &MigrationSession, table: &str) -> Result<()> {
    session.adapter().delete(table, &Predicate::new()).await?;
    Ok(())
}

/// Returns whether the table currently has no rows.
///
/// # Errors
///
/// Surfaces adapter errors unmodified.
pub async fn table_is_empty(session: &MigrationSession, table: &str) -> Result<bool> {
    let rows = session
        .adapter()
        .select(table, &[], &Predicate::new())
        .await?;
    Ok(rows.is_empty())
}

/// Dialects whose integer and boolean types carry no size.
fn omits_integer_size(dialect: &str) -> bool {
    matches!(dialect, "sqlite" | "memory" | "postgres" | "postgresql")
}

fn value_to_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::Bool(b)) => (if *b { "1" } else { "0" }).to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn field_to_value(field: &str) -> Value {
    if field == "NULL" {
        return Value::Null;
    }
    if let Ok(i) = field.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        return Value::from(f);
    }
    Value::from(field)
}

fn render_definition(definition: &TableDefinition, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let mut out = format!("{pad}TableDefinition::new(\"{}\")", definition.table_name);
    if let Some(schema) = &definition.schema {
        out.push_str(&format!("\n{pad}    .schema(\"{schema}\")"));
    }
    for column in &definition.columns {
        out.push_str(&format!("\n{pad}    .column({})", render_column(column)));
    }
    for index in &definition.indexes {
        out.push_str(&format!("\n{pad}    .index({})", render_index(index)));
    }
    for reference in &definition.references {
        out.push_str(&format!(
            "\n{pad}    .reference({})",
            render_reference(reference)
        ));
    }
    for (name, value) in &definition.options {
        out.push_str(&format!("\n{pad}    .option(\"{name}\", \"{value}\")"));
    }
    out
}

fn render_column(column: &ColumnDescriptor) -> String {
    let mut out = format!(
        "ColumnDescriptor::new(\"{}\", ColumnType::{:?})",
        column.name, column.column_type
    );
    if let Some(size) = column.size {
        out.push_str(&format!(".size({size})"));
    }
    if let Some(scale) = column.scale {
        out.push_str(&format!(".scale({scale})"));
    }
    if column.unsigned {
        out.push_str(".unsigned()");
    }
    if column.not_null {
        out.push_str(".not_null()");
    }
    if column.auto_increment {
        out.push_str(".auto_increment()");
    }
    if let Some(default) = &column.default {
        out.push_str(&format!(".default({})", render_default(default)));
    }
    out
}

fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Null => "DefaultValue::Null".to_string(),
        DefaultValue::Bool(b) => format!("DefaultValue::Bool({b})"),
        DefaultValue::Integer(i) => format!("DefaultValue::Integer({i})"),
        DefaultValue::Float(f) => format!("DefaultValue::Float({f:?})"),
        DefaultValue::String(s) => format!("DefaultValue::String({s:?}.to_string())"),
        DefaultValue::Expression(e) => format!("DefaultValue::Expression({e:?}.to_string())"),
    }
}

fn render_index(index: &IndexDescriptor) -> String {
    let mut out = format!(
        "IndexDescriptor::new(\"{}\", IndexKind::{:?})",
        index.name, index.kind
    );
    for column in &index.columns {
        out.push_str(&format!(".column(\"{column}\")"));
    }
    out
}

fn render_reference(reference: &ReferenceDescriptor) -> String {
    let mut out = format!(
        "ReferenceDescriptor::new(\"{}\", \"{}\")",
        reference.name, reference.referenced_table
    );
    if let Some(schema) = &reference.referenced_schema {
        out.push_str(&format!(".referenced_schema(\"{schema}\")"));
    }
    for column in &reference.columns {
        out.push_str(&format!(".column(\"{column}\")"));
    }
    for column in &reference.referenced_columns {
        out.push_str(&format!(".referenced_column(\"{column}\")"));
    }
    if reference.on_update != ReferentialAction::NoAction {
        out.push_str(&format!(
            ".on_update(ReferentialAction::{:?})",
            reference.on_update
        ));
    }
    if reference.on_delete != ReferentialAction::NoAction {
        out.push_str(&format!(
            ".on_delete(ReferentialAction::{:?})",
            reference.on_delete
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapter::{MemoryAdapter, SchemaAdapter};
    use crate::diff::Reconciler;
    use crate::registry::is_identifier;
    use crate::schema::{IndexKind, LiveSchema};
    use crate::session::MigrationConfig;

    fn session_with(adapter: Arc<MemoryAdapter>, dir: &std::path::Path) -> MigrationSession {
        MigrationSession::new(adapter, MigrationConfig::new(dir.to_path_buf()))
    }

    fn orders_definition() -> TableDefinition {
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
            .column(ColumnDescriptor::new("user_id", ColumnType::Integer))
            .index(IndexDescriptor::primary(vec!["id".to_string()]))
            .index(IndexDescriptor::new("idx_orders_user", IndexKind::Plain).column("user_id"))
            .reference(
                ReferenceDescriptor::new("fk_orders_user", "users")
                    .column("user_id")
                    .referenced_column("id"),
            )
            .option("ENGINE", "InnoDB")
    }

    #[tokio::test]
    async fn test_snapshot_matches_introspection() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.create_table(&orders_definition()).await.unwrap();
        let session = session_with(adapter.clone(), dir.path());

        let snapshot = SnapshotGenerator::new(&session)
            .snapshot("orders")
            .await
            .unwrap();

        // Re-reconciling the snapshot against the live table is a no-op.
        let live = LiveSchema {
            columns: adapter.describe_columns("orders", None).await.unwrap(),
            indexes: adapter.describe_indexes("orders", None).await.unwrap(),
            references: adapter.describe_references("orders", None).await.unwrap(),
        };
        let ops = Reconciler::new().reconcile(&snapshot, Some(&live)).unwrap();
        assert!(ops.is_empty(), "unexpected operations: {ops:?}");
    }

    #[tokio::test]
    async fn test_snapshot_applies_generation_rules() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MemoryAdapter::new());
        adapter
            .create_table(
                &TableDefinition::new("notes")
                    .column(
                        ColumnDescriptor::new("id", ColumnType::Integer)
                            .not_null()
                            .auto_increment()
                            .default(DefaultValue::Integer(0)),
                    )
                    .column(ColumnDescriptor::new("title", ColumnType::Varchar)),
            )
            .await
            .unwrap();
        let session = session_with(adapter, dir.path());

        let snapshot = SnapshotGenerator::new(&session)
            .snapshot("notes")
            .await
            .unwrap();

        // Auto-increment columns never carry a default in generated units.
        assert!(snapshot.columns[0].default.is_none());
        // Integer sizes are omitted on this dialect; varchar defaults to 1.
        assert!(snapshot.columns[0].size.is_none());
        assert_eq!(snapshot.columns[1].size, Some(1));
    }

    #[tokio::test]
    async fn test_snapshot_missing_table_errors() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(Arc::new(MemoryAdapter::new()), dir.path());
        let result = SnapshotGenerator::new(&session).snapshot("ghost").await;
        assert!(matches!(result, Err(MigrateError::TableNotFound(_))));
    }

    #[tokio::test]
    async fn test_snapshot_all_skips_ledger_table() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.create_table(&orders_definition()).await.unwrap();
        let session = session_with(adapter.clone(), dir.path());

        crate::ledger::MigrationLedger::new(&session)
            .ensure_ledger_table()
            .await
            .unwrap();

        let definitions = SnapshotGenerator::new(&session)
            .snapshot_all()
            .await
            .unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].table_name, "orders");
    }

    #[tokio::test]
    async fn test_next_identifier_is_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(Arc::new(MemoryAdapter::new()), dir.path());
        let identifier = SnapshotGenerator::new(&session).next_identifier("Orders");

        assert!(is_identifier(&identifier), "bad identifier: {identifier}");
        assert!(identifier.ends_with("_create_orders"));
    }

    #[tokio::test]
    async fn test_render_unit() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(Arc::new(MemoryAdapter::new()), dir.path());
        let generator = SnapshotGenerator::new(&session);

        let source = generator
            .render_unit(
                "2023_01_create_orders",
                &orders_definition(),
                ExportData::None,
            )
            .unwrap();

        assert!(source.contains("pub struct CreateOrders;"));
        assert!(source.contains("impl MigrationUnit for CreateOrders"));
        assert!(source.contains("TableDefinition::new(\"orders\")"));
        assert!(source.contains(
            ".column(ColumnDescriptor::new(\"id\", ColumnType::Integer).not_null().auto_increment())"
        ));
        assert!(source.contains("IndexDescriptor::new(\"PRIMARY\", IndexKind::Primary)"));
        assert!(source.contains("ReferenceDescriptor::new(\"fk_orders_user\", \"users\")"));
        assert!(source.contains(".option(\"ENGINE\", \"InnoDB\")"));
        assert!(source.contains("async fn up(&self, _session: &MigrationSession)"));
    }

    #[tokio::test]
    async fn test_render_unit_on_create_guards_on_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(Arc::new(MemoryAdapter::new()), dir.path());
        let generator = SnapshotGenerator::new(&session);

        let source = generator
            .render_unit(
                "2023_01_create_orders",
                &orders_definition(),
                ExportData::OnCreate,
            )
            .unwrap();

        assert!(source.contains("if table_is_empty(session, \"orders\").await? {"));
        assert!(source.contains("load_dump(session, \"orders\""));
        assert!(source.contains("async fn down(&self, _session: &MigrationSession)"));
    }

    #[tokio::test]
    async fn test_generate_writes_unit_file() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.create_table(&orders_definition()).await.unwrap();
        let session = session_with(adapter, dir.path());

        let unit = SnapshotGenerator::new(&session)
            .generate("orders", ExportData::None)
            .await
            .unwrap();

        assert!(unit.path.is_file());
        let written = std::fs::read_to_string(&unit.path).unwrap();
        assert_eq!(written, unit.source);
        assert!(!dir.path().join("orders.dat").exists());
    }

    #[tokio::test]
    async fn test_generate_with_export_dumps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.create_table(&orders_definition()).await.unwrap();
        adapter
            .insert(
                "orders",
                &["id", "reference", "user_id"],
                &[Value::from(1), Value::from("A-100"), Value::Null],
            )
            .await
            .unwrap();
        let session = session_with(adapter, dir.path());

        let unit = SnapshotGenerator::new(&session)
            .generate("orders", ExportData::Always)
            .await
            .unwrap();

        assert!(unit.source.contains("load_dump(session, \"orders\""));
        assert!(unit.source.contains("clear_table(session, \"orders\")"));

        let dump = std::fs::read_to_string(dir.path().join("orders.dat")).unwrap();
        assert_eq!(dump, "1,A-100,NULL\n");
    }

    #[tokio::test]
    async fn test_load_dump_and_clear_table() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.create_table(&orders_definition()).await.unwrap();
        let session = session_with(adapter.clone(), dir.path());

        load_dump(&session, "orders", "1,A-100,NULL\n2,B-200,7\n")
            .await
            .unwrap();

        let rows = adapter
            .select("orders", &[], &Predicate::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("reference"), Some(&Value::from("A-100")));
        assert_eq!(rows[0].get("user_id"), Some(&Value::Null));
        assert_eq!(rows[1].get("user_id"), Some(&Value::from(7)));

        clear_table(&session, "orders").await.unwrap();
        assert!(adapter
            .select("orders", &[], &Predicate::new())
            .await
            .unwrap()
            .is_empty());
    }
}
