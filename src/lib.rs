//! Declarative schema migrations with a batch ledger.
//!
//! `strata-migrate` captures a database table's structural shape as a
//! declarative [`TableDefinition`], computes the minimal set of structural
//! changes needed to reconcile a live schema with that definition, and
//! tracks applied migration units in an ordered ledger so that forward
//! application and rollback are repeatable, idempotent, and auditable.
//!
//! # Architecture
//!
//! - **Schema model** — immutable value types for tables, columns, indexes,
//!   and foreign-key references.
//! - **Diff engine** — [`diff::Reconciler`] turns a desired definition and an
//!   introspected live table into an ordered list of structural operations.
//! - **Ledger** — [`ledger::MigrationLedger`] records applied units by batch
//!   number.
//! - **Executor** — [`executor::MigrationExecutor`] discovers units, drives
//!   their lifecycle hooks, and updates the ledger.
//! - **Snapshot generator** — [`snapshot::SnapshotGenerator`] captures live
//!   tables as definitions and migration unit sources.
//! - **Adapter** — [`adapter::SchemaAdapter`] abstracts introspection, DDL,
//!   and row access; `MemoryAdapter` and `SqliteAdapter` ship with the
//!   crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_migrate::prelude::*;
//!
//! pub struct AddUsers;
//!
//! #[async_trait::async_trait]
//! impl MigrationUnit for AddUsers {
//!     fn morph(&self) -> Option<TableDefinition> {
//!         Some(
//!             TableDefinition::new("users")
//!                 .column(
//!                     ColumnDescriptor::new("id", ColumnType::Integer)
//!                         .not_null()
//!                         .auto_increment(),
//!                 )
//!                 .column(ColumnDescriptor::new("name", ColumnType::Varchar).size(50))
//!                 .index(IndexDescriptor::primary(vec!["id".to_string()])),
//!         )
//!     }
//!
//!     async fn up(&self, _session: &MigrationSession) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn down(&self, _session: &MigrationSession) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> Result<()> {
//! let adapter = Arc::new(SqliteAdapter::connect("app.sqlite3").await?);
//! let session = MigrationSession::new(adapter, MigrationConfig::new("migrations"));
//!
//! let mut registry = MigrationRegistry::new();
//! registry.register("2023_01_add_users", || Box::new(AddUsers))?;
//!
//! let executor = MigrationExecutor::new(&session, &registry);
//! let report = executor.run(None).await?;
//! println!("applied {} unit(s)", report.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod diff;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod operations;
pub mod registry;
pub mod schema;
pub mod session;
pub mod snapshot;

pub use error::{MigrateError, Result};
pub use schema::TableDefinition;

use async_trait::async_trait;
use session::MigrationSession;

/// A migration unit: a named, ordered piece of work that can declare a
/// desired structural definition and/or imperative data changes.
///
/// `morph` and `after_up` default to no-ops; `up` and `down` are the
/// required imperative hooks. The executor calls `morph` first (its
/// definition is reconciled against the live schema), then `up`; the
/// unit is recorded in the ledger only after `up` succeeds, and
/// `after_up` runs last. On a failing `up`, `down` runs as compensation.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Returns the desired structural definition, if the unit declares one.
    fn morph(&self) -> Option<TableDefinition> {
        None
    }

    /// Applies the unit's data-level changes.
    async fn up(&self, session: &MigrationSession) -> Result<()>;

    /// Reverts the unit's changes; also invoked as compensation when `up`
    /// fails.
    async fn down(&self, session: &MigrationSession) -> Result<()>;

    /// Runs after the unit has been applied and recorded.
    async fn after_up(&self, _session: &MigrationSession) -> Result<()> {
        Ok(())
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::adapter::{
        MemoryAdapter, Predicate, Row, SchemaAdapter, SqliteAdapter,
    };
    pub use crate::diff::Reconciler;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{MigrationExecutor, RollbackReport, RunReport, UnitState};
    pub use crate::ledger::{MigrationLedger, MigrationRecord};
    pub use crate::operations::SchemaOp;
    pub use crate::registry::MigrationRegistry;
    pub use crate::schema::{
        ColumnDescriptor, ColumnPosition, ColumnType, DefaultValue, IndexDescriptor, IndexKind,
        LiveSchema, ReferenceDescriptor, ReferentialAction, TableDefinition, PRIMARY_KEY_NAME,
    };
    pub use crate::session::{MigrationConfig, MigrationSession};
    pub use crate::snapshot::{
        clear_table, load_dump, table_is_empty, ExportData, GeneratedUnit, SnapshotGenerator,
    };
    pub use crate::MigrationUnit;
}
