//! Error types for the migration engine.

use std::path::PathBuf;

/// Errors that can occur while diffing, recording, or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Missing or invalid database configuration.
    #[error("Invalid database configuration: {0}")]
    Configuration(String),

    /// The migrations directory does not exist.
    #[error("Migrations directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// The migrations directory exists but cannot be written to.
    #[error("Migrations directory is not writable: {0}")]
    DirectoryUnwritable(PathBuf),

    /// Introspection reported a column type outside the supported enumeration.
    #[error("Unknown column type '{declared}' for column '{column}' of table '{table}'")]
    UnknownColumnType {
        /// Table being introspected.
        table: String,
        /// Column with the unrecognized type.
        column: String,
        /// The declared type text as reported by the database.
        declared: String,
    },

    /// A ledger insert was attempted for an identifier that is already recorded.
    #[error("Migration '{0}' is already recorded in the ledger")]
    DuplicateRecord(String),

    /// A migration unit's identifier has no registered factory.
    #[error("Migration unit '{0}' could not be resolved")]
    UnitResolution(String),

    /// A migration unit's lifecycle hook failed.
    #[error("Hook '{hook}' of migration '{identifier}' failed (compensated: {compensated}): {source}")]
    HookExecution {
        /// Identifier of the failing unit.
        identifier: String,
        /// Which hook raised.
        hook: &'static str,
        /// Whether a compensating `down` ran to completion.
        compensated: bool,
        /// The underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// A filename does not follow the `<date>_<disambiguator>_<name>` format.
    #[error("Invalid migration identifier '{0}'")]
    InvalidIdentifier(String),

    /// A table definition violates a structural invariant.
    #[error("Table '{0}' must define at least one column")]
    EmptyDefinition(String),

    /// The adapter was asked about a table that does not exist.
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    /// An operation the current dialect cannot express.
    #[error("{operation} is not supported by the {dialect} adapter")]
    Unsupported {
        /// Adapter dialect name.
        dialect: &'static str,
        /// Description of the rejected operation.
        operation: String,
    },

    /// The in-memory schema state was driven into an inconsistent transition.
    #[error("Invalid schema state: {0}")]
    InvalidState(String),

    /// Database error surfaced by the SQLite adapter.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (directory scans, artifact writes, data dumps).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error for row values.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error annotated with the table/operation/identifier it occurred in.
    #[error("{context}: {source}")]
    Context {
        /// Human-readable causal context.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Wraps the error with causal context (table, operation, identifier).
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
