//! The migration ledger.
//!
//! A persisted, ordered record of applied migration units. Each record pairs
//! a unit identifier with the batch number it was applied under. The ledger
//! is the sole source of truth for "has this unit been applied", and it is
//! the only component that creates or deletes records.

use serde_json::Value;
use tracing::debug;

use crate::adapter::Predicate;
use crate::error::{MigrateError, Result};
use crate::schema::{ColumnDescriptor, ColumnType, TableDefinition};
use crate::session::MigrationSession;

/// One applied-migration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// The unit's identifier (derived from its filename, unique).
    pub identifier: String,
    /// The batch the unit was applied under.
    pub batch: i64,
}

/// Ledger operations, executed against the target database through the
/// session's schema adapter.
pub struct MigrationLedger<'a> {
    session: &'a MigrationSession,
}

impl<'a> MigrationLedger<'a> {
    /// Creates a ledger view over the session.
    #[must_use]
    pub fn new(session: &'a MigrationSession) -> Self {
        Self { session }
    }

    fn table(&self) -> &str {
        &self.session.config().ledger_table
    }

    fn schema(&self) -> Option<&str> {
        self.session.config().schema.as_deref()
    }

    /// Builds the definition of the ledger's backing table.
    #[must_use]
    pub fn ledger_definition(&self) -> TableDefinition {
        TableDefinition::new(self.table())
            .column(
                ColumnDescriptor::new("migration", ColumnType::Varchar)
                    .size(255)
                    .not_null(),
            )
            .column(ColumnDescriptor::new("batch", ColumnType::Integer).not_null())
    }

    /// Returns whether the ledger's backing table exists.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn ledger_exists(&self) -> Result<bool> {
        self.session
            .adapter()
            .table_exists(self.table(), self.schema())
            .await
    }

    /// Creates the ledger's backing table if absent.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn ensure_ledger_table(&self) -> Result<()> {
        if self.ledger_exists().await? {
            return Ok(());
        }
        debug!(table = %self.table(), "Creating ledger table");
        self.session
            .adapter()
            .create_table(&self.ledger_definition())
            .await
    }

    /// Returns whether the identifier has an applied record.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn is_applied(&self, identifier: &str) -> Result<bool> {
        let rows = self
            .session
            .adapter()
            .select(
                self.table(),
                &["migration"],
                &Predicate::new().eq("migration", identifier),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Returns the batch number the next forward run should use:
    /// `max(batch) + 1`, or 1 when the ledger is empty.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn last_batch(&self) -> Result<i64> {
        Ok(self.max_batch().await?.map_or(1, |max| max + 1))
    }

    /// Returns the current batch number: `max(batch)`, or 1 when the ledger
    /// is empty. This is the default rollback target.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn current_batch(&self) -> Result<i64> {
        Ok(self.max_batch().await?.unwrap_or(1))
    }

    async fn max_batch(&self) -> Result<Option<i64>> {
        let rows = self
            .session
            .adapter()
            .select(self.table(), &["batch"], &Predicate::new())
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("batch").and_then(Value::as_i64))
            .max())
    }

    /// Inserts a record for the identifier under the batch.
    ///
    /// Callers are expected to check [`MigrationLedger::is_applied`] first;
    /// recording an identifier twice is a caller-side logic error.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DuplicateRecord`] when the identifier is
    /// already recorded; adapter errors surface unmodified.
    pub async fn record(&self, identifier: &str, batch: i64) -> Result<()> {
        if self.is_applied(identifier).await? {
            return Err(MigrateError::DuplicateRecord(identifier.to_string()));
        }
        debug!(identifier = %identifier, batch = batch, "Recording migration");
        self.session
            .adapter()
            .insert(
                self.table(),
                &["migration", "batch"],
                &[Value::from(identifier), Value::from(batch)],
            )
            .await
    }

    /// Returns the records of a batch, optionally filtered to one
    /// identifier, ordered by ascending identifier.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn records_for(
        &self,
        batch: i64,
        identifier: Option<&str>,
    ) -> Result<Vec<MigrationRecord>> {
        let mut predicate = Predicate::new().eq("batch", batch);
        if let Some(identifier) = identifier {
            predicate = predicate.eq("migration", identifier);
        }

        let rows = self
            .session
            .adapter()
            .select(self.table(), &["migration", "batch"], &predicate)
            .await?;

        let mut records: Vec<MigrationRecord> = rows
            .iter()
            .filter_map(|row| {
                let identifier = row.get("migration")?.as_str()?.to_string();
                let batch = row.get("batch")?.as_i64()?;
                Some(MigrationRecord { identifier, batch })
            })
            .collect();
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(records)
    }

    /// Deletes the record of the identifier.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn unrecord(&self, identifier: &str) -> Result<()> {
        debug!(identifier = %identifier, "Unrecording migration");
        self.session
            .adapter()
            .delete(
                self.table(),
                &Predicate::new().eq("migration", identifier),
            )
            .await?;
        Ok(())
    }
}
