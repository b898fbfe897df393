//! The migration executor.
//!
//! Discovers migration units in the session's migrations directory, resolves
//! them through the registry, and drives each through its lifecycle:
//!
//! ```text
//! Discovered -> Reconciled -> Applied
//!                        \-> Failed -> RolledBack   (up raised; down ran)
//! ```
//!
//! A unit is recorded in the ledger only after its `up` hook succeeds. When
//! `up` raises, the compensating `down` hook runs (if the unit has one), no
//! record is written, and the remainder of the run is aborted — later units
//! may structurally depend on the failed one.

use tracing::{debug, info, warn};

use crate::diff::Reconciler;
use crate::error::{MigrateError, Result};
use crate::ledger::MigrationLedger;
use crate::registry::{scan_directory, MigrationRegistry};
use crate::session::MigrationSession;

/// Lifecycle states of one unit within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Selected by discovery; no hooks invoked yet (also the final state of
    /// a skipped, already-applied unit).
    Discovered,
    /// The unit's `morph` definition has been reconciled against the live
    /// schema.
    Reconciled,
    /// `up` succeeded and the ledger record was written.
    Applied,
    /// `up` raised.
    Failed,
    /// Compensating `down` ran after a failure.
    RolledBack,
}

/// Per-unit result of a forward run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    /// The unit's identifier.
    pub identifier: String,
    /// The state the unit ended in.
    pub state: UnitState,
}

/// Result of a forward run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// The batch number shared by every unit applied in this run.
    pub batch: i64,
    /// Outcome per discovered unit, in application order.
    pub outcomes: Vec<UnitOutcome>,
}

impl RunReport {
    /// Identifiers applied in this run, in order.
    #[must_use]
    pub fn applied(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == UnitState::Applied)
            .map(|o| o.identifier.as_str())
            .collect()
    }

    /// Number of units applied in this run.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied().len()
    }

    /// Number of units skipped because they were already applied.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == UnitState::Discovered)
            .count()
    }
}

/// Result of a rollback.
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    /// The batch that was rolled back.
    pub batch: i64,
    /// Identifiers reverted, in rollback order (descending).
    pub reverted: Vec<String>,
}

/// Drives forward runs and rollbacks over a session and a unit registry.
pub struct MigrationExecutor<'a> {
    session: &'a MigrationSession,
    registry: &'a MigrationRegistry,
}

impl<'a> MigrationExecutor<'a> {
    /// Creates an executor.
    #[must_use]
    pub fn new(session: &'a MigrationSession, registry: &'a MigrationRegistry) -> Self {
        Self { session, registry }
    }

    /// Idempotently ensures the ledger's backing table exists.
    ///
    /// # Errors
    ///
    /// Surfaces adapter errors unmodified.
    pub async fn install(&self) -> Result<()> {
        MigrationLedger::new(self.session)
            .ensure_ledger_table()
            .await
    }

    /// Applies pending units forward.
    ///
    /// With `target` set, only that unit is considered; otherwise every unit
    /// file in the migrations directory is applied in ascending identifier
    /// order. All units applied by one invocation share the batch number
    /// taken from the ledger at invocation start.
    ///
    /// # Errors
    ///
    /// Adapter-level errors abort the invocation immediately. A failing `up`
    /// hook triggers unit-level compensation and surfaces as
    /// [`MigrateError::HookExecution`].
    pub async fn run(&self, target: Option<&str>) -> Result<RunReport> {
        let identifiers = match target {
            Some(identifier) => vec![identifier.to_string()],
            None => scan_directory(self.session.migrations_dir())?,
        };

        self.install().await?;
        let ledger = MigrationLedger::new(self.session);
        let batch = ledger.last_batch().await?;
        info!(batch = batch, units = identifiers.len(), "Starting forward run");

        // Intermediate diff phases may transiently violate referential
        // integrity (a changed foreign key is dropped before re-adding).
        self.session
            .adapter()
            .set_foreign_key_checks(false)
            .await?;
        let outcome = self.apply_units(&ledger, &identifiers, batch).await;
        let restore = self.session.adapter().set_foreign_key_checks(true).await;

        let report = outcome?;
        restore?;
        info!(applied = report.applied_count(), "Forward run finished");
        Ok(report)
    }

    async fn apply_units(
        &self,
        ledger: &MigrationLedger<'_>,
        identifiers: &[String],
        batch: i64,
    ) -> Result<RunReport> {
        let mut report = RunReport {
            batch,
            ..RunReport::default()
        };

        for identifier in identifiers {
            if ledger.is_applied(identifier).await? {
                debug!(identifier = %identifier, "Already applied, skipping");
                report.outcomes.push(UnitOutcome {
                    identifier: identifier.clone(),
                    state: UnitState::Discovered,
                });
                continue;
            }

            let unit = self.registry.resolve(identifier)?;

            if let Some(desired) = unit.morph() {
                desired.validate()?;
                let live = self
                    .session
                    .introspect(&desired.table_name, desired.schema.as_deref())
                    .await?;
                let ops = Reconciler::new().reconcile(&desired, live.as_ref())?;
                for op in &ops {
                    debug!(
                        identifier = %identifier,
                        operation = %op.description(),
                        "Applying structural operation"
                    );
                    self.session.adapter().apply(op).await.map_err(|e| {
                        e.context(format!("{} (unit '{identifier}')", op.description()))
                    })?;
                }
            }

            match unit.up(self.session).await {
                Ok(()) => {
                    ledger.record(identifier, batch).await?;
                    unit.after_up(self.session).await.map_err(|e| {
                        MigrateError::HookExecution {
                            identifier: identifier.clone(),
                            hook: "afterUp",
                            compensated: false,
                            source: Box::new(e),
                        }
                    })?;
                    info!(identifier = %identifier, batch = batch, "Migration applied");
                    report.outcomes.push(UnitOutcome {
                        identifier: identifier.clone(),
                        state: UnitState::Applied,
                    });
                }
                Err(up_error) => {
                    warn!(
                        identifier = %identifier,
                        error = %up_error,
                        "up hook failed, invoking compensating down"
                    );
                    let compensated = match unit.down(self.session).await {
                        Ok(()) => true,
                        Err(down_error) => {
                            warn!(
                                identifier = %identifier,
                                error = %down_error,
                                "Compensating down also failed"
                            );
                            false
                        }
                    };
                    // No ledger record exists for this unit; the remainder of
                    // the run is aborted because later units may depend on it.
                    return Err(MigrateError::HookExecution {
                        identifier: identifier.clone(),
                        hook: "up",
                        compensated,
                        source: Box::new(up_error),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Rolls back one batch of applied units.
    ///
    /// The target batch defaults to the ledger's current batch and may be
    /// overridden; `target` further restricts the rollback to a single
    /// identifier. Units are reverted in descending identifier order — the
    /// reverse of application order — and unrecorded as they go. `morph` is
    /// not re-run: structural reversal belongs to the unit's `down` hook.
    ///
    /// # Errors
    ///
    /// Adapter-level errors and failing `down` hooks abort the invocation.
    pub async fn rollback(
        &self,
        batch: Option<i64>,
        target: Option<&str>,
    ) -> Result<RollbackReport> {
        if !self.session.migrations_dir().is_dir() {
            return Err(MigrateError::DirectoryNotFound(
                self.session.migrations_dir().to_path_buf(),
            ));
        }

        self.install().await?;
        let ledger = MigrationLedger::new(self.session);
        let batch = match batch {
            Some(batch) => batch,
            None => ledger.current_batch().await?,
        };

        let mut records = ledger.records_for(batch, target).await?;
        records.reverse();
        info!(batch = batch, units = records.len(), "Starting rollback");

        self.session
            .adapter()
            .set_foreign_key_checks(false)
            .await?;
        let outcome = self.revert_records(&ledger, &records, batch).await;
        let restore = self.session.adapter().set_foreign_key_checks(true).await;

        let report = outcome?;
        restore?;
        info!(reverted = report.reverted.len(), "Rollback finished");
        Ok(report)
    }

    async fn revert_records(
        &self,
        ledger: &MigrationLedger<'_>,
        records: &[crate::ledger::MigrationRecord],
        batch: i64,
    ) -> Result<RollbackReport> {
        let mut report = RollbackReport {
            batch,
            ..RollbackReport::default()
        };

        for record in records {
            let unit = self.registry.resolve(&record.identifier)?;
            unit.down(self.session)
                .await
                .map_err(|e| MigrateError::HookExecution {
                    identifier: record.identifier.clone(),
                    hook: "down",
                    compensated: false,
                    source: Box::new(e),
                })?;
            ledger.unrecord(&record.identifier).await?;
            info!(identifier = %record.identifier, "Migration rolled back");
            report.reverted.push(record.identifier.clone());
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapter::{MemoryAdapter, SchemaAdapter};
    use crate::schema::{ColumnDescriptor, ColumnType, TableDefinition};
    use crate::session::MigrationConfig;
    use crate::MigrationUnit;

    struct MarkerUnit {
        name: &'static str,
        definition: Option<TableDefinition>,
        fail_up: bool,
    }

    impl MarkerUnit {
        fn plain(name: &'static str) -> Self {
            Self {
                name,
                definition: None,
                fail_up: false,
            }
        }

        fn with_table(name: &'static str, definition: TableDefinition) -> Self {
            Self {
                name,
                definition: Some(definition),
                fail_up: false,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                definition: None,
                fail_up: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl MigrationUnit for MarkerUnit {
        fn morph(&self) -> Option<TableDefinition> {
            self.definition.clone()
        }

        async fn up(&self, session: &MigrationSession) -> crate::Result<()> {
            session
                .adapter()
                .execute(&format!("UP {}", self.name))
                .await?;
            if self.fail_up {
                return Err(MigrateError::InvalidState(format!(
                    "{} refused to apply",
                    self.name
                )));
            }
            Ok(())
        }

        async fn down(&self, session: &MigrationSession) -> crate::Result<()> {
            session
                .adapter()
                .execute(&format!("DOWN {}", self.name))
                .await?;
            Ok(())
        }
    }

    fn users_definition() -> TableDefinition {
        TableDefinition::new("users")
            .column(
                ColumnDescriptor::new("id", ColumnType::Integer)
                    .not_null()
                    .auto_increment(),
            )
            .column(ColumnDescriptor::new("name", ColumnType::Varchar).size(50))
    }

    struct Fixture {
        adapter: Arc<MemoryAdapter>,
        session: MigrationSession,
        registry: MigrationRegistry,
        _dir: tempfile::TempDir,
    }

    fn fixture(identifiers: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for identifier in identifiers {
            std::fs::write(dir.path().join(format!("{identifier}.rs")), "").unwrap();
        }
        let adapter = Arc::new(MemoryAdapter::new());
        let session = MigrationSession::new(
            adapter.clone(),
            MigrationConfig::new(dir.path().to_path_buf()),
        );
        Fixture {
            adapter,
            session,
            registry: MigrationRegistry::new(),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_run_applies_in_ascending_order() {
        let mut fx = fixture(&["2023_01_add_users", "2023_02_add_orders"]);
        fx.registry
            .register("2023_01_add_users", || {
                Box::new(MarkerUnit::with_table("users", users_definition()))
            })
            .unwrap();
        fx.registry
            .register("2023_02_add_orders", || Box::new(MarkerUnit::plain("orders")))
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        let report = executor.run(None).await.unwrap();

        assert_eq!(report.batch, 1);
        assert_eq!(
            report.applied(),
            vec!["2023_01_add_users", "2023_02_add_orders"]
        );
        assert_eq!(
            fx.adapter.executed_statements(),
            vec!["UP users", "UP orders"]
        );
        assert!(fx.adapter.table_exists("users", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let mut fx = fixture(&["2023_01_add_users"]);
        fx.registry
            .register("2023_01_add_users", || {
                Box::new(MarkerUnit::with_table("users", users_definition()))
            })
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        let first = executor.run(None).await.unwrap();
        assert_eq!(first.applied_count(), 1);

        let second = executor.run(None).await.unwrap();
        assert_eq!(second.applied_count(), 0);
        assert_eq!(second.skipped_count(), 1);

        // The skipped unit's hooks never ran a second time.
        assert_eq!(fx.adapter.executed_statements(), vec!["UP users"]);
    }

    #[tokio::test]
    async fn test_batch_monotonicity() {
        let mut fx = fixture(&["2023_01_add_users", "2023_02_add_orders"]);
        fx.registry
            .register("2023_01_add_users", || Box::new(MarkerUnit::plain("users")))
            .unwrap();
        fx.registry
            .register("2023_02_add_orders", || Box::new(MarkerUnit::plain("orders")))
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);

        let first = executor.run(Some("2023_01_add_users")).await.unwrap();
        assert_eq!(first.batch, 1);

        let second = executor.run(Some("2023_02_add_orders")).await.unwrap();
        assert_eq!(second.batch, 2);

        // A run that applies nothing leaves the ledger's batches untouched.
        let third = executor.run(None).await.unwrap();
        assert_eq!(third.applied_count(), 0);
        let ledger = MigrationLedger::new(&fx.session);
        assert_eq!(ledger.last_batch().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_up_leaves_no_record_and_aborts_run() {
        let mut fx = fixture(&[
            "2023_01_add_users",
            "2023_02_bad_unit",
            "2023_03_add_audit",
        ]);
        fx.registry
            .register("2023_01_add_users", || Box::new(MarkerUnit::plain("users")))
            .unwrap();
        fx.registry
            .register("2023_02_bad_unit", || Box::new(MarkerUnit::failing("bad")))
            .unwrap();
        fx.registry
            .register("2023_03_add_audit", || Box::new(MarkerUnit::plain("audit")))
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        let error = executor.run(None).await.unwrap_err();

        match error {
            MigrateError::HookExecution {
                identifier,
                hook,
                compensated,
                ..
            } => {
                assert_eq!(identifier, "2023_02_bad_unit");
                assert_eq!(hook, "up");
                assert!(compensated);
            }
            other => panic!("Expected HookExecution, got {other:?}"),
        }

        let ledger = MigrationLedger::new(&fx.session);
        assert!(ledger.is_applied("2023_01_add_users").await.unwrap());
        assert!(!ledger.is_applied("2023_02_bad_unit").await.unwrap());
        assert!(!ledger.is_applied("2023_03_add_audit").await.unwrap());

        // The compensating down ran; the third unit never started.
        assert_eq!(
            fx.adapter.executed_statements(),
            vec!["UP users", "UP bad", "DOWN bad"]
        );
    }

    #[tokio::test]
    async fn test_unresolved_unit_aborts_run() {
        let fx = fixture(&["2023_01_add_users"]);
        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        let error = executor.run(None).await.unwrap_err();
        assert!(matches!(error, MigrateError::UnitResolution(id) if id == "2023_01_add_users"));
    }

    #[tokio::test]
    async fn test_missing_directory_errors() {
        let adapter = Arc::new(MemoryAdapter::new());
        let session = MigrationSession::new(
            adapter,
            MigrationConfig::new("/nonexistent/migrations"),
        );
        let registry = MigrationRegistry::new();
        let executor = MigrationExecutor::new(&session, &registry);

        let error = executor.run(None).await.unwrap_err();
        assert!(matches!(error, MigrateError::DirectoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_rollback_reverts_in_descending_order() {
        let mut fx = fixture(&["2023_01_add_users", "2023_02_add_orders"]);
        fx.registry
            .register("2023_01_add_users", || Box::new(MarkerUnit::plain("users")))
            .unwrap();
        fx.registry
            .register("2023_02_add_orders", || Box::new(MarkerUnit::plain("orders")))
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        executor.run(None).await.unwrap();

        let report = executor.rollback(None, None).await.unwrap();
        assert_eq!(report.batch, 1);
        assert_eq!(
            report.reverted,
            vec!["2023_02_add_orders", "2023_01_add_users"]
        );

        let ledger = MigrationLedger::new(&fx.session);
        assert!(!ledger.is_applied("2023_01_add_users").await.unwrap());
        assert!(!ledger.is_applied("2023_02_add_orders").await.unwrap());

        assert_eq!(
            fx.adapter.executed_statements(),
            vec!["UP users", "UP orders", "DOWN orders", "DOWN users"]
        );
    }

    #[tokio::test]
    async fn test_rollback_with_identifier_filter() {
        let mut fx = fixture(&["2023_01_add_users", "2023_02_add_orders"]);
        fx.registry
            .register("2023_01_add_users", || Box::new(MarkerUnit::plain("users")))
            .unwrap();
        fx.registry
            .register("2023_02_add_orders", || Box::new(MarkerUnit::plain("orders")))
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        executor.run(None).await.unwrap();

        let report = executor
            .rollback(None, Some("2023_01_add_users"))
            .await
            .unwrap();
        assert_eq!(report.reverted, vec!["2023_01_add_users"]);

        let ledger = MigrationLedger::new(&fx.session);
        assert!(!ledger.is_applied("2023_01_add_users").await.unwrap());
        assert!(ledger.is_applied("2023_02_add_orders").await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_targets_explicit_batch() {
        let mut fx = fixture(&["2023_01_add_users", "2023_02_add_orders"]);
        fx.registry
            .register("2023_01_add_users", || Box::new(MarkerUnit::plain("users")))
            .unwrap();
        fx.registry
            .register("2023_02_add_orders", || Box::new(MarkerUnit::plain("orders")))
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        executor.run(Some("2023_01_add_users")).await.unwrap();
        executor.run(Some("2023_02_add_orders")).await.unwrap();

        let report = executor.rollback(Some(1), None).await.unwrap();
        assert_eq!(report.reverted, vec!["2023_01_add_users"]);

        let ledger = MigrationLedger::new(&fx.session);
        assert!(ledger.is_applied("2023_02_add_orders").await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_key_checks_are_toggled_around_run() {
        let mut fx = fixture(&["2023_01_add_users"]);
        fx.registry
            .register("2023_01_add_users", || Box::new(MarkerUnit::plain("users")))
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        executor.run(None).await.unwrap();

        assert_eq!(fx.adapter.foreign_key_toggles(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_morph_reconciles_existing_table() {
        let mut fx = fixture(&["2023_01_add_users", "2023_02_widen_name"]);
        fx.registry
            .register("2023_01_add_users", || {
                Box::new(MarkerUnit::with_table("users", users_definition()))
            })
            .unwrap();
        fx.registry
            .register("2023_02_widen_name", || {
                let widened = TableDefinition::new("users")
                    .column(
                        ColumnDescriptor::new("id", ColumnType::Integer)
                            .not_null()
                            .auto_increment(),
                    )
                    .column(ColumnDescriptor::new("name", ColumnType::Varchar).size(120));
                Box::new(MarkerUnit::with_table("widen", widened))
            })
            .unwrap();

        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        executor.run(None).await.unwrap();

        let columns = fx.adapter.describe_columns("users", None).await.unwrap();
        let name = columns.iter().find(|c| c.name == "name").unwrap();
        assert_eq!(name.size, Some(120));
    }

    #[tokio::test]
    async fn test_run_against_sqlite() {
        use crate::adapter::SqliteAdapter;
        use crate::schema::IndexDescriptor;

        struct SeedUsers;

        #[async_trait::async_trait]
        impl MigrationUnit for SeedUsers {
            fn morph(&self) -> Option<TableDefinition> {
                Some(
                    TableDefinition::new("users")
                        .column(
                            ColumnDescriptor::new("id", ColumnType::Integer)
                                .not_null()
                                .auto_increment(),
                        )
                        .column(ColumnDescriptor::new("name", ColumnType::Varchar).size(50))
                        .index(IndexDescriptor::primary(vec!["id".to_string()])),
                )
            }

            async fn up(&self, session: &MigrationSession) -> crate::Result<()> {
                session
                    .adapter()
                    .execute("INSERT INTO users (name) VALUES ('seed')")
                    .await?;
                Ok(())
            }

            async fn down(&self, session: &MigrationSession) -> crate::Result<()> {
                session.adapter().execute("DELETE FROM users").await?;
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2023_01_add_users.rs"), "").unwrap();

        let adapter = Arc::new(SqliteAdapter::connect(":memory:").await.unwrap());
        let session = MigrationSession::new(
            adapter.clone(),
            MigrationConfig::new(dir.path().to_path_buf()),
        );
        let mut registry = MigrationRegistry::new();
        registry
            .register("2023_01_add_users", || Box::new(SeedUsers))
            .unwrap();

        let executor = MigrationExecutor::new(&session, &registry);
        let report = executor.run(None).await.unwrap();
        assert_eq!(report.applied(), vec!["2023_01_add_users"]);
        assert!(adapter.table_exists("users", None).await.unwrap());

        let ledger = MigrationLedger::new(&session);
        assert!(ledger.is_applied("2023_01_add_users").await.unwrap());

        // A second run applies nothing and leaves the ledger untouched.
        let second = executor.run(None).await.unwrap();
        assert_eq!(second.applied_count(), 0);
        assert_eq!(ledger.last_batch().await.unwrap(), 2);

        let rollback = executor.rollback(None, None).await.unwrap();
        assert_eq!(rollback.reverted, vec!["2023_01_add_users"]);
        assert!(!ledger.is_applied("2023_01_add_users").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let fx = fixture(&[]);
        let executor = MigrationExecutor::new(&fx.session, &fx.registry);
        executor.install().await.unwrap();
        executor.install().await.unwrap();

        let ledger = MigrationLedger::new(&fx.session);
        assert!(ledger.ledger_exists().await.unwrap());
    }
}
