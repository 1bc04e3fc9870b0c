//! The migration runner.
//!
//! Per keyspace, each registered migration moves Pending -> Applied on
//! `apply` and back to Pending on `rollback`. The applied-migrations table is
//! the only record of state and is re-read at the start of every operation.
//!
//! Live runs hold the distributed lock for their whole duration, renewing it
//! between migrations, and wait for schema agreement before each migration.
//! Dry runs take no lock, skip the agreement gate and write nothing: the
//! migration bodies run against a context that records their statements.

use crate::agreement::SchemaAgreement;
use crate::context::MigrationContext;
use crate::lock::DistributedLock;
use crate::migration::MigrationEntry;
use crate::registry::{MigrationName, MigrationRegistry};
use crate::state::{AppliedRecord, AppliedStore};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tidemark_core::{
    Held, Lease, MigrateConfig, MigrationError, Statement, TidemarkError, TidemarkResult,
    Timestamp,
};
use tidemark_driver::Executor;
use tidemark_schema::Introspector;
use tracing::{info, warn};

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// What one migration did (or, in dry-run, would have done).
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub name: MigrationName,
    pub statements: Vec<Statement>,
}

/// Result of `apply` or `rollback`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub direction: Direction,
    pub dry_run: bool,
    pub outcomes: Vec<MigrationOutcome>,
}

impl RunReport {
    fn new(direction: Direction, dry_run: bool) -> Self {
        Self {
            direction,
            dry_run,
            outcomes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.outcomes.iter().map(|o| o.name.to_string()).collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match (self.direction, self.dry_run) {
            (Direction::Up, false) => "Applied",
            (Direction::Up, true) => "Would apply",
            (Direction::Down, false) => "Rolled back",
            (Direction::Down, true) => "Would roll back",
        };
        if self.outcomes.is_empty() {
            return writeln!(f, "Nothing to do.");
        }
        for outcome in &self.outcomes {
            writeln!(f, "{} {}", verb, outcome.name)?;
            if self.dry_run {
                for statement in &outcome.statements {
                    writeln!(f, "    {}", statement)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applied {
        applied_at: Timestamp,
        checksum_matches: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub name: MigrationName,
    pub description: String,
    pub state: MigrationState,
}

/// Applied/pending state of every registered migration.
///
/// `orphaned` lists applied records with no registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub keyspace: String,
    pub entries: Vec<StatusEntry>,
    pub orphaned: Vec<AppliedRecord>,
}

impl StatusReport {
    pub fn has_checksum_mismatch(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(
                e.state,
                MigrationState::Applied {
                    checksum_matches: false,
                    ..
                }
            )
        })
    }

    pub fn pending(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == MigrationState::Pending)
    }

    pub fn applied(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.state, MigrationState::Applied { .. }))
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migrations for keyspace {}:", self.keyspace)?;
        for entry in &self.entries {
            match &entry.state {
                MigrationState::Pending => {
                    writeln!(f, "  [pending]  {}  {}", entry.name, entry.description)?
                }
                MigrationState::Applied {
                    applied_at,
                    checksum_matches,
                } => {
                    let flag = if *checksum_matches { "" } else { "  CHECKSUM MISMATCH" };
                    writeln!(
                        f,
                        "  [applied]  {}  {}  ({}){}",
                        entry.name,
                        entry.description,
                        applied_at.format("%Y-%m-%d %H:%M:%S"),
                        flag
                    )?
                }
            }
        }
        for record in &self.orphaned {
            writeln!(f, "  [orphaned] {}  (applied but not registered)", record.name)?;
        }
        Ok(())
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Applies, rolls back and reports on registered migrations for one keyspace.
pub struct Runner<E> {
    executor: E,
    registry: MigrationRegistry,
    config: MigrateConfig,
}

impl<E: Executor> Runner<E> {
    pub fn new(executor: E, registry: MigrationRegistry, config: MigrateConfig) -> TidemarkResult<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            registry,
            config,
        })
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Registered migrations with no applied record, in name order.
    pub async fn pending(&self) -> TidemarkResult<Vec<MigrationName>> {
        let applied = self.read_applied().await?;
        Ok(self
            .registry
            .iter()
            .filter(|(name, _)| !applied.contains_key(&name.to_string()))
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Apply pending migrations in order, stopping after `target` if given.
    pub async fn apply(&self, dry_run: bool, target: Option<&str>) -> TidemarkResult<RunReport> {
        let target = target
            .map(|t| self.registry.resolve_target(t).cloned())
            .transpose()?;
        if dry_run {
            let applied = self.read_applied().await?;
            return self.apply_pending(&applied, target.as_ref(), None, &mut None).await;
        }

        let store = AppliedStore::new(&self.executor, &self.config);
        store.ensure_table().await?;
        let lock = DistributedLock::new(&self.executor, &self.config);
        let mut lease = self.acquire(&lock).await?;
        let result = async {
            let applied = store.load().await?;
            self.apply_pending(&applied, target.as_ref(), Some(&lock), &mut lease)
                .await
        }
        .await;
        self.release(&lock, lease).await;
        result
    }

    /// Roll back the `steps` most recently applied migrations, newest first.
    pub async fn rollback(&self, steps: usize, dry_run: bool) -> TidemarkResult<RunReport> {
        if dry_run {
            let applied = self.read_applied().await?;
            return self.rollback_applied(&applied, steps, None, &mut None).await;
        }

        let store = AppliedStore::new(&self.executor, &self.config);
        store.ensure_table().await?;
        let lock = DistributedLock::new(&self.executor, &self.config);
        let mut lease = self.acquire(&lock).await?;
        let result = async {
            let applied = store.load().await?;
            self.rollback_applied(&applied, steps, Some(&lock), &mut lease)
                .await
        }
        .await;
        self.release(&lock, lease).await;
        result
    }

    /// Applied/pending state plus checksum comparison. Never writes.
    pub async fn status(&self) -> TidemarkResult<StatusReport> {
        let mut applied = self.read_applied().await?;
        let mut entries = Vec::with_capacity(self.registry.len());
        for (name, entry) in self.registry.iter() {
            let state = match applied.remove(&name.to_string()) {
                None => MigrationState::Pending,
                Some(record) => {
                    let checksum_matches = record.checksum == entry.checksum();
                    if !checksum_matches {
                        warn!(
                            migration = %name,
                            recorded = %record.checksum,
                            current = %entry.checksum(),
                            "migration changed after it was applied"
                        );
                    }
                    MigrationState::Applied {
                        applied_at: record.applied_at,
                        checksum_matches,
                    }
                }
            };
            entries.push(StatusEntry {
                name: name.clone(),
                description: entry.description().to_string(),
                state,
            });
        }
        Ok(StatusReport {
            keyspace: self.config.keyspace.clone(),
            entries,
            orphaned: applied.into_values().collect(),
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Applied records without creating anything: a missing table means
    /// nothing has been applied yet.
    async fn read_applied(&self) -> TidemarkResult<BTreeMap<String, AppliedRecord>> {
        let exists = Introspector::new(&self.executor)
            .table_exists(&self.config.keyspace, &self.config.applied_table)
            .await?;
        if !exists {
            return Ok(BTreeMap::new());
        }
        AppliedStore::new(&self.executor, &self.config).load().await
    }

    /// Both bookkeeping tables must have settled cluster-wide before the
    /// first conditional write against them.
    async fn acquire(&self, lock: &DistributedLock<'_, E>) -> TidemarkResult<Option<Lease<Held>>> {
        lock.ensure_table().await?;
        self.await_agreement().await?;
        Ok(Some(lock.acquire().await?))
    }

    /// Always attempted once a run ends. A lease lost during the run is
    /// already gone and is not released.
    async fn release(&self, lock: &DistributedLock<'_, E>, lease: Option<Lease<Held>>) {
        if let Some(lease) = lease {
            if let Err(err) = lock.release(lease).await {
                warn!(lock_id = %self.config.lock_id, error = %err, "failed to release migration lock");
            }
        }
    }

    async fn apply_pending(
        &self,
        applied: &BTreeMap<String, AppliedRecord>,
        target: Option<&MigrationName>,
        lock: Option<&DistributedLock<'_, E>>,
        lease: &mut Option<Lease<Held>>,
    ) -> TidemarkResult<RunReport> {
        let dry_run = lock.is_none();
        let mut report = RunReport::new(Direction::Up, dry_run);
        let todo: Vec<(&MigrationName, &MigrationEntry)> = self
            .registry
            .iter()
            .filter(|(name, _)| !applied.contains_key(&name.to_string()))
            .take_while(|(name, _)| target.map_or(true, |t| *name <= t))
            .collect();
        if todo.is_empty() {
            info!(keyspace = %self.config.keyspace, "no pending migrations");
            return Ok(report);
        }

        let store = AppliedStore::new(&self.executor, &self.config);
        for (index, (name, entry)) in todo.into_iter().enumerate() {
            if let Some(lock) = lock {
                if index > 0 {
                    renew(lock, lease).await?;
                }
                self.await_agreement().await?;
            }

            let started = Instant::now();
            info!(migration = %name, keyspace = %self.config.keyspace, dry_run, "applying migration");
            let mut ctx = MigrationContext::new(&self.executor, self.config.keyspace.as_str(), dry_run);
            entry
                .migration()
                .upgrade(&mut ctx)
                .await
                .map_err(|err| operation_failed(name, err))?;

            if !dry_run {
                store
                    .record(&AppliedRecord {
                        name: name.to_string(),
                        applied_at: Utc::now(),
                        description: entry.description().to_string(),
                        checksum: entry.checksum().to_string(),
                    })
                    .await?;
            }
            info!(
                migration = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                statements = ctx.statements().len(),
                "migration applied"
            );
            report.outcomes.push(MigrationOutcome {
                name: name.clone(),
                statements: ctx.into_statements(),
            });
        }
        Ok(report)
    }

    async fn rollback_applied(
        &self,
        applied: &BTreeMap<String, AppliedRecord>,
        steps: usize,
        lock: Option<&DistributedLock<'_, E>>,
        lease: &mut Option<Lease<Held>>,
    ) -> TidemarkResult<RunReport> {
        let dry_run = lock.is_none();
        let mut report = RunReport::new(Direction::Down, dry_run);

        let mut records: Vec<&AppliedRecord> = applied.values().collect();
        records.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then_with(|| b.name.cmp(&a.name))
        });

        // Every selected migration must be registered and reversible before
        // anything runs.
        let mut selected = Vec::new();
        for record in records.into_iter().take(steps) {
            let (name, entry) = self.registry.get(&record.name).ok_or_else(|| {
                MigrationError::NotRegistered {
                    name: record.name.clone(),
                }
            })?;
            if !entry.migration().reversible() {
                return Err(MigrationError::Irreversible {
                    name: name.to_string(),
                }
                .into());
            }
            selected.push((name, entry));
        }

        let store = AppliedStore::new(&self.executor, &self.config);
        for (index, (name, entry)) in selected.into_iter().enumerate() {
            if let Some(lock) = lock {
                if index > 0 {
                    renew(lock, lease).await?;
                }
                self.await_agreement().await?;
            }

            let started = Instant::now();
            info!(migration = %name, keyspace = %self.config.keyspace, dry_run, "rolling back migration");
            let mut ctx = MigrationContext::new(&self.executor, self.config.keyspace.as_str(), dry_run);
            entry
                .migration()
                .downgrade(&mut ctx)
                .await
                .map_err(|err| operation_failed(name, err))?;

            if !dry_run {
                store.remove(&name.to_string()).await?;
            }
            info!(
                migration = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "migration rolled back"
            );
            report.outcomes.push(MigrationOutcome {
                name: name.clone(),
                statements: ctx.into_statements(),
            });
        }
        Ok(report)
    }

    async fn await_agreement(&self) -> TidemarkResult<()> {
        SchemaAgreement::from_config(&self.executor, &self.config)
            .wait()
            .await?;
        Ok(())
    }
}

/// Renew the lease in `slot`. A lost lease is dropped so the caller does not
/// delete a lock row that now belongs to someone else.
async fn renew<E: Executor>(
    lock: &DistributedLock<'_, E>,
    slot: &mut Option<Lease<Held>>,
) -> TidemarkResult<()> {
    let Some(lease) = slot.as_ref() else {
        return Ok(());
    };
    match lock.renew(lease).await {
        Ok(renewed) => {
            *slot = Some(renewed);
            Ok(())
        }
        Err(err) => {
            if matches!(err, TidemarkError::Migration(MigrationError::LockLost { .. })) {
                warn!(lock_id = %lease.lock_id(), "migration lock lost, stopping");
                *slot = None;
            }
            Err(err)
        }
    }
}

fn operation_failed(name: &MigrationName, err: TidemarkError) -> TidemarkError {
    MigrationError::OperationFailed {
        name: name.to_string(),
        reason: err.to_string(),
    }
    .into()
}
