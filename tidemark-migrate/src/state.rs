//! Applied-migration records.

use std::collections::BTreeMap;
use tidemark_core::{Checksum, MigrateConfig, Row, Statement, TidemarkResult, Timestamp};
use tidemark_driver::Executor;
use tracing::debug;

/// One row of the applied-migrations table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRecord {
    pub name: String,
    pub applied_at: Timestamp,
    pub description: String,
    pub checksum: Checksum,
}

impl AppliedRecord {
    fn from_row(row: &Row) -> TidemarkResult<Self> {
        Ok(Self {
            name: row.text("migration_name")?.to_string(),
            applied_at: row.timestamp("applied_at")?,
            description: row.opt_text("description")?.unwrap_or_default().to_string(),
            checksum: row.opt_text("checksum")?.unwrap_or_default().to_string(),
        })
    }
}

/// Reads and writes `keyspace.applied_table`.
pub struct AppliedStore<'a, E: ?Sized> {
    executor: &'a E,
    qualified_table: String,
}

impl<'a, E: Executor + ?Sized> AppliedStore<'a, E> {
    pub fn new(executor: &'a E, config: &MigrateConfig) -> Self {
        Self {
            executor,
            qualified_table: format!("{}.{}", config.keyspace, config.applied_table),
        }
    }

    pub async fn ensure_table(&self) -> TidemarkResult<()> {
        let cql = format!(
            "CREATE TABLE IF NOT EXISTS {} (migration_name text PRIMARY KEY, applied_at timestamp, description text, checksum text)",
            self.qualified_table
        );
        self.executor.execute(&Statement::new(cql)).await?;
        Ok(())
    }

    /// Every applied record, keyed by migration name.
    pub async fn load(&self) -> TidemarkResult<BTreeMap<String, AppliedRecord>> {
        let cql = format!(
            "SELECT migration_name, applied_at, description, checksum FROM {}",
            self.qualified_table
        );
        let rows = self.executor.execute(&Statement::new(cql)).await?;
        let mut applied = BTreeMap::new();
        for row in &rows {
            let record = AppliedRecord::from_row(row)?;
            applied.insert(record.name.clone(), record);
        }
        debug!(table = %self.qualified_table, applied = applied.len(), "loaded applied migrations");
        Ok(applied)
    }

    pub async fn record(&self, record: &AppliedRecord) -> TidemarkResult<()> {
        let statement = Statement::new(format!(
            "INSERT INTO {} (migration_name, applied_at, description, checksum) VALUES (?, ?, ?, ?)",
            self.qualified_table
        ))
        .bind(record.name.as_str())
        .bind(record.applied_at)
        .bind(record.description.as_str())
        .bind(record.checksum.as_str());
        self.executor.execute(&statement).await?;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> TidemarkResult<()> {
        let statement = Statement::new(format!(
            "DELETE FROM {} WHERE migration_name = ?",
            self.qualified_table
        ))
        .bind(name);
        self.executor.execute(&statement).await?;
        Ok(())
    }
}
