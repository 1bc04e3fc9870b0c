//! Execution context handed to `Migration::upgrade` / `downgrade`.

use crate::scan::{self, TableScan};
use tidemark_core::{Row, ScanOptions, Statement, TidemarkResult, Value};
use tidemark_driver::Executor;
use tracing::{debug, info};

/// Runs or records the statements a migration issues.
///
/// In dry-run mode nothing reaches the cluster: statements are logged and
/// recorded, `execute` returns no rows, and `scan_table` yields a single
/// sentinel row.
pub struct MigrationContext<'a> {
    executor: &'a dyn Executor,
    keyspace: String,
    dry_run: bool,
    recorded: Vec<Statement>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(executor: &'a dyn Executor, keyspace: impl Into<String>, dry_run: bool) -> Self {
        Self {
            executor,
            keyspace: keyspace.into(),
            dry_run,
            recorded: Vec::new(),
        }
    }

    /// Keyspace the runner is migrating.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn execute(&mut self, cql: &str, params: Vec<Value>) -> TidemarkResult<Vec<Row>> {
        self.execute_statement(Statement::with_params(cql, params)).await
    }

    pub async fn execute_statement(&mut self, statement: Statement) -> TidemarkResult<Vec<Row>> {
        if self.dry_run {
            info!(keyspace = %self.keyspace, cql = %statement.cql, "dry-run statement");
            self.recorded.push(statement);
            return Ok(Vec::new());
        }
        debug!(keyspace = %self.keyspace, cql = %statement.cql, "executing statement");
        let rows = self.executor.execute(&statement).await?;
        self.recorded.push(statement);
        Ok(rows)
    }

    /// Lazily scan `keyspace.table` by token range.
    pub async fn scan_table(
        &self,
        keyspace: &str,
        table: &str,
        options: ScanOptions,
    ) -> TidemarkResult<TableScan<'a>> {
        if self.dry_run {
            options.validate()?;
            return Ok(TableScan::dry_run(keyspace, table));
        }
        scan::scan_table(self.executor, keyspace, table, options).await
    }

    /// Statements issued so far, in order.
    pub fn statements(&self) -> &[Statement] {
        &self.recorded
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.recorded
    }
}
