//! Blocking facade over the async runner and scanner.
//!
//! Backed by [`BlockingExecutor`], whose futures complete on first poll, so
//! a plain `block_on` drives them without a runtime.

use crate::registry::{MigrationName, MigrationRegistry};
use crate::runner::{RunReport, Runner, StatusReport};
use crate::scan::{self, TableScan};
use futures::executor::block_on;
use tidemark_core::{MigrateConfig, Row, ScanOptions, TidemarkResult};
use tidemark_driver::{BlockingExecutor, Driver};

pub struct BlockingRunner<D> {
    inner: Runner<BlockingExecutor<D>>,
}

impl<D: Driver> BlockingRunner<D> {
    pub fn new(driver: D, registry: MigrationRegistry, config: MigrateConfig) -> TidemarkResult<Self> {
        Ok(Self {
            inner: Runner::new(BlockingExecutor::new(driver), registry, config)?,
        })
    }

    pub fn runner(&self) -> &Runner<BlockingExecutor<D>> {
        &self.inner
    }

    pub fn pending(&self) -> TidemarkResult<Vec<MigrationName>> {
        block_on(self.inner.pending())
    }

    pub fn apply(&self, dry_run: bool, target: Option<&str>) -> TidemarkResult<RunReport> {
        block_on(self.inner.apply(dry_run, target))
    }

    pub fn rollback(&self, steps: usize, dry_run: bool) -> TidemarkResult<RunReport> {
        block_on(self.inner.rollback(steps, dry_run))
    }

    pub fn status(&self) -> TidemarkResult<StatusReport> {
        block_on(self.inner.status())
    }
}

/// Iterator over a token-range scan. Ends after the first error.
pub struct BlockingScan<'a> {
    inner: TableScan<'a>,
}

impl<'a> BlockingScan<'a> {
    pub fn new(inner: TableScan<'a>) -> Self {
        Self { inner }
    }

    pub fn last_completed_token(&self) -> Option<i64> {
        self.inner.last_completed_token()
    }
}

impl Iterator for BlockingScan<'_> {
    type Item = TidemarkResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        block_on(self.inner.next_row()).transpose()
    }
}

pub fn scan_table<'a, D: Driver>(
    executor: &'a BlockingExecutor<D>,
    keyspace: &str,
    table: &str,
    options: ScanOptions,
) -> TidemarkResult<BlockingScan<'a>> {
    block_on(scan::scan_table(executor, keyspace, table, options)).map(BlockingScan::new)
}
