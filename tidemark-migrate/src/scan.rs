//! Resumable, throttled token-range table scanner.
//!
//! The ring `[i64::MIN, i64::MAX]` is split into `num_ranges` contiguous
//! ranges `(lower, upper]`, walked in ascending order. Each range is read with
//! a paged `token(...)` query. Rows are produced lazily: a page is fetched
//! only once the previous one has been consumed.
//!
//! Progress is logged at every 10% of completed ranges together with the
//! lower bound of the last completed range. Passing that value back as
//! `resume_token` skips every range already done.

use futures::Stream;
use std::collections::VecDeque;
use std::time::Instant;
use tidemark_core::{
    MigrationError, PagingState, Row, ScanOptions, Statement, TidemarkResult, Value,
};
use tidemark_driver::Executor;
use tidemark_schema::Introspector;

/// Split the full token ring into `n` contiguous `(lower, upper]` ranges.
///
/// The first lower bound is `i64::MIN`, the last upper bound `i64::MAX`, and
/// each upper bound is the next range's lower bound.
pub fn token_ranges(n: usize) -> Vec<(i64, i64)> {
    let n = n.max(1) as i128;
    let min = i64::MIN as i128;
    let span = i64::MAX as i128 - min;
    let bound = |i: i128| (min + span * i / n) as i64;
    (0..n).map(|i| (bound(i), bound(i + 1))).collect()
}

#[derive(Debug)]
struct RangeCursor {
    lower: i64,
    upper: i64,
    paging: Option<PagingState>,
    exhausted: bool,
}

/// A lazy scan over one table. Drive it with [`TableScan::next_row`] or turn
/// it into a [`Stream`].
pub struct TableScan<'a> {
    executor: Option<&'a dyn Executor>,
    qualified_table: String,
    select_cql: String,
    options: ScanOptions,
    ranges: VecDeque<(i64, i64)>,
    cursor: Option<RangeCursor>,
    buffer: VecDeque<Row>,
    sentinel: Option<Row>,
    total_ranges: usize,
    completed_ranges: usize,
    logged_decile: usize,
    checkpoints: Vec<i64>,
    last_completed: Option<i64>,
    failed: bool,
    started: Instant,
}

impl<'a> TableScan<'a> {
    /// Scan `keyspace.table` partitioned by `partition_keys`.
    pub fn new(
        executor: &'a dyn Executor,
        keyspace: &str,
        table: &str,
        partition_keys: &[String],
        options: ScanOptions,
    ) -> TidemarkResult<Self> {
        options.validate()?;
        let token_expr = format!("token({})", partition_keys.join(", "));
        let select_cql = format!(
            "SELECT * FROM {}.{} WHERE {} > ? AND {} <= ?",
            keyspace, table, token_expr, token_expr
        );
        let ranges: VecDeque<(i64, i64)> = token_ranges(options.num_ranges)
            .into_iter()
            .filter(|(lower, _)| options.resume_token.map_or(true, |t| *lower > t))
            .collect();
        Ok(Self {
            executor: Some(executor),
            qualified_table: format!("{}.{}", keyspace, table),
            select_cql,
            total_ranges: ranges.len(),
            ranges,
            options,
            cursor: None,
            buffer: VecDeque::new(),
            sentinel: None,
            completed_ranges: 0,
            logged_decile: 0,
            checkpoints: Vec::new(),
            last_completed: None,
            failed: false,
            started: Instant::now(),
        })
    }

    /// A scan that performs no I/O and yields exactly one dry-run sentinel row.
    pub fn dry_run(keyspace: &str, table: &str) -> Self {
        Self {
            executor: None,
            qualified_table: format!("{}.{}", keyspace, table),
            select_cql: String::new(),
            options: ScanOptions::default(),
            ranges: VecDeque::new(),
            cursor: None,
            buffer: VecDeque::new(),
            sentinel: Some(Row::dry_run_sentinel()),
            total_ranges: 0,
            completed_ranges: 0,
            logged_decile: 0,
            checkpoints: Vec::new(),
            last_completed: None,
            failed: false,
            started: Instant::now(),
        }
    }

    /// Lower bound of the most recently completed range.
    pub fn last_completed_token(&self) -> Option<i64> {
        self.last_completed
    }

    /// Resume tokens carried by the progress log, one per tenth of the ranges
    /// completed.
    pub fn checkpoints(&self) -> &[i64] {
        &self.checkpoints
    }

    /// `(completed, total)` ranges.
    pub fn progress(&self) -> (usize, usize) {
        (self.completed_ranges, self.total_ranges)
    }

    /// Next row, or `None` once every range is exhausted.
    ///
    /// After an error the scan is finished; resume with a new scan from
    /// [`TableScan::last_completed_token`].
    pub async fn next_row(&mut self) -> TidemarkResult<Option<Row>> {
        let Some(executor) = self.executor else {
            return Ok(self.sentinel.take());
        };
        if self.failed {
            return Ok(None);
        }
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            match self.cursor.take() {
                Some(cursor) if cursor.exhausted => {
                    self.complete_range(executor, cursor.lower).await;
                }
                Some(mut cursor) => {
                    if let Err(err) = self.fetch(executor, &mut cursor).await {
                        self.failed = true;
                        return Err(err);
                    }
                    self.cursor = Some(cursor);
                }
                None => match self.ranges.pop_front() {
                    Some((lower, upper)) => {
                        self.cursor = Some(RangeCursor {
                            lower,
                            upper,
                            paging: None,
                            exhausted: false,
                        });
                    }
                    None => return Ok(None),
                },
            }
        }
    }

    async fn fetch(&mut self, executor: &dyn Executor, cursor: &mut RangeCursor) -> TidemarkResult<()> {
        let statement = Statement::new(self.select_cql.as_str())
            .bind(Value::BigInt(cursor.lower))
            .bind(Value::BigInt(cursor.upper));
        let page = executor
            .execute_page(&statement, self.options.page_size, cursor.paging.take())
            .await?;
        self.buffer.extend(page.rows);
        cursor.exhausted = page.paging_state.is_none();
        cursor.paging = page.paging_state;
        Ok(())
    }

    async fn complete_range(&mut self, executor: &dyn Executor, lower: i64) {
        self.completed_ranges += 1;
        self.last_completed = Some(lower);
        let decile = self.completed_ranges * 10 / self.total_ranges.max(1);
        if decile > self.logged_decile {
            self.logged_decile = decile;
            self.checkpoints.push(lower);
            tracing::info!(
                table = %self.qualified_table,
                completed = self.completed_ranges,
                total = self.total_ranges,
                resume_token = lower,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "scan progress"
            );
        }
        executor.pause(self.options.throttle).await;
    }

    /// Consume the scan as a stream of rows. The stream ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = TidemarkResult<Row>> + Send + 'a {
        futures::stream::unfold(self, |mut scan| async move {
            match scan.next_row().await {
                Ok(Some(row)) => Some((Ok(row), scan)),
                Ok(None) => None,
                Err(err) => Some((Err(err), scan)),
            }
        })
    }
}

/// Introspect the partition key of `keyspace.table` and start a scan.
pub async fn scan_table<'a>(
    executor: &'a dyn Executor,
    keyspace: &str,
    table: &str,
    options: ScanOptions,
) -> TidemarkResult<TableScan<'a>> {
    let snapshot = Introspector::new(executor).introspect(keyspace, table).await?;
    if !snapshot.exists {
        return Err(MigrationError::UnknownTable {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
        }
        .into());
    }
    let partition_keys: Vec<String> = snapshot
        .partition_keys()
        .into_iter()
        .map(|c| c.name.clone())
        .collect();
    TableScan::new(executor, keyspace, table, &partition_keys, options)
}
