//! In-memory cluster double.
//!
//! `MockCluster` understands the CQL subset Tidemark emits: table and index
//! DDL, plain and conditional writes with TTL, equality and token-range
//! selects, and reads of the schema catalog (`system_schema.tables`,
//! `system_schema.columns`, `system_schema.indexes`) plus `system.local` and
//! `system.peers`. Every DDL statement bumps the local schema version; peers
//! can be made to lag behind for a number of polls.
//!
//! It also records every statement it receives, can be told to fail any
//! statement containing a given fragment, and runs on a manual clock so TTL
//! expiry is deterministic.

mod cql;

use self::cql::{Command, TokenFilter};
use crate::{AsyncDriver, Driver};
use ::async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tidemark_core::row::APPLIED_COLUMN;
use tidemark_core::{
    DriverError, KeyRole, LiveColumn, Page, PagingState, Row, Statement, TidemarkResult,
    Timestamp, Value,
};
use uuid::Uuid;

// ============================================================================
// STATE
// ============================================================================

/// TTLs apply per cell, as in CQL: `INSERT` writes a row marker and the
/// listed cells, `UPDATE` writes only the assigned cells. A row stays visible
/// while its marker or any non-key cell is live.
#[derive(Debug, Clone)]
struct StoredRow {
    cells: BTreeMap<String, Value>,
    cell_expiry: BTreeMap<String, Timestamp>,
    marker: bool,
    marker_expires_at: Option<Timestamp>,
}

impl StoredRow {
    fn cell(&self, name: &str) -> &Value {
        self.cells.get(name).unwrap_or(&Value::Null)
    }

    fn write(&mut self, values: Vec<(String, Value)>, key_names: &[String], expires_at: Option<Timestamp>) {
        for (name, value) in values {
            if !key_names.contains(&name) {
                match expires_at {
                    Some(at) => self.cell_expiry.insert(name.clone(), at),
                    None => self.cell_expiry.remove(&name),
                };
            }
            self.cells.insert(name, value);
        }
    }

    /// Drop expired cells; false once nothing keeps the row alive.
    fn purge(&mut self, now: Timestamp, key_names: &[String]) -> bool {
        let expired: Vec<String> = self
            .cell_expiry
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in expired {
            self.cell_expiry.remove(&name);
            self.cells.remove(&name);
        }
        if self.marker_expires_at.is_some_and(|at| at <= now) {
            self.marker = false;
            self.marker_expires_at = None;
        }
        self.marker
            || self
                .cells
                .iter()
                .any(|(name, value)| !key_names.contains(name) && !value.is_null())
    }
}

#[derive(Debug, Clone, Default)]
struct TableState {
    columns: Vec<LiveColumn>,
    rows: Vec<StoredRow>,
}

impl TableState {
    fn require_column(&self, name: &str) -> Result<(), String> {
        if self.columns.iter().any(|c| c.name == name) {
            Ok(())
        } else {
            Err(format!("undefined column name {}", name))
        }
    }

    fn key_names(&self, role: KeyRole) -> Vec<String> {
        let mut keys: Vec<&LiveColumn> =
            self.columns.iter().filter(|c| c.key_role == role).collect();
        keys.sort_by_key(|c| c.ordinal);
        keys.into_iter().map(|c| c.name.clone()).collect()
    }

    fn primary_key_names(&self) -> Vec<String> {
        let mut names = self.key_names(KeyRole::PartitionKey);
        names.extend(self.key_names(KeyRole::Clustering));
        names
    }

    /// Primary key values taken from `cells`; every key column must be bound.
    fn key_of(&self, cells: &[(String, Value)]) -> Result<Vec<Value>, String> {
        self.primary_key_names()
            .into_iter()
            .map(|name| match cells.iter().find(|(n, _)| *n == name) {
                Some((_, v)) if !v.is_null() => Ok(v.clone()),
                _ => Err(format!("missing primary key column {}", name)),
            })
            .collect()
    }

    fn find(&self, key: &[Value]) -> Option<usize> {
        let names = self.primary_key_names();
        self.rows.iter().position(|row| {
            names
                .iter()
                .zip(key)
                .all(|(n, v)| same_value(row.cell(n), v))
        })
    }

    fn token_of(&self, row: &StoredRow) -> i64 {
        let values: Vec<Value> = self
            .key_names(KeyRole::PartitionKey)
            .iter()
            .map(|n| row.cell(n).clone())
            .collect();
        MockCluster::token_for(&values)
    }

    fn to_row(&self, stored: &StoredRow, projection: Option<&[String]>) -> Row {
        let mut row = Row::new();
        match projection {
            Some(names) => {
                for name in names {
                    row.push(name.clone(), stored.cell(name).clone());
                }
            }
            None => {
                for col in &self.columns {
                    row.push(col.name.clone(), stored.cell(&col.name).clone());
                }
            }
        }
        row
    }

    /// Live rows ordered by token, insertion order within a token.
    fn ordered(&self) -> Vec<(i64, &StoredRow)> {
        let mut rows: Vec<(i64, &StoredRow)> =
            self.rows.iter().map(|r| (self.token_of(r), r)).collect();
        rows.sort_by_key(|(t, _)| *t);
        rows
    }
}

#[derive(Debug, Clone)]
struct IndexState {
    table: String,
    column: String,
}

#[derive(Debug, Clone)]
struct Peer {
    address: String,
    schema_version: Uuid,
}

#[derive(Debug)]
struct ClusterState {
    tables: BTreeMap<(String, String), TableState>,
    indexes: BTreeMap<(String, String), IndexState>,
    local_version: Uuid,
    peers: Vec<Peer>,
    peer_lag: usize,
    now: Timestamp,
    failures: Vec<String>,
    log: Vec<Statement>,
}

impl ClusterState {
    fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            indexes: BTreeMap::new(),
            local_version: Uuid::new_v4(),
            peers: Vec::new(),
            peer_lag: 0,
            now: Utc::now(),
            failures: Vec::new(),
            log: Vec::new(),
        }
    }

    fn bump_version(&mut self) {
        self.local_version = Uuid::new_v4();
    }

    fn purge_expired(&mut self) {
        let now = self.now;
        for table in self.tables.values_mut() {
            let key_names = table.primary_key_names();
            table.rows.retain_mut(|r| r.purge(now, &key_names));
        }
    }

    fn table(&self, keyspace: &str, table: &str) -> Result<&TableState, String> {
        self.tables
            .get(&(keyspace.to_string(), table.to_string()))
            .ok_or_else(|| format!("unconfigured table {}.{}", keyspace, table))
    }

    fn table_mut(&mut self, keyspace: &str, table: &str) -> Result<&mut TableState, String> {
        self.tables
            .get_mut(&(keyspace.to_string(), table.to_string()))
            .ok_or_else(|| format!("unconfigured table {}.{}", keyspace, table))
    }

    fn expiry(&self, ttl: Option<i64>) -> Option<Timestamp> {
        ttl.filter(|secs| *secs > 0)
            .map(|secs| self.now + chrono::Duration::seconds(secs))
    }

    fn apply(&mut self, command: Command) -> Result<Vec<Row>, String> {
        match command {
            Command::CreateTable {
                keyspace,
                table,
                if_not_exists,
                columns,
            } => {
                let key = (keyspace, table);
                if self.tables.contains_key(&key) {
                    if if_not_exists {
                        return Ok(Vec::new());
                    }
                    return Err(format!("table {}.{} already exists", key.0, key.1));
                }
                self.tables.insert(
                    key,
                    TableState {
                        columns,
                        rows: Vec::new(),
                    },
                );
                self.bump_version();
                Ok(Vec::new())
            }

            Command::DropTable {
                keyspace,
                table,
                if_exists,
            } => {
                if self
                    .tables
                    .remove(&(keyspace.clone(), table.clone()))
                    .is_none()
                {
                    if if_exists {
                        return Ok(Vec::new());
                    }
                    return Err(format!("unconfigured table {}.{}", keyspace, table));
                }
                self.indexes
                    .retain(|(ks, _), idx| !(*ks == keyspace && idx.table == table));
                self.bump_version();
                Ok(Vec::new())
            }

            Command::AlterAdd {
                keyspace,
                table,
                column,
                wire_type,
                is_static,
            } => {
                let state = self.table_mut(&keyspace, &table)?;
                if state.require_column(&column).is_ok() {
                    return Err(format!("column {} already exists", column));
                }
                state.columns.push(LiveColumn {
                    name: column,
                    wire_type,
                    key_role: if is_static {
                        KeyRole::Static
                    } else {
                        KeyRole::Regular
                    },
                    ordinal: -1,
                    sort_order: Default::default(),
                });
                self.bump_version();
                Ok(Vec::new())
            }

            Command::AlterDrop {
                keyspace,
                table,
                column,
            } => {
                let state = self.table_mut(&keyspace, &table)?;
                let pos = state
                    .columns
                    .iter()
                    .position(|c| c.name == column)
                    .ok_or_else(|| format!("column {} was not found", column))?;
                if state.columns[pos].key_role.is_key() {
                    return Err(format!("cannot drop primary key column {}", column));
                }
                state.columns.remove(pos);
                for row in state.rows.iter_mut() {
                    row.cells.remove(&column);
                }
                self.indexes.retain(|(ks, _), idx| {
                    !(*ks == keyspace && idx.table == table && idx.column == column)
                });
                self.bump_version();
                Ok(Vec::new())
            }

            Command::AlterType {
                keyspace,
                table,
                column,
                wire_type,
            } => {
                let state = self.table_mut(&keyspace, &table)?;
                let col = state
                    .columns
                    .iter_mut()
                    .find(|c| c.name == column)
                    .ok_or_else(|| format!("column {} was not found", column))?;
                col.wire_type = wire_type;
                self.bump_version();
                Ok(Vec::new())
            }

            Command::CreateIndex {
                keyspace,
                table,
                name,
                column,
                if_not_exists,
            } => {
                self.table(&keyspace, &table)?.require_column(&column)?;
                let key = (keyspace, name);
                if self.indexes.contains_key(&key) {
                    if if_not_exists {
                        return Ok(Vec::new());
                    }
                    return Err(format!("index {} already exists", key.1));
                }
                self.indexes.insert(key, IndexState { table, column });
                self.bump_version();
                Ok(Vec::new())
            }

            Command::DropIndex {
                keyspace,
                name,
                if_exists,
            } => {
                if self.indexes.remove(&(keyspace, name.clone())).is_none() {
                    if if_exists {
                        return Ok(Vec::new());
                    }
                    return Err(format!("index {} could not be found", name));
                }
                self.bump_version();
                Ok(Vec::new())
            }

            Command::Insert {
                keyspace,
                table,
                values,
                if_not_exists,
                ttl,
            } => {
                let expires_at = self.expiry(ttl);
                let state = self.table_mut(&keyspace, &table)?;
                for (name, _) in &values {
                    state.require_column(name)?;
                }
                let key = state.key_of(&values)?;
                let existing = state.find(&key);
                if if_not_exists {
                    if let Some(idx) = existing {
                        let mut row = Row::new().with(APPLIED_COLUMN, false);
                        for (n, v) in state.to_row(&state.rows[idx], None).iter() {
                            row.push(n, v.clone());
                        }
                        return Ok(vec![row]);
                    }
                }
                let key_names = state.primary_key_names();
                let idx = match existing {
                    Some(idx) => idx,
                    None => {
                        state.rows.push(StoredRow {
                            cells: BTreeMap::new(),
                            cell_expiry: BTreeMap::new(),
                            marker: true,
                            marker_expires_at: None,
                        });
                        state.rows.len() - 1
                    }
                };
                let stored = &mut state.rows[idx];
                stored.marker = true;
                stored.marker_expires_at = expires_at;
                stored.write(values, &key_names, expires_at);
                Ok(applied_outcome(if_not_exists))
            }

            Command::Update {
                keyspace,
                table,
                ttl,
                assignments,
                filters,
                conditions,
            } => {
                let expires_at = self.expiry(ttl);
                let state = self.table_mut(&keyspace, &table)?;
                for (name, _) in assignments.iter().chain(&conditions) {
                    state.require_column(name)?;
                }
                let key = state.key_of(&filters)?;
                let existing = state.find(&key);
                let conditional = !conditions.is_empty();
                if conditional {
                    let Some(idx) = existing else {
                        return Ok(vec![Row::new().with(APPLIED_COLUMN, false)]);
                    };
                    let stored = &state.rows[idx];
                    if conditions
                        .iter()
                        .any(|(n, v)| !same_value(stored.cell(n), v))
                    {
                        let mut row = Row::new().with(APPLIED_COLUMN, false);
                        for (n, _) in &conditions {
                            row.push(n.clone(), stored.cell(n).clone());
                        }
                        return Ok(vec![row]);
                    }
                }
                let key_names = state.primary_key_names();
                let idx = match existing {
                    Some(idx) => idx,
                    None => {
                        state.rows.push(StoredRow {
                            cells: filters.into_iter().collect(),
                            cell_expiry: BTreeMap::new(),
                            marker: false,
                            marker_expires_at: None,
                        });
                        state.rows.len() - 1
                    }
                };
                state.rows[idx].write(assignments, &key_names, expires_at);
                Ok(applied_outcome(conditional))
            }

            Command::Delete {
                keyspace,
                table,
                filters,
            } => {
                let state = self.table_mut(&keyspace, &table)?;
                for (name, _) in &filters {
                    state.require_column(name)?;
                }
                state
                    .rows
                    .retain(|r| !filters.iter().all(|(n, v)| same_value(r.cell(n), v)));
                Ok(Vec::new())
            }

            Command::Select {
                keyspace,
                table,
                projection,
                filters,
                token_filter,
                limit,
            } => {
                let mut rows = if keyspace == "system_schema" || keyspace == "system" {
                    self.select_catalog(&keyspace, &table, projection.as_deref(), &filters)?
                } else {
                    self.select_table(
                        &keyspace,
                        &table,
                        projection.as_deref(),
                        &filters,
                        token_filter.as_ref(),
                    )?
                };
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                Ok(rows)
            }
        }
    }

    fn select_table(
        &self,
        keyspace: &str,
        table: &str,
        projection: Option<&[String]>,
        filters: &[(String, Value)],
        token_filter: Option<&TokenFilter>,
    ) -> Result<Vec<Row>, String> {
        let state = self.table(keyspace, table)?;
        for name in projection.unwrap_or(&[]) {
            state.require_column(name)?;
        }
        for (name, _) in filters {
            state.require_column(name)?;
        }
        Ok(state
            .ordered()
            .into_iter()
            .filter(|(token, _)| token_filter.map_or(true, |f| f.contains(*token)))
            .filter(|(_, r)| filters.iter().all(|(n, v)| same_value(r.cell(n), v)))
            .map(|(_, r)| state.to_row(r, projection))
            .collect())
    }

    fn select_catalog(
        &mut self,
        keyspace: &str,
        table: &str,
        projection: Option<&[String]>,
        filters: &[(String, Value)],
    ) -> Result<Vec<Row>, String> {
        let rows = self.catalog_rows(keyspace, table)?;
        let mut out = Vec::new();
        for row in rows {
            let keep = filters
                .iter()
                .all(|(n, v)| row.get(n).is_some_and(|cell| same_value(cell, v)));
            if !keep {
                continue;
            }
            match projection {
                None => out.push(row),
                Some(names) => {
                    let mut projected = Row::new();
                    for name in names {
                        let cell = row
                            .get(name)
                            .ok_or_else(|| format!("undefined column name {}", name))?;
                        projected.push(name.clone(), cell.clone());
                    }
                    out.push(projected);
                }
            }
        }
        Ok(out)
    }

    fn catalog_rows(&mut self, keyspace: &str, table: &str) -> Result<Vec<Row>, String> {
        let rows = match (keyspace, table) {
            ("system_schema", "tables") => self
                .tables
                .keys()
                .map(|(ks, t)| {
                    Row::new()
                        .with("keyspace_name", ks.as_str())
                        .with("table_name", t.as_str())
                })
                .collect(),
            ("system_schema", "columns") => self
                .tables
                .iter()
                .flat_map(|((ks, t), state)| {
                    state.columns.iter().map(move |c| {
                        Row::new()
                            .with("keyspace_name", ks.as_str())
                            .with("table_name", t.as_str())
                            .with("column_name", c.name.as_str())
                            .with("type", c.wire_type.as_cql())
                            .with("kind", c.key_role.as_db_str())
                            .with("position", c.ordinal)
                            .with("clustering_order", c.sort_order.as_db_str())
                    })
                })
                .collect(),
            ("system_schema", "indexes") => self
                .indexes
                .iter()
                .map(|((ks, name), idx)| {
                    Row::new()
                        .with("keyspace_name", ks.as_str())
                        .with("table_name", idx.table.as_str())
                        .with("index_name", name.as_str())
                        .with("target", idx.column.as_str())
                })
                .collect(),
            ("system", "local") => vec![Row::new()
                .with("key", "local")
                .with("schema_version", self.local_version)],
            ("system", "peers") => {
                if self.peer_lag > 0 {
                    self.peer_lag -= 1;
                } else {
                    let version = self.local_version;
                    for peer in self.peers.iter_mut() {
                        peer.schema_version = version;
                    }
                }
                self.peers
                    .iter()
                    .map(|p| {
                        Row::new()
                            .with("peer", p.address.as_str())
                            .with("schema_version", p.schema_version)
                    })
                    .collect()
            }
            _ => return Err(format!("unconfigured table {}.{}", keyspace, table)),
        };
        Ok(rows)
    }
}

fn applied_outcome(conditional: bool) -> Vec<Row> {
    if conditional {
        vec![Row::new().with(APPLIED_COLUMN, true)]
    } else {
        Vec::new()
    }
}

/// Cell equality that treats `int` and `bigint` numerically.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::BigInt(y)) | (Value::BigInt(y), Value::Int(x)) => {
            i64::from(*x) == *y
        }
        _ => a == b,
    }
}

// ============================================================================
// TOKEN HASHING
// ============================================================================

struct Fnv(u64);

impl Fnv {
    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= u64::from(*b);
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    fn value(&mut self, value: &Value) {
        match value {
            Value::Null => self.write(&[0]),
            Value::Bool(b) => self.write(&[1, u8::from(*b)]),
            Value::Int(v) => {
                self.write(&[2]);
                self.write(&i64::from(*v).to_be_bytes());
            }
            Value::BigInt(v) => {
                self.write(&[2]);
                self.write(&v.to_be_bytes());
            }
            Value::Double(v) => {
                self.write(&[3]);
                self.write(&v.to_bits().to_be_bytes());
            }
            Value::Text(s) => {
                self.write(&[4]);
                self.write(&(s.len() as u64).to_be_bytes());
                self.write(s.as_bytes());
            }
            Value::Timestamp(ts) => {
                self.write(&[5]);
                self.write(&ts.timestamp_millis().to_be_bytes());
            }
            Value::Uuid(u) => {
                self.write(&[6]);
                self.write(u.as_bytes());
            }
            Value::Blob(bytes) => {
                self.write(&[7]);
                self.write(&(bytes.len() as u64).to_be_bytes());
                self.write(bytes);
            }
            Value::List(items) => {
                self.write(&[8]);
                self.write(&(items.len() as u64).to_be_bytes());
                for item in items {
                    self.value(item);
                }
            }
        }
    }
}

// ============================================================================
// MOCK CLUSTER
// ============================================================================

/// In-memory single-datacenter cluster for tests.
#[derive(Debug)]
pub struct MockCluster {
    state: Mutex<ClusterState>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClusterState::new()),
        }
    }

    /// Token of a partition key, in `(i64::MIN, i64::MAX]`.
    ///
    /// FNV-1a over a tagged encoding of the key values. `i64::MIN` is folded
    /// onto `i64::MAX` so every token is reachable by a range whose lower
    /// bound is exclusive.
    pub fn token_for(values: &[Value]) -> i64 {
        let mut hasher = Fnv(0xcbf2_9ce4_8422_2325);
        for value in values {
            hasher.value(value);
        }
        let token = hasher.0 as i64;
        if token == i64::MIN {
            i64::MAX
        } else {
            token
        }
    }

    fn lock(&self) -> TidemarkResult<MutexGuard<'_, ClusterState>> {
        self.state
            .lock()
            .map_err(|_| DriverError::LockPoisoned.into())
    }

    /// Helper access for inspection methods, which never fail.
    fn inspect(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, statement: &Statement) -> TidemarkResult<Vec<Row>> {
        let mut state = self.lock()?;
        state.log.push(statement.clone());
        let failed = |reason: String| DriverError::QueryFailed {
            statement: statement.cql.clone(),
            reason,
        };
        if let Some(fragment) = state
            .failures
            .iter()
            .find(|f| statement.cql.contains(f.as_str()))
        {
            return Err(failed(format!("injected failure matching '{}'", fragment)).into());
        }
        state.purge_expired();
        let command = cql::parse(statement)?;
        state.apply(command).map_err(|reason| failed(reason).into())
    }

    fn run_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page> {
        let mut rows = self.run(statement)?;
        let offset = paging_state
            .and_then(|s| <[u8; 8]>::try_from(s.0.as_slice()).ok())
            .map(|bytes| u64::from_be_bytes(bytes) as usize)
            .unwrap_or(0)
            .min(rows.len());
        let end = offset.saturating_add(page_size.max(1)).min(rows.len());
        let paging_state = (end < rows.len()).then(|| PagingState((end as u64).to_be_bytes().to_vec()));
        rows.truncate(end);
        let rows = rows.split_off(offset);
        Ok(Page { rows, paging_state })
    }

    // ------------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------------

    pub fn now(&self) -> Timestamp {
        self.inspect().now
    }

    /// Move the cluster clock forward; rows whose TTL elapses disappear.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        let mut state = self.inspect();
        state.now += delta;
    }

    // ------------------------------------------------------------------------
    // Topology and schema versions
    // ------------------------------------------------------------------------

    /// Replace the peer set with `count` peers that agree with the local node.
    pub fn set_peers(&self, count: usize) {
        let mut state = self.inspect();
        let version = state.local_version;
        state.peers = (0..count)
            .map(|i| Peer {
                address: format!("10.0.0.{}", i + 2),
                schema_version: version,
            })
            .collect();
    }

    /// Keep peers on their current schema version for the next `polls`
    /// reads of `system.peers`.
    pub fn lag_peers(&self, polls: usize) {
        self.inspect().peer_lag = polls;
    }

    pub fn schema_version(&self) -> Uuid {
        self.inspect().local_version
    }

    // ------------------------------------------------------------------------
    // Failure injection and statement log
    // ------------------------------------------------------------------------

    /// Fail every subsequent statement whose CQL contains `fragment`.
    pub fn fail_when(&self, fragment: impl Into<String>) {
        self.inspect().failures.push(fragment.into());
    }

    pub fn clear_failures(&self) {
        self.inspect().failures.clear();
    }

    /// Every statement received so far, in order, including failed ones.
    pub fn statements(&self) -> Vec<Statement> {
        self.inspect().log.clone()
    }

    pub fn executed_cql(&self) -> Vec<String> {
        self.inspect().log.iter().map(|s| s.cql.clone()).collect()
    }

    pub fn clear_log(&self) {
        self.inspect().log.clear();
    }

    // ------------------------------------------------------------------------
    // Inspection and seeding
    // ------------------------------------------------------------------------

    pub fn has_table(&self, keyspace: &str, table: &str) -> bool {
        self.inspect()
            .tables
            .contains_key(&(keyspace.to_string(), table.to_string()))
    }

    pub fn has_index(&self, keyspace: &str, name: &str) -> bool {
        self.inspect()
            .indexes
            .contains_key(&(keyspace.to_string(), name.to_string()))
    }

    pub fn columns(&self, keyspace: &str, table: &str) -> Option<Vec<LiveColumn>> {
        self.inspect()
            .tables
            .get(&(keyspace.to_string(), table.to_string()))
            .map(|t| t.columns.clone())
    }

    /// Live rows of a table in token order. Empty when the table is missing.
    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<Row> {
        let mut state = self.inspect();
        state.purge_expired();
        match state.table(keyspace, table) {
            Ok(t) => t.ordered().into_iter().map(|(_, r)| t.to_row(r, None)).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn row_count(&self, keyspace: &str, table: &str) -> usize {
        self.rows(keyspace, table).len()
    }

    /// Upsert a row directly, bypassing the statement log and failure
    /// injection.
    pub fn insert_row(&self, keyspace: &str, table: &str, row: Row) -> TidemarkResult<()> {
        let values: Vec<(String, Value)> =
            row.iter().map(|(n, v)| (n.to_string(), v.clone())).collect();
        let mut state = self.lock()?;
        state
            .apply(Command::Insert {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
                values,
                if_not_exists: false,
                ttl: None,
            })
            .map(|_| ())
            .map_err(|reason| {
                DriverError::QueryFailed {
                    statement: format!("<seed {}.{}>", keyspace, table),
                    reason,
                }
                .into()
            })
    }
}

impl Driver for MockCluster {
    fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>> {
        self.run(statement)
    }

    fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page> {
        self.run_page(statement, page_size, paging_state)
    }
}

#[async_trait]
impl AsyncDriver for MockCluster {
    async fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>> {
        self.run(statement)
    }

    async fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page> {
        self.run_page(statement, page_size, paging_state)
    }
}

// ============================================================================
// TESTS
// ============================================================================
