//! Live schema introspection from the cluster catalog.
//!
//! Three catalog reads per table: existence (`system_schema.tables`), column
//! metadata (`system_schema.columns`) and index names
//! (`system_schema.indexes`). Nothing is cached; every call reflects the
//! catalog as the coordinator sees it right now.

use std::collections::BTreeSet;
use tidemark_core::{
    KeyRole, LiveColumn, Row, RowError, SortOrder, Statement, TidemarkResult, WireType,
};
use tidemark_driver::Executor;

const TABLE_EXISTS_CQL: &str =
    "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ? AND table_name = ?";
const COLUMNS_CQL: &str = "SELECT column_name, type, kind, position, clustering_order \
     FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?";
const INDEXES_CQL: &str =
    "SELECT index_name FROM system_schema.indexes WHERE keyspace_name = ? AND table_name = ?";

/// What the catalog says about one table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSnapshot {
    pub exists: bool,
    pub columns: Vec<LiveColumn>,
    pub indexes: BTreeSet<String>,
}

impl TableSnapshot {
    /// Snapshot of a table that does not exist.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Partition key columns in key order.
    pub fn partition_keys(&self) -> Vec<&LiveColumn> {
        self.columns
            .iter()
            .filter(|c| c.key_role == KeyRole::PartitionKey)
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Reads live table layouts through an [`Executor`].
pub struct Introspector<'a, E: ?Sized> {
    executor: &'a E,
}

impl<'a, E: Executor + ?Sized> Introspector<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// Existence, columns and index names of `keyspace.table`.
    ///
    /// An absent table yields [`TableSnapshot::absent`], not an error.
    pub async fn introspect(&self, keyspace: &str, table: &str) -> TidemarkResult<TableSnapshot> {
        if !self.table_exists(keyspace, table).await? {
            tracing::debug!(keyspace, table, "table not present in catalog");
            return Ok(TableSnapshot::absent());
        }
        let columns = self.live_columns(keyspace, table).await?;
        let indexes = self.live_indexes(keyspace, table).await?;
        tracing::debug!(
            keyspace,
            table,
            columns = columns.len(),
            indexes = indexes.len(),
            "introspected table"
        );
        Ok(TableSnapshot {
            exists: true,
            columns,
            indexes,
        })
    }

    pub async fn table_exists(&self, keyspace: &str, table: &str) -> TidemarkResult<bool> {
        let rows = self
            .executor
            .execute(&catalog_query(TABLE_EXISTS_CQL, keyspace, table))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Live columns ordered partition keys, clustering keys, then the rest
    /// by name.
    pub async fn live_columns(&self, keyspace: &str, table: &str) -> TidemarkResult<Vec<LiveColumn>> {
        let rows = self
            .executor
            .execute(&catalog_query(COLUMNS_CQL, keyspace, table))
            .await?;
        let mut columns = rows
            .iter()
            .map(decode_column)
            .collect::<TidemarkResult<Vec<_>>>()?;
        columns.sort_by(|a, b| {
            role_rank(a.key_role)
                .cmp(&role_rank(b.key_role))
                .then(a.ordinal.cmp(&b.ordinal))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(columns)
    }

    pub async fn live_indexes(&self, keyspace: &str, table: &str) -> TidemarkResult<BTreeSet<String>> {
        let rows = self
            .executor
            .execute(&catalog_query(INDEXES_CQL, keyspace, table))
            .await?;
        rows.iter()
            .map(|row| row.text("index_name").map(str::to_string))
            .collect()
    }
}

fn catalog_query(cql: &str, keyspace: &str, table: &str) -> Statement {
    Statement::new(cql).bind(keyspace).bind(table)
}

fn role_rank(role: KeyRole) -> u8 {
    match role {
        KeyRole::PartitionKey => 0,
        KeyRole::Clustering => 1,
        KeyRole::Static | KeyRole::Regular => 2,
    }
}

fn decode_column(row: &Row) -> TidemarkResult<LiveColumn> {
    let kind = row.text("kind")?;
    let key_role = KeyRole::from_db_str(kind).ok_or_else(|| RowError::InvalidCatalogValue {
        column: "kind".to_string(),
        value: kind.to_string(),
    })?;
    let sort_order = match row.opt_text("clustering_order")? {
        None => SortOrder::None,
        Some(raw) => SortOrder::from_db_str(raw).ok_or_else(|| RowError::InvalidCatalogValue {
            column: "clustering_order".to_string(),
            value: raw.to_string(),
        })?,
    };
    Ok(LiveColumn {
        name: row.text("column_name")?.to_string(),
        wire_type: WireType::from_cql(row.text("type")?),
        key_role,
        ordinal: row.int("position")?,
        sort_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidemark_core::{TidemarkError, Value};
    use tidemark_driver::{BlockingExecutor, Driver, MockCluster, SuspendingExecutor};

    fn run(cluster: &MockCluster, cql: &str) {
        Driver::execute(cluster, &Statement::new(cql)).unwrap();
    }

    #[tokio::test]
    async fn test_introspect_absent_table() {
        let executor = SuspendingExecutor::new(MockCluster::new());
        let snapshot = Introspector::new(&executor)
            .introspect("shop", "missing")
            .await
            .unwrap();
        assert_eq!(snapshot, TableSnapshot::absent());
        assert!(!snapshot.exists);
    }

    #[tokio::test]
    async fn test_introspect_reads_roles_and_indexes() {
        let cluster = Arc::new(MockCluster::new());
        run(
            &cluster,
            "CREATE TABLE shop.events (tenant uuid, day date, seq bigint, note text, owner text STATIC, \
             PRIMARY KEY ((tenant, day), seq)) WITH CLUSTERING ORDER BY (seq DESC)",
        );
        run(&cluster, "CREATE INDEX events_note_idx ON shop.events (note)");

        let executor = SuspendingExecutor::new(cluster.clone());
        let snapshot = Introspector::new(&executor)
            .introspect("shop", "events")
            .await
            .unwrap();

        let names: Vec<&str> = snapshot.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["tenant", "day", "seq", "note", "owner"]);
        assert_eq!(snapshot.partition_keys().len(), 2);
        let seq = snapshot.column("seq").unwrap();
        assert_eq!(seq.key_role, KeyRole::Clustering);
        assert_eq!(seq.sort_order, SortOrder::Desc);
        assert_eq!(snapshot.column("owner").unwrap().key_role, KeyRole::Static);
        assert!(snapshot.indexes.contains("events_note_idx"));
    }

    #[test]
    fn test_introspect_through_blocking_executor() {
        let cluster = MockCluster::new();
        run(&cluster, "CREATE TABLE shop.items (id text PRIMARY KEY, name varchar)");
        let executor = BlockingExecutor::new(cluster);
        let snapshot =
            futures::executor::block_on(Introspector::new(&executor).introspect("shop", "items"))
                .unwrap();
        assert!(snapshot.exists);
        assert_eq!(snapshot.column("name").unwrap().wire_type, WireType::Text);
        assert!(snapshot.indexes.is_empty());
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let row = Row::new()
            .with("column_name", "x")
            .with("type", "int")
            .with("kind", "compact_value")
            .with("position", -1)
            .with("clustering_order", Value::Null);
        let err = decode_column(&row).unwrap_err();
        assert!(matches!(
            err,
            TidemarkError::Row(RowError::InvalidCatalogValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_driver_failure_propagates() {
        let cluster = MockCluster::new();
        cluster.fail_when("system_schema.tables");
        let executor = SuspendingExecutor::new(cluster);
        let result = Introspector::new(&executor).introspect("shop", "items").await;
        assert!(result.is_err());
    }
}
