//! TIDEMARK Test Utilities
//!
//! Shared test infrastructure for the TIDEMARK workspace:
//! - Proptest generators for wire types, columns and table schemas
//! - Fixtures that seed a `MockCluster` with known tables and rows
//! - Assertions for TIDEMARK-specific error shapes

pub use tidemark_driver::MockCluster;

pub use tidemark_core::{
    ColumnDefinition, KeyRole, MigrationError, Row, SortOrder, Statement, TableSchema,
    TidemarkError, TidemarkResult, Value, WireType,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// Any wire type the mock cluster can store, collections included.
    /// Counters are left out since they cannot share a table with other
    /// regular columns.
    pub fn arb_wire_type() -> impl Strategy<Value = WireType> {
        prop_oneof![
            Just(WireType::Ascii),
            Just(WireType::BigInt),
            Just(WireType::Blob),
            Just(WireType::Boolean),
            Just(WireType::Date),
            Just(WireType::Decimal),
            Just(WireType::Double),
            Just(WireType::Float),
            Just(WireType::Inet),
            Just(WireType::Int),
            Just(WireType::SmallInt),
            Just(WireType::Text),
            Just(WireType::Time),
            Just(WireType::Timestamp),
            Just(WireType::TimeUuid),
            Just(WireType::TinyInt),
            Just(WireType::Uuid),
            Just(WireType::VarInt),
            Just(WireType::from_cql("list<int>")),
            Just(WireType::from_cql("map<text, bigint>")),
            Just(WireType::from_cql("frozen<set<text>>")),
        ]
    }

    /// Types usable in a primary key.
    pub fn arb_key_type() -> impl Strategy<Value = WireType> {
        prop_oneof![
            Just(WireType::Text),
            Just(WireType::Uuid),
            Just(WireType::BigInt),
            Just(WireType::Int),
            Just(WireType::Timestamp),
            Just(WireType::Date),
        ]
    }

    /// A regular, non-indexed column.
    pub fn arb_column_definition() -> impl Strategy<Value = ColumnDefinition> {
        ("c_[a-z]{1,8}", arb_wire_type()).prop_map(|(name, t)| ColumnDefinition::new(name, t))
    }

    /// Up to four regular columns whose names share `prefix` and never collide.
    pub fn arb_regular_columns(prefix: &'static str) -> impl Strategy<Value = Vec<ColumnDefinition>> {
        proptest::collection::btree_map("[a-z]{1,6}", arb_wire_type(), 0..4).prop_map(move |cols| {
            cols.into_iter()
                .map(|(name, t)| ColumnDefinition::new(format!("{}{}", prefix, name), t))
                .collect()
        })
    }

    fn arb_sort_order() -> impl Strategy<Value = SortOrder> {
        prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)]
    }

    /// A valid table: one or two partition keys, up to two clustering
    /// columns, some regular columns (optionally indexed) and maybe a static
    /// column when the table clusters.
    pub fn arb_table_schema() -> impl Strategy<Value = TableSchema> {
        (
            "t_[a-z]{1,8}",
            proptest::collection::vec(arb_key_type(), 1..=2),
            proptest::collection::vec((arb_key_type(), arb_sort_order()), 0..=2),
            proptest::collection::btree_map("[a-z]{1,8}", (arb_wire_type(), any::<bool>()), 0..5),
            any::<bool>(),
        )
            .prop_map(|(table, partition, clustering, regular, with_static)| {
                let mut columns = Vec::new();
                for (i, t) in partition.into_iter().enumerate() {
                    columns.push(ColumnDefinition::new(format!("pk{}", i), t).partition_key(i as i32));
                }
                let clusters = !clustering.is_empty();
                for (i, (t, order)) in clustering.into_iter().enumerate() {
                    columns.push(ColumnDefinition::new(format!("ck{}", i), t).clustering(i as i32, order));
                }
                let mut seen = BTreeSet::new();
                for (name, (t, indexed)) in regular {
                    let name = format!("c_{}", name);
                    seen.insert(name.clone());
                    let col = ColumnDefinition::new(name, t);
                    columns.push(if indexed { col.indexed() } else { col });
                }
                if clusters && with_static && !seen.contains("c_owner") {
                    columns.push(ColumnDefinition::new("c_owner", WireType::Text).static_column());
                }
                TableSchema::new(table, columns)
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use tidemark_driver::Driver;

    /// `shop.items (id text PRIMARY KEY, name text)`.
    pub const ITEMS_DDL: &str =
        "CREATE TABLE IF NOT EXISTS shop.items (id text PRIMARY KEY, name text)";

    /// Create `shop.items` on the cluster. Panics on failure; test-only.
    pub fn create_items_table(cluster: &MockCluster) {
        cluster
            .execute(&Statement::new(ITEMS_DDL))
            .unwrap_or_else(|e| panic!("failed to create shop.items: {}", e));
    }

    /// Declared schema matching [`ITEMS_DDL`].
    pub fn items_schema() -> TableSchema {
        TableSchema::new(
            "items",
            vec![
                ColumnDefinition::new("id", WireType::Text).partition_key(0),
                ColumnDefinition::new("name", WireType::Text),
            ],
        )
    }

    /// A compound-key table with a static and an indexed column.
    pub fn events_schema() -> TableSchema {
        TableSchema::new(
            "events",
            vec![
                ColumnDefinition::new("tenant", WireType::Uuid).partition_key(0),
                ColumnDefinition::new("day", WireType::Date).partition_key(1),
                ColumnDefinition::new("seq", WireType::BigInt).clustering(0, SortOrder::Desc),
                ColumnDefinition::new("owner", WireType::Text).static_column(),
                ColumnDefinition::new("body", WireType::Text).index_named("events_body_idx"),
            ],
        )
    }

    /// Create `shop.items` and fill it with `count` rows keyed `item-0000`...
    pub fn seeded_items(count: usize) -> MockCluster {
        let cluster = MockCluster::new();
        create_items_table(&cluster);
        for i in 0..count {
            let row = Row::new()
                .with("id", format!("item-{:04}", i))
                .with("name", format!("name {}", i));
            cluster
                .insert_row("shop", "items", row)
                .unwrap_or_else(|e| panic!("failed to seed shop.items: {}", e));
        }
        cluster
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Assert the result failed with the given migration error variant.
    pub fn assert_migration_error<T: std::fmt::Debug>(
        result: &TidemarkResult<T>,
        matches: impl Fn(&MigrationError) -> bool,
    ) {
        match result {
            Err(TidemarkError::Migration(err)) if matches(err) => {}
            other => panic!("expected matching migration error, got {:?}", other),
        }
    }

    /// Assert the result failed with a driver error.
    pub fn assert_driver_error<T: std::fmt::Debug>(result: &TidemarkResult<T>) {
        assert!(
            matches!(result, Err(TidemarkError::Driver(_))),
            "expected driver error, got {:?}",
            result
        );
    }
}
