//! Declared and live column models.
//!
//! `ColumnDefinition` is what the mapping layer declares; `LiveColumn` is what
//! the introspector reads back from the catalog. Both share `WireType`,
//! `KeyRole` and `SortOrder`, which round-trip through the catalog's string
//! encodings.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// WIRE TYPE
// ============================================================================

/// CQL column type as reported by `system_schema.columns.type`.
///
/// Native types get their own variant; collections, tuples, frozen and
/// user-defined types are kept verbatim (normalized) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Date,
    Decimal,
    Double,
    Duration,
    Float,
    Inet,
    Int,
    SmallInt,
    Text,
    Time,
    Timestamp,
    TimeUuid,
    TinyInt,
    Uuid,
    VarInt,
    Other(String),
}

impl WireType {
    /// Parse a CQL type name. `varchar` is an alias of `text`.
    pub fn from_cql(s: &str) -> Self {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "ascii" => WireType::Ascii,
            "bigint" => WireType::BigInt,
            "blob" => WireType::Blob,
            "boolean" => WireType::Boolean,
            "counter" => WireType::Counter,
            "date" => WireType::Date,
            "decimal" => WireType::Decimal,
            "double" => WireType::Double,
            "duration" => WireType::Duration,
            "float" => WireType::Float,
            "inet" => WireType::Inet,
            "int" => WireType::Int,
            "smallint" => WireType::SmallInt,
            "text" | "varchar" => WireType::Text,
            "time" => WireType::Time,
            "timestamp" => WireType::Timestamp,
            "timeuuid" => WireType::TimeUuid,
            "tinyint" => WireType::TinyInt,
            "uuid" => WireType::Uuid,
            "varint" => WireType::VarInt,
            _ => WireType::Other(normalized),
        }
    }

    /// CQL spelling used when rendering statements.
    pub fn as_cql(&self) -> &str {
        match self {
            WireType::Ascii => "ascii",
            WireType::BigInt => "bigint",
            WireType::Blob => "blob",
            WireType::Boolean => "boolean",
            WireType::Counter => "counter",
            WireType::Date => "date",
            WireType::Decimal => "decimal",
            WireType::Double => "double",
            WireType::Duration => "duration",
            WireType::Float => "float",
            WireType::Inet => "inet",
            WireType::Int => "int",
            WireType::SmallInt => "smallint",
            WireType::Text => "text",
            WireType::Time => "time",
            WireType::Timestamp => "timestamp",
            WireType::TimeUuid => "timeuuid",
            WireType::TinyInt => "tinyint",
            WireType::Uuid => "uuid",
            WireType::VarInt => "varint",
            WireType::Other(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cql())
    }
}

// ============================================================================
// KEY ROLE / SORT ORDER
// ============================================================================

/// Role a column plays in the primary key (catalog `kind` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRole {
    PartitionKey,
    Clustering,
    Static,
    Regular,
}

impl KeyRole {
    /// Convert to catalog string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            KeyRole::PartitionKey => "partition_key",
            KeyRole::Clustering => "clustering",
            KeyRole::Static => "static",
            KeyRole::Regular => "regular",
        }
    }

    /// Parse from catalog string representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "partition_key" => Some(KeyRole::PartitionKey),
            "clustering" => Some(KeyRole::Clustering),
            "static" => Some(KeyRole::Static),
            "regular" => Some(KeyRole::Regular),
            _ => None,
        }
    }

    /// Partition and clustering columns form the immutable primary key.
    pub fn is_key(&self) -> bool {
        matches!(self, KeyRole::PartitionKey | KeyRole::Clustering)
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Clustering order (catalog `clustering_order` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
    #[default]
    None,
}

impl SortOrder {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
            SortOrder::None => "none",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            "none" => Some(SortOrder::None),
            _ => None,
        }
    }
}

// ============================================================================
// DECLARED COLUMNS
// ============================================================================

/// A column as declared by the mapping layer.
///
/// Built once per record type and never mutated afterwards. Key ordinals
/// follow the catalog convention: position within the partition or
/// clustering key, `-1` for static and regular columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub wire_type: WireType,
    pub key_role: KeyRole,
    pub key_ordinal: i32,
    pub sort_order: SortOrder,
    pub indexed: bool,
    pub index_name: Option<String>,
}

impl ColumnDefinition {
    /// A regular (non-key) column.
    pub fn new(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            wire_type,
            key_role: KeyRole::Regular,
            key_ordinal: -1,
            sort_order: SortOrder::None,
            indexed: false,
            index_name: None,
        }
    }

    /// Mark as the `ordinal`-th partition key column.
    pub fn partition_key(mut self, ordinal: i32) -> Self {
        self.key_role = KeyRole::PartitionKey;
        self.key_ordinal = ordinal;
        self.sort_order = SortOrder::None;
        self
    }

    /// Mark as the `ordinal`-th clustering column.
    pub fn clustering(mut self, ordinal: i32, order: SortOrder) -> Self {
        self.key_role = KeyRole::Clustering;
        self.key_ordinal = ordinal;
        self.sort_order = order;
        self
    }

    pub fn static_column(mut self) -> Self {
        self.key_role = KeyRole::Static;
        self.key_ordinal = -1;
        self
    }

    /// Request a secondary index with the default name.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Request a secondary index with an explicit name.
    pub fn index_named(mut self, name: impl Into<String>) -> Self {
        self.indexed = true;
        self.index_name = Some(name.into());
        self
    }

    /// Index name for this column, if indexed. Defaults to `<table>_<column>_idx`.
    pub fn resolved_index_name(&self, table: &str) -> Option<String> {
        if !self.indexed {
            return None;
        }
        Some(
            self.index_name
                .clone()
                .unwrap_or_else(|| format!("{}_{}_idx", table, self.name)),
        )
    }
}

/// A declared table: name plus columns in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Partition key columns sorted by ordinal.
    pub fn partition_keys(&self) -> Vec<&ColumnDefinition> {
        self.keys_with_role(KeyRole::PartitionKey)
    }

    /// Clustering columns sorted by ordinal.
    pub fn clustering_keys(&self) -> Vec<&ColumnDefinition> {
        self.keys_with_role(KeyRole::Clustering)
    }

    /// `(index_name, column)` for every indexed column, in declaration order.
    pub fn declared_indexes(&self) -> Vec<(String, String)> {
        self.columns
            .iter()
            .filter_map(|c| {
                c.resolved_index_name(&self.table)
                    .map(|idx| (idx, c.name.clone()))
            })
            .collect()
    }

    fn keys_with_role(&self, role: KeyRole) -> Vec<&ColumnDefinition> {
        let mut keys: Vec<&ColumnDefinition> =
            self.columns.iter().filter(|c| c.key_role == role).collect();
        keys.sort_by_key(|c| c.key_ordinal);
        keys
    }
}

// ============================================================================
// LIVE COLUMNS
// ============================================================================

/// A column as currently present in the cluster catalog.
///
/// Rebuilt on every introspection; never cached across schema changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    pub name: String,
    pub wire_type: WireType,
    pub key_role: KeyRole,
    pub ordinal: i32,
    pub sort_order: SortOrder,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_type_parsing_normalizes() {
        assert_eq!(WireType::from_cql("INT"), WireType::Int);
        assert_eq!(WireType::from_cql("varchar"), WireType::Text);
        assert_eq!(WireType::from_cql(" text "), WireType::Text);
        assert_eq!(
            WireType::from_cql("map<text, int>"),
            WireType::Other("map<text,int>".to_string())
        );
        assert_eq!(WireType::from_cql("frozen<list<int>>").as_cql(), "frozen<list<int>>");
    }

    #[test]
    fn test_key_role_roundtrip() {
        for role in [
            KeyRole::PartitionKey,
            KeyRole::Clustering,
            KeyRole::Static,
            KeyRole::Regular,
        ] {
            assert_eq!(KeyRole::from_db_str(role.as_db_str()), Some(role));
        }
        assert_eq!(KeyRole::from_db_str("compact_value"), None);
        assert!(KeyRole::PartitionKey.is_key());
        assert!(!KeyRole::Static.is_key());
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!(SortOrder::from_db_str("DESC"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::from_db_str("none"), Some(SortOrder::None));
        assert_eq!(SortOrder::from_db_str("sideways"), None);
    }

    #[test]
    fn test_column_builder_sets_roles() {
        let pk = ColumnDefinition::new("id", WireType::Uuid).partition_key(0);
        assert_eq!(pk.key_role, KeyRole::PartitionKey);
        assert_eq!(pk.key_ordinal, 0);

        let ck = ColumnDefinition::new("ts", WireType::Timestamp).clustering(0, SortOrder::Desc);
        assert_eq!(ck.key_role, KeyRole::Clustering);
        assert_eq!(ck.sort_order, SortOrder::Desc);

        let st = ColumnDefinition::new("owner", WireType::Text).static_column();
        assert_eq!(st.key_role, KeyRole::Static);
        assert_eq!(st.key_ordinal, -1);
    }

    #[test]
    fn test_index_name_resolution() {
        let plain = ColumnDefinition::new("name", WireType::Text);
        assert_eq!(plain.resolved_index_name("users"), None);

        let default_idx = ColumnDefinition::new("email", WireType::Text).indexed();
        assert_eq!(
            default_idx.resolved_index_name("users").as_deref(),
            Some("users_email_idx")
        );

        let named = ColumnDefinition::new("email", WireType::Text).index_named("by_email");
        assert_eq!(named.resolved_index_name("users").as_deref(), Some("by_email"));
    }

    #[test]
    fn test_table_schema_key_ordering() {
        let schema = TableSchema::new(
            "events",
            vec![
                ColumnDefinition::new("day", WireType::Date).partition_key(1),
                ColumnDefinition::new("tenant", WireType::Uuid).partition_key(0),
                ColumnDefinition::new("seq", WireType::BigInt).clustering(0, SortOrder::Asc),
                ColumnDefinition::new("body", WireType::Text).indexed(),
            ],
        );
        let pks: Vec<&str> = schema.partition_keys().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(pks, vec!["tenant", "day"]);
        assert_eq!(schema.clustering_keys().len(), 1);
        assert_eq!(
            schema.declared_indexes(),
            vec![("events_body_idx".to_string(), "body".to_string())]
        );
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        fn cql_type_name() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("int".to_string()),
                Just("varchar".to_string()),
                Just("timeuuid".to_string()),
                Just("set<text>".to_string()),
                Just("map<text, frozen<list<int>>>".to_string()),
                "[a-z][a-z0-9_]{0,12}",
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Parsing is insensitive to case and padding, and stable over
            /// its own rendering.
            #[test]
            fn prop_from_cql_normalizes(name in cql_type_name(), pad in " {0,3}") {
                let parsed = WireType::from_cql(&name);
                let shouted = format!("{}{}{}", pad, name.to_ascii_uppercase(), pad);
                prop_assert_eq!(WireType::from_cql(&shouted), parsed.clone());
                prop_assert_eq!(WireType::from_cql(&parsed.as_cql()), parsed);
            }
        }
    }
}
