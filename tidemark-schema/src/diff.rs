//! Declared-vs-live schema comparison.
//!
//! The diff engine never guesses intent. A rename shows up as a drop plus an
//! add, and any change to the primary key is reported as unsafe for a human to
//! resolve.

use crate::introspect::TableSnapshot;
use std::collections::{BTreeSet, HashMap};
use tidemark_core::{
    ColumnChange, ColumnChangeKind, ColumnDefinition, IndexChange, IndexChangeKind, KeyRole,
    LiveColumn, SchemaDiff, SortOrder, TableSchema, WireType,
};

/// Type changes that never lose or reinterpret stored data.
pub fn is_safe_widening(from: &WireType, to: &WireType) -> bool {
    use WireType::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (TinyInt, SmallInt | Int | BigInt | VarInt)
            | (SmallInt, Int | BigInt | VarInt)
            | (Int, BigInt | VarInt)
            | (BigInt, VarInt)
            | (Float, Double)
            | (Ascii, Text)
            | (TimeUuid, Uuid)
    )
}

/// Compare declared columns and indexes of one table against its live state.
///
/// Column changes follow declaration order (adds, type and role drift), then
/// live-only columns in catalog order (drops). Index adds follow declaration
/// order; index drops are sorted by name. When `table_exists` is false the
/// result carries no changes at all.
pub fn diff(
    keyspace: &str,
    table: &str,
    live_columns: &[LiveColumn],
    declared_columns: &[ColumnDefinition],
    live_indexes: &BTreeSet<String>,
    table_exists: bool,
) -> SchemaDiff {
    let mut result = SchemaDiff {
        keyspace: keyspace.to_string(),
        table: table.to_string(),
        table_exists,
        column_changes: Vec::new(),
        index_changes: Vec::new(),
    };
    if !table_exists {
        return result;
    }

    let live: HashMap<&str, &LiveColumn> =
        live_columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let declared: HashMap<&str, &ColumnDefinition> =
        declared_columns.iter().map(|c| (c.name.as_str(), c)).collect();

    for column in declared_columns {
        let change = match live.get(column.name.as_str()) {
            None => Some(added(column)),
            Some(existing) => compared(existing, column),
        };
        result.column_changes.extend(change);
    }
    for column in live_columns {
        if !declared.contains_key(column.name.as_str()) {
            result.column_changes.push(dropped(column));
        }
    }

    let declared_indexes: Vec<(String, String)> = declared_columns
        .iter()
        .filter_map(|c| c.resolved_index_name(table).map(|idx| (idx, c.name.clone())))
        .collect();
    for (index_name, column) in &declared_indexes {
        if !live_indexes.contains(index_name) {
            result.index_changes.push(IndexChange {
                index_name: index_name.clone(),
                kind: IndexChangeKind::Add,
                column: Some(column.clone()),
            });
        }
    }
    for index_name in live_indexes {
        if !declared_indexes.iter().any(|(name, _)| name == index_name) {
            result.index_changes.push(IndexChange {
                index_name: index_name.clone(),
                kind: IndexChangeKind::Drop,
                column: None,
            });
        }
    }

    result
}

/// [`diff`] of a declared table against an introspected snapshot.
pub fn diff_table(keyspace: &str, schema: &TableSchema, snapshot: &TableSnapshot) -> SchemaDiff {
    diff(
        keyspace,
        &schema.table,
        &snapshot.columns,
        &schema.columns,
        &snapshot.indexes,
        snapshot.exists,
    )
}

fn added(column: &ColumnDefinition) -> ColumnChange {
    let is_key = column.key_role.is_key();
    ColumnChange {
        name: column.name.clone(),
        kind: ColumnChangeKind::Add,
        live_type: None,
        declared_type: Some(column.wire_type.clone()),
        live_role: None,
        declared_role: Some(column.key_role),
        is_unsafe: is_key,
        warning: is_key.then(|| {
            format!(
                "cannot add {} column to an existing table; the primary key is immutable",
                column.key_role
            )
        }),
    }
}

fn dropped(column: &LiveColumn) -> ColumnChange {
    let is_key = column.key_role.is_key();
    let warning = if is_key {
        format!(
            "cannot drop {} column; the primary key is immutable",
            column.key_role
        )
    } else {
        "column data will be discarded".to_string()
    };
    ColumnChange {
        name: column.name.clone(),
        kind: ColumnChangeKind::Drop,
        live_type: Some(column.wire_type.clone()),
        declared_type: None,
        live_role: Some(column.key_role),
        declared_role: None,
        is_unsafe: is_key,
        warning: Some(warning),
    }
}

fn compared(live: &LiveColumn, declared: &ColumnDefinition) -> Option<ColumnChange> {
    let role_drift = live.key_role != declared.key_role;
    let key_layout_drift = declared.key_role.is_key()
        && !role_drift
        && (live.ordinal != declared.key_ordinal
            || effective_order(live.key_role, live.sort_order)
                != effective_order(declared.key_role, declared.sort_order));

    let base = ColumnChange {
        name: declared.name.clone(),
        kind: ColumnChangeKind::KeyRoleChange,
        live_type: Some(live.wire_type.clone()),
        declared_type: Some(declared.wire_type.clone()),
        live_role: Some(live.key_role),
        declared_role: Some(declared.key_role),
        is_unsafe: true,
        warning: None,
    };

    if role_drift {
        return Some(ColumnChange {
            warning: Some(format!(
                "key role changed from {} to {}; recreate the table and copy data",
                live.key_role, declared.key_role
            )),
            ..base
        });
    }
    if key_layout_drift {
        return Some(ColumnChange {
            warning: Some(format!(
                "{} position or clustering order changed; recreate the table and copy data",
                declared.key_role
            )),
            ..base
        });
    }
    if live.wire_type == declared.wire_type {
        return None;
    }

    let safe = is_safe_widening(&live.wire_type, &declared.wire_type);
    Some(ColumnChange {
        kind: ColumnChangeKind::TypeChange,
        is_unsafe: !safe,
        warning: (!safe).then(|| {
            format!(
                "{} -> {} is not a safe widening; existing values may be unreadable",
                live.wire_type, declared.wire_type
            )
        }),
        ..base
    })
}

/// Clustering columns without an explicit order are ascending.
fn effective_order(role: KeyRole, order: SortOrder) -> SortOrder {
    match (role, order) {
        (KeyRole::Clustering, SortOrder::None) => SortOrder::Asc,
        (_, order) => order,
    }
}
