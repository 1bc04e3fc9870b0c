//! Typed change set produced by the diff engine.

use crate::schema::{KeyRole, WireType};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// COLUMN CHANGES
// ============================================================================

/// Kind of discrepancy found for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnChangeKind {
    /// Declared but not live.
    Add,
    /// Live but not declared.
    Drop,
    /// Same key role, different wire type.
    TypeChange,
    /// Different key role.
    KeyRoleChange,
}

impl ColumnChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnChangeKind::Add => "add",
            ColumnChangeKind::Drop => "drop",
            ColumnChangeKind::TypeChange => "type-change",
            ColumnChangeKind::KeyRoleChange => "key-role-change",
        }
    }
}

impl fmt::Display for ColumnChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column-level discrepancy between live and declared schema.
///
/// `is_unsafe` is set for every key-role change, for type changes outside the
/// safe-widening whitelist and for key columns that cannot be added or dropped
/// in place. Drops are always destructive regardless of `is_unsafe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub name: String,
    pub kind: ColumnChangeKind,
    pub live_type: Option<WireType>,
    pub declared_type: Option<WireType>,
    pub live_role: Option<KeyRole>,
    pub declared_role: Option<KeyRole>,
    pub is_unsafe: bool,
    pub warning: Option<String>,
}

impl ColumnChange {
    /// Whether applying this change loses data.
    pub fn is_destructive(&self) -> bool {
        self.kind == ColumnChangeKind::Drop
    }
}

impl fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self.live_type.as_ref().map(|t| t.as_cql()).unwrap_or("-");
        let declared = self.declared_type.as_ref().map(|t| t.as_cql()).unwrap_or("-");
        write!(f, "{} {} ({} -> {})", self.kind, self.name, live, declared)?;
        if self.is_unsafe {
            f.write_str(" [UNSAFE]")?;
        }
        if self.is_destructive() {
            f.write_str(" [DESTRUCTIVE]")?;
        }
        if let Some(warning) = &self.warning {
            write!(f, ": {}", warning)?;
        }
        Ok(())
    }
}

// ============================================================================
// INDEX CHANGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexChangeKind {
    Add,
    Drop,
}

/// A secondary index to create or drop.
///
/// `column` is the declared target for adds. Drops only know the index name,
/// since introspection does not recover the original definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexChange {
    pub index_name: String,
    pub kind: IndexChangeKind,
    pub column: Option<String>,
}

impl IndexChange {
    pub fn is_destructive(&self) -> bool {
        self.kind == IndexChangeKind::Drop
    }
}

impl fmt::Display for IndexChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.column) {
            (IndexChangeKind::Add, Some(col)) => write!(f, "add index {} on {}", self.index_name, col),
            (IndexChangeKind::Add, None) => write!(f, "add index {}", self.index_name),
            (IndexChangeKind::Drop, _) => write!(f, "drop index {} [DESTRUCTIVE]", self.index_name),
        }
    }
}

// ============================================================================
// SCHEMA DIFF
// ============================================================================

/// Full comparison result for one table.
///
/// When `table_exists` is false no per-column changes are produced; the table
/// has to be created wholesale, so such a diff is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub keyspace: String,
    pub table: String,
    pub table_exists: bool,
    pub column_changes: Vec<ColumnChange>,
    pub index_changes: Vec<IndexChange>,
}

impl SchemaDiff {
    pub fn has_unsafe_changes(&self) -> bool {
        self.column_changes.iter().any(|c| c.is_unsafe)
    }

    pub fn has_destructive_changes(&self) -> bool {
        self.column_changes.iter().any(ColumnChange::is_destructive)
            || self.index_changes.iter().any(IndexChange::is_destructive)
    }

    pub fn is_empty(&self) -> bool {
        self.table_exists && self.column_changes.is_empty() && self.index_changes.is_empty()
    }

    /// `keyspace.table`
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.keyspace, self.table)
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.table_exists {
            return write!(f, "{}: table does not exist (create)", self.qualified_table());
        }
        if self.is_empty() {
            return write!(f, "{}: up to date", self.qualified_table());
        }
        write!(f, "{}:", self.qualified_table())?;
        for change in &self.column_changes {
            write!(f, "\n  {}", change)?;
        }
        for change in &self.index_changes {
            write!(f, "\n  {}", change)?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
