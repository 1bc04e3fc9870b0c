//! TIDEMARK Core - Schema, Diff and Wire Types
//!
//! Pure data structures shared by every other TIDEMARK crate: declared and
//! live column models, the typed change set produced by the diff engine,
//! driver-boundary row/statement records, the lock lease model, errors and
//! configuration. This crate performs no I/O.

pub mod change;
pub mod config;
pub mod error;
pub mod lock;
pub mod row;
pub mod schema;

pub use change::{
    ColumnChange, ColumnChangeKind, IndexChange, IndexChangeKind, SchemaDiff,
};
pub use config::{MigrateConfig, ScanOptions};
pub use error::{
    ConfigError, DriverError, MigrationError, RenderError, RowError, TidemarkError,
    TidemarkResult,
};
pub use lock::{Held, Lease, LeaseState, LockRecord, MAX_TTL};
pub use row::{Page, PagingState, Row, Statement, Value};
pub use schema::{ColumnDefinition, KeyRole, LiveColumn, SortOrder, TableSchema, WireType};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Hex-encoded SHA-256 digest of a migration's source text.
pub type Checksum = String;

/// Compute the SHA-256 checksum of content, hex encoded.
pub fn compute_checksum(content: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Returns true when `name` is a plain CQL identifier (unquoted form).
///
/// Keyspace, table, column and index names that Tidemark interpolates into
/// statements must pass this check; quoted identifiers are not supported.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= 48 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// TESTS
// ============================================================================
