//! TIDEMARK Schema - Introspection, Diffing and Rendering
//!
//! Reads the live layout of a table, compares it with the declared
//! `TableSchema`, classifies every discrepancy by safety, and renders the
//! result as migration source.

pub mod diff;
pub mod introspect;
pub mod render;

pub use diff::{diff, diff_table, is_safe_widening};
pub use introspect::{Introspector, TableSnapshot};
pub use render::{render, MigrationRenderer, RenderedMigration, RenderedStep, TableSection};

use tidemark_core::{SchemaDiff, TableSchema, TidemarkResult};
use tidemark_driver::Executor;

/// Introspect `keyspace.<schema.table>` and diff it against `schema`.
pub async fn diff_live<E: Executor + ?Sized>(
    executor: &E,
    keyspace: &str,
    schema: &TableSchema,
) -> TidemarkResult<SchemaDiff> {
    let snapshot = Introspector::new(executor)
        .introspect(keyspace, &schema.table)
        .await?;
    Ok(diff_table(keyspace, schema, &snapshot))
}
