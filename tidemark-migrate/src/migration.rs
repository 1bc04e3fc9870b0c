//! The `Migration` trait and its registered form.

use crate::context::MigrationContext;
use async_trait::async_trait;
use std::fmt;
use tidemark_core::{compute_checksum, Checksum, TidemarkResult};

/// One schema or data change, compiled into the application.
///
/// `upgrade` and `downgrade` issue their statements through the context,
/// which either executes them or, in dry-run mode, only records them.
#[async_trait]
pub trait Migration: Send + Sync {
    fn description(&self) -> &str;

    /// Whether `downgrade` undoes `upgrade`. Rollback refuses migrations
    /// that return false.
    fn reversible(&self) -> bool {
        true
    }

    /// Whether the migration knowingly discards data.
    fn allow_destructive(&self) -> bool {
        false
    }

    async fn upgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()>;

    async fn downgrade(&self, _ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {
        Ok(())
    }
}

/// A migration paired with its name and content checksum.
pub struct MigrationEntry {
    name: String,
    checksum: Checksum,
    migration: Box<dyn Migration>,
}

impl MigrationEntry {
    /// Entry whose checksum is taken over `source`, normally the migration
    /// file's own text via `include_str!`.
    pub fn from_source(
        name: impl Into<String>,
        source: &str,
        migration: impl Migration + 'static,
    ) -> Self {
        Self::new(name, compute_checksum(source.as_bytes()), migration)
    }

    pub fn new(
        name: impl Into<String>,
        checksum: impl Into<Checksum>,
        migration: impl Migration + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
            migration: Box::new(migration),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn migration(&self) -> &dyn Migration {
        self.migration.as_ref()
    }

    pub fn description(&self) -> &str {
        self.migration.description()
    }
}

impl fmt::Debug for MigrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEntry")
            .field("name", &self.name)
            .field("checksum", &self.checksum)
            .field("description", &self.migration.description())
            .field("reversible", &self.migration.reversible())
            .finish()
    }
}
