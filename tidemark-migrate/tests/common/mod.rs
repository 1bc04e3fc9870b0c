//! Shared helpers for runner integration tests.

#![allow(dead_code)]

use std::time::Duration;
use tidemark_core::{MigrateConfig, TidemarkResult};
use tidemark_migrate::{async_trait, Migration, MigrationContext, MigrationEntry, MigrationRegistry};

pub const A: &str = "20260115_001_a";
pub const B: &str = "20260203_002_b";

/// A migration that runs fixed statement lists.
pub struct Scripted {
    description: String,
    up: Vec<String>,
    down: Vec<String>,
    reversible: bool,
}

impl Scripted {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            up: Vec::new(),
            down: Vec::new(),
            reversible: true,
        }
    }

    pub fn up(mut self, cql: &str) -> Self {
        self.up.push(cql.to_string());
        self
    }

    pub fn down(mut self, cql: &str) -> Self {
        self.down.push(cql.to_string());
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }

    /// Register under `name`, checksummed over the statement text.
    pub fn entry(self, name: &str) -> MigrationEntry {
        let source = format!("{}\n{}", self.up.join("\n"), self.down.join("\n"));
        MigrationEntry::from_source(name, &source, self)
    }
}

#[async_trait]
impl Migration for Scripted {
    fn description(&self) -> &str {
        &self.description
    }

    fn reversible(&self) -> bool {
        self.reversible
    }

    async fn upgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {
        for cql in &self.up {
            ctx.execute(cql, vec![]).await?;
        }
        Ok(())
    }

    async fn downgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {
        for cql in &self.down {
            ctx.execute(cql, vec![]).await?;
        }
        Ok(())
    }
}

/// Migration that creates `shop.<table>` and drops it on the way down.
pub fn create_table(name: &str, table: &str) -> MigrationEntry {
    Scripted::new(&format!("create {}", table))
        .up(&format!("CREATE TABLE IF NOT EXISTS shop.{} (id text PRIMARY KEY)", table))
        .down(&format!("DROP TABLE IF EXISTS shop.{}", table))
        .entry(name)
}

/// The two-migration registry `a`, `b`, each creating its own table.
pub fn scenario_registry() -> MigrationRegistry {
    MigrationRegistry::from_entries(vec![create_table(B, "b"), create_table(A, "a")])
        .unwrap_or_else(|e| panic!("invalid scenario registry: {}", e))
}

/// Fast agreement polling so lagging-peer tests stay quick.
pub fn config() -> MigrateConfig {
    let mut config = MigrateConfig::new("shop");
    config.owner = "runner-test".to_string();
    config.agreement_timeout = Duration::from_millis(20);
    config.agreement_interval = Duration::from_millis(1);
    config
}
