//! TIDEMARK Migrate - Registry, Lock, Runner and Scanner
//!
//! Migrations are compiled into the application as `Migration` trait objects
//! and collected in a `MigrationRegistry`. The `Runner` applies and rolls them
//! back against one keyspace under a cluster-wide lock, recording progress in
//! an applied-migrations table. Data migrations read large tables through the
//! resumable token-range scanner.
//!
//! Everything is written against `tidemark_driver::Executor`; the
//! [`blocking`] module offers the same operations without an async runtime.

pub mod agreement;
pub mod blocking;
pub mod context;
pub mod lock;
pub mod migration;
pub mod registry;
pub mod runner;
pub mod scan;
pub mod state;

pub use agreement::SchemaAgreement;
pub use blocking::{BlockingRunner, BlockingScan};
pub use context::MigrationContext;
pub use lock::DistributedLock;
pub use migration::{Migration, MigrationEntry};
pub use registry::{slugify, MigrationName, MigrationRegistry};
pub use runner::{
    Direction, MigrationOutcome, MigrationState, RunReport, Runner, StatusEntry, StatusReport,
};
pub use scan::{scan_table, token_ranges, TableScan};
pub use state::{AppliedRecord, AppliedStore};

/// Re-exported so migration files only need this crate.
pub use async_trait::async_trait;
