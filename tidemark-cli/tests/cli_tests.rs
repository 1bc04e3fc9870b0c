//! Command behavior against the in-memory cluster.

use chrono::NaiveDate;
use std::sync::Arc;
use tidemark_cli::{run, Cli, CliEnvironment, Parser, SchemaCatalog};
use tidemark_core::{
    ColumnDefinition, MigrateConfig, SortOrder, Statement, TableSchema, TidemarkResult, WireType,
};
use tidemark_driver::{Driver, Executor, MockCluster, SuspendingExecutor};
use tidemark_migrate::{async_trait, Migration, MigrationContext, MigrationEntry, MigrationRegistry};
use tidemark_test_utils::fixtures::{create_items_table, items_schema};

// ============================================================================
// HELPERS
// ============================================================================

fn rated_items() -> TableSchema {
    let mut schema = items_schema();
    schema
        .columns
        .push(ColumnDefinition::new("rating", WireType::Int));
    schema
}

fn env(cluster: &Arc<MockCluster>, registry: MigrationRegistry, dir: &std::path::Path) -> CliEnvironment {
    let executor: Arc<dyn Executor> = Arc::new(SuspendingExecutor::new(cluster.clone()));
    let mut config = MigrateConfig::new("shop");
    config.migrations_dir = dir.to_path_buf();
    config.agreement_interval = std::time::Duration::from_millis(1);
    let catalog = SchemaCatalog::new().module("shop", vec![rated_items()]);
    CliEnvironment::new(executor, config, registry, catalog)
        .with_today(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap())
}

async fn run_args(args: &[&str], env: CliEnvironment) -> (TidemarkResult<i32>, String) {
    let cli = Cli::try_parse_from(std::iter::once("tidemark").chain(args.iter().copied())).unwrap();
    let mut out = Vec::new();
    let result = run(cli, env, &mut out).await;
    (result, String::from_utf8(out).unwrap())
}

struct AddRating;

#[async_trait]
impl Migration for AddRating {
    fn description(&self) -> &str {
        "add rating"
    }

    async fn upgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {
        ctx.execute("ALTER TABLE shop.items ADD rating int", vec![]).await?;
        Ok(())
    }

    async fn downgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {
        ctx.execute("ALTER TABLE shop.items DROP rating", vec![]).await?;
        Ok(())
    }
}

fn registry_with_checksum(checksum: &str) -> MigrationRegistry {
    MigrationRegistry::from_entries(vec![MigrationEntry::new(
        "20260115_001_add_rating",
        checksum,
        AddRating,
    )])
    .unwrap()
}

// ============================================================================
// ARGUMENT PARSING
// ============================================================================

#[test]
fn test_migrate_flag_rules() {
    let parse = |args: &[&str]| Cli::try_parse_from(std::iter::once("tidemark").chain(args.iter().copied()));

    assert!(parse(&["migrate"]).is_ok());
    assert!(parse(&["migrate", "--rollback", "--steps", "3", "--dry-run"]).is_ok());
    assert!(parse(&["migrate", "--target", "20260115_001"]).is_ok());
    assert!(parse(&["migrate", "--steps", "2"]).is_err());
    assert!(parse(&["migrate", "--status", "--rollback"]).is_err());
    assert!(parse(&["migrate", "--status", "--dry-run"]).is_err());
    assert!(parse(&["migrate", "--rollback", "--target", "20260115_001"]).is_err());
    assert!(parse(&["makemigration", "--name", "add rating", "--module", "shop"]).is_ok());
    assert!(parse(&["makemigration", "--name", "add rating"]).is_err());
    assert!(parse(&["schema-diff", "--module", "shop"]).is_ok());
}

// ============================================================================
// MAKEMIGRATION / SCHEMA-DIFF
// ============================================================================

#[tokio::test]
async fn test_makemigration_writes_numbered_file() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);

    let (result, output) = run_args(
        &["makemigration", "--name", "Add rating", "--module", "shop"],
        env(&cluster, MigrationRegistry::new(), dir.path()),
    )
    .await;

    assert_eq!(result.unwrap(), 0);
    let path = dir.path().join("m20260115_001_add_rating.rs");
    let source = std::fs::read_to_string(&path).unwrap();
    assert!(source.contains("ctx.execute(\"ALTER TABLE shop.items ADD rating int\", vec![]).await?;"));
    assert!(source.contains("include_str!(\"m20260115_001_add_rating.rs\")"));
    assert!(output.contains("add rating"));
    assert!(output.contains("Created"));
}

#[tokio::test]
async fn test_makemigration_numbers_after_registry() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);

    let (result, _) = run_args(
        &["makemigration", "--name", "add rating", "--module", "shop"],
        env(&cluster, registry_with_checksum("x"), dir.path()),
    )
    .await;

    assert_eq!(result.unwrap(), 0);
    assert!(dir.path().join("m20260115_002_add_rating.rs").exists());
}

#[tokio::test]
async fn test_makemigration_without_changes_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);
    Driver::execute(cluster.as_ref(), &Statement::new("ALTER TABLE shop.items ADD rating int")).unwrap();

    let (result, output) = run_args(
        &["makemigration", "--name", "noop", "--module", "shop"],
        env(&cluster, MigrationRegistry::new(), dir.path()),
    )
    .await;

    assert_eq!(result.unwrap(), 0);
    assert!(output.contains("No changes detected"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_makemigration_flags_unsafe_changes() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);
    let mut env = env(&cluster, MigrationRegistry::new(), dir.path());
    let mut schema = items_schema();
    schema
        .columns
        .push(ColumnDefinition::new("created", WireType::Timestamp).clustering(0, SortOrder::Desc));
    env.catalog = SchemaCatalog::new().module("shop", vec![schema]);

    let (result, output) = run_args(&["makemigration", "--name", "re key", "--module", "shop"], env).await;

    assert_eq!(result.unwrap(), 2);
    assert!(output.contains("UNSAFE"));
    let source = std::fs::read_to_string(dir.path().join("m20260115_001_re_key.rs")).unwrap();
    assert!(source.contains("MANUAL STEP REQUIRED"));
}

#[tokio::test]
async fn test_schema_diff_prints_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);

    let (result, output) = run_args(
        &["schema-diff", "--module", "shop"],
        env(&cluster, MigrationRegistry::new(), dir.path()),
    )
    .await;

    assert_eq!(result.unwrap(), 0);
    assert!(output.starts_with("shop.items:"));
    assert!(output.contains("add rating"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_module_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());

    let (result, _) = run_args(
        &["schema-diff", "--module", "billing"],
        env(&cluster, MigrationRegistry::new(), dir.path()),
    )
    .await;

    assert!(result.is_err());
}

// ============================================================================
// MIGRATE
// ============================================================================

#[tokio::test]
async fn test_migrate_dry_run_then_apply_then_status() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);

    let (result, output) = run_args(
        &["migrate", "--dry-run"],
        env(&cluster, registry_with_checksum("one"), dir.path()),
    )
    .await;
    assert_eq!(result.unwrap(), 0);
    assert!(output.contains("Would apply 20260115_001_add_rating"));
    assert!(output.contains("ALTER TABLE shop.items ADD rating int"));

    let (result, output) = run_args(&["migrate"], env(&cluster, registry_with_checksum("one"), dir.path())).await;
    assert_eq!(result.unwrap(), 0);
    assert!(output.contains("Applied 20260115_001_add_rating"));

    let (result, output) = run_args(
        &["migrate", "--status"],
        env(&cluster, registry_with_checksum("one"), dir.path()),
    )
    .await;
    assert_eq!(result.unwrap(), 0);
    assert!(output.contains("[applied]"));
}

#[tokio::test]
async fn test_migrate_status_exits_one_on_checksum_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);
    run_args(&["migrate"], env(&cluster, registry_with_checksum("one"), dir.path()))
        .await
        .0
        .unwrap();

    let (result, output) = run_args(
        &["migrate", "--status"],
        env(&cluster, registry_with_checksum("two"), dir.path()),
    )
    .await;

    assert_eq!(result.unwrap(), 1);
    assert!(output.contains("CHECKSUM MISMATCH"));
}

#[tokio::test]
async fn test_migrate_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(MockCluster::new());
    create_items_table(&cluster);
    run_args(&["migrate"], env(&cluster, registry_with_checksum("one"), dir.path()))
        .await
        .0
        .unwrap();

    let (result, output) = run_args(
        &["migrate", "--rollback", "--steps", "1"],
        env(&cluster, registry_with_checksum("one"), dir.path()),
    )
    .await;

    assert_eq!(result.unwrap(), 0);
    assert!(output.contains("Rolled back 20260115_001_add_rating"));
    let columns = cluster.columns("shop", "items").unwrap();
    assert!(!columns.iter().any(|c| c.name == "rating"));
}
