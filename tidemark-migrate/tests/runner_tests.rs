//! Runner behavior against the in-memory cluster.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tidemark_core::{MigrationError, TidemarkResult, Value};
use tidemark_driver::{MockCluster, SuspendingExecutor};
use tidemark_migrate::{
    async_trait, BlockingRunner, DistributedLock, Migration, MigrationContext, MigrationEntry,
    MigrationRegistry, Runner,
};
use tidemark_test_utils::assertions::assert_migration_error;

type TestRunner = Runner<SuspendingExecutor<Arc<MockCluster>>>;

fn runner(cluster: &Arc<MockCluster>, registry: MigrationRegistry) -> TestRunner {
    Runner::new(SuspendingExecutor::new(cluster.clone()), registry, config()).unwrap()
}

fn names(list: &[tidemark_migrate::MigrationName]) -> Vec<String> {
    list.iter().map(|n| n.to_string()).collect()
}

// ============================================================================
// APPLY / STATUS / ROLLBACK
// ============================================================================

#[tokio::test]
async fn test_target_status_rollback_scenario() {
    let cluster = Arc::new(MockCluster::new());
    let runner = runner(&cluster, scenario_registry());

    let report = runner.apply(false, Some("20260115_001")).await.unwrap();
    assert_eq!(report.names(), vec![A]);
    assert!(cluster.has_table("shop", "a"));
    assert!(!cluster.has_table("shop", "b"));

    let status = runner.status().await.unwrap();
    let applied: Vec<String> = status.applied().map(|e| e.name.to_string()).collect();
    let pending: Vec<String> = status.pending().map(|e| e.name.to_string()).collect();
    assert_eq!(applied, vec![A]);
    assert_eq!(pending, vec![B]);
    assert!(!status.has_checksum_mismatch());

    let report = runner.rollback(1, false).await.unwrap();
    assert_eq!(report.names(), vec![A]);
    assert!(!cluster.has_table("shop", "a"));

    assert_eq!(names(&runner.pending().await.unwrap()), vec![A, B]);
    assert_eq!(cluster.row_count("shop", "tidemark_lock"), 0);
}

#[tokio::test]
async fn test_apply_is_idempotent() {
    let cluster = Arc::new(MockCluster::new());
    let runner = runner(&cluster, scenario_registry());

    assert_eq!(runner.apply(false, None).await.unwrap().names(), vec![A, B]);
    cluster.clear_log();
    let second = runner.apply(false, None).await.unwrap();

    assert!(second.is_empty());
    assert!(!cluster
        .executed_cql()
        .iter()
        .any(|cql| cql.contains("shop.a ") || cql.contains("shop.b ")));
    assert_eq!(cluster.row_count("shop", "tidemark_migrations"), 2);
}

#[tokio::test]
async fn test_apply_follows_name_order_not_registration_order() {
    let cluster = Arc::new(MockCluster::new());
    let runner = runner(&cluster, scenario_registry());
    runner.apply(false, None).await.unwrap();

    let cql = cluster.executed_cql();
    let pos = |needle: &str| cql.iter().position(|c| c.contains(needle)).unwrap();
    assert!(pos("shop.a (") < pos("shop.b ("));
}

#[tokio::test]
async fn test_unknown_target_fails_before_locking() {
    let cluster = Arc::new(MockCluster::new());
    let runner = runner(&cluster, scenario_registry());

    let result = runner.apply(false, Some("20990101_001")).await;
    assert_migration_error(&result, |e| matches!(e, MigrationError::UnknownTarget { .. }));
    assert!(!cluster.has_table("shop", "tidemark_lock"));
}

// ============================================================================
// DRY RUN
// ============================================================================

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let cluster = Arc::new(MockCluster::new());
    let runner = runner(&cluster, scenario_registry());

    let report = runner.apply(true, None).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.names(), vec![A, B]);
    assert_eq!(
        report.outcomes[0].statements[0].cql,
        "CREATE TABLE IF NOT EXISTS shop.a (id text PRIMARY KEY)"
    );
    assert!(cluster.executed_cql().iter().all(|cql| cql.starts_with("SELECT")));
    assert!(!cluster.has_table("shop", "tidemark_migrations"));
    assert!(!cluster.has_table("shop", "tidemark_lock"));
    assert!(report.to_string().contains("Would apply 20260115_001_a"));
}

#[tokio::test]
async fn test_dry_run_rollback_leaves_state() {
    let cluster = Arc::new(MockCluster::new());
    let runner = runner(&cluster, scenario_registry());
    runner.apply(false, None).await.unwrap();

    let report = runner.rollback(2, true).await.unwrap();
    assert_eq!(report.names(), vec![B, A]);
    assert_eq!(report.outcomes[0].statements[0].cql, "DROP TABLE IF EXISTS shop.b");
    assert!(cluster.has_table("shop", "a"));
    assert!(cluster.has_table("shop", "b"));
    assert!(runner.pending().await.unwrap().is_empty());
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_statement_failure_stops_run_and_releases_lock() {
    let cluster = Arc::new(MockCluster::new());
    let runner = runner(&cluster, scenario_registry());
    cluster.fail_when("shop.b (");

    let result = runner.apply(false, None).await;

    assert_migration_error(&result, |e| {
        matches!(e, MigrationError::OperationFailed { name, .. } if name == B)
    });
    assert_eq!(names(&runner.pending().await.unwrap()), vec![B]);
    assert_eq!(cluster.row_count("shop", "tidemark_lock"), 0);
}

#[tokio::test]
async fn test_lock_contention_is_fatal() {
    let cluster = Arc::new(MockCluster::new());
    let executor = SuspendingExecutor::new(cluster.clone());
    let mut other = config();
    other.owner = "deploy-7".to_string();
    let foreign = DistributedLock::new(&executor, &other);
    foreign.ensure_table().await.unwrap();
    let _held = foreign.acquire().await.unwrap();

    let runner = runner(&cluster, scenario_registry());
    let result = runner.apply(false, None).await;

    assert_migration_error(&result, |e| {
        matches!(e, MigrationError::LockContention { holder, .. } if holder == "deploy-7")
    });
    assert!(!cluster.has_table("shop", "a"));
    assert_eq!(cluster.row_count("shop", "tidemark_lock"), 1);
}

#[tokio::test]
async fn test_rollback_refuses_irreversible_before_running() {
    let cluster = Arc::new(MockCluster::new());
    let registry = MigrationRegistry::from_entries(vec![Scripted::new("one way")
        .up("CREATE TABLE IF NOT EXISTS shop.a (id text PRIMARY KEY)")
        .down("DROP TABLE IF EXISTS shop.a")
        .irreversible()
        .entry(A)])
    .unwrap();
    let runner = runner(&cluster, registry);
    runner.apply(false, None).await.unwrap();
    cluster.clear_log();

    let result = runner.rollback(1, false).await;

    assert_migration_error(&result, |e| matches!(e, MigrationError::Irreversible { .. }));
    assert!(cluster.has_table("shop", "a"));
    assert!(!cluster.executed_cql().iter().any(|cql| cql.starts_with("DROP")));
    assert_eq!(cluster.row_count("shop", "tidemark_lock"), 0);
}

#[tokio::test]
async fn test_rollback_of_unregistered_migration_fails() {
    let cluster = Arc::new(MockCluster::new());
    runner(&cluster, scenario_registry())
        .apply(false, None)
        .await
        .unwrap();

    let only_a = MigrationRegistry::from_entries(vec![create_table(A, "a")]).unwrap();
    let result = runner(&cluster, only_a).rollback(1, false).await;

    assert_migration_error(&result, |e| {
        matches!(e, MigrationError::NotRegistered { name } if name == B)
    });
    assert!(cluster.has_table("shop", "b"));
}

#[tokio::test]
async fn test_status_reports_checksum_mismatch_and_orphans() {
    let cluster = Arc::new(MockCluster::new());
    runner(&cluster, scenario_registry())
        .apply(false, None)
        .await
        .unwrap();

    let edited = MigrationRegistry::from_entries(vec![Scripted::new("create a")
        .up("CREATE TABLE IF NOT EXISTS shop.a (id text PRIMARY KEY, note text)")
        .entry(A)])
    .unwrap();
    let status = runner(&cluster, edited).status().await.unwrap();

    assert!(status.has_checksum_mismatch());
    assert_eq!(status.orphaned.len(), 1);
    assert_eq!(status.orphaned[0].name, B);
    let rendered = status.to_string();
    assert!(rendered.contains("CHECKSUM MISMATCH"));
    assert!(rendered.contains("[orphaned] 20260203_002_b"));
}

#[tokio::test]
async fn test_agreement_timeout_does_not_block() {
    let cluster = Arc::new(MockCluster::new());
    cluster.set_peers(2);
    cluster.lag_peers(1_000_000);
    let runner = runner(&cluster, scenario_registry());

    let report = runner.apply(false, None).await.unwrap();
    assert_eq!(report.names(), vec![A, B]);
}

#[tokio::test]
async fn test_bookkeeping_tables_settle_before_lock_insert() {
    let cluster = Arc::new(MockCluster::new());
    cluster.set_peers(2);
    cluster.lag_peers(2);
    let runner = runner(&cluster, scenario_registry());

    runner.apply(false, None).await.unwrap();

    let log = cluster.executed_cql();
    let position = |needle: &str| log.iter().position(|cql| cql.contains(needle)).unwrap();
    let lock_table = position("CREATE TABLE IF NOT EXISTS shop.tidemark_lock");
    let first_poll = position("system.peers");
    let lock_insert = position("IF NOT EXISTS USING TTL");
    assert!(lock_table < first_poll);
    assert!(first_poll < lock_insert);
}

/// Lets the lock expire mid-run and hands it to another owner.
struct Hijack {
    cluster: Arc<MockCluster>,
}

#[async_trait]
impl Migration for Hijack {
    fn description(&self) -> &str {
        "outlives the lock"
    }

    async fn upgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {
        self.cluster.advance(Duration::from_secs(61));
        ctx.execute(
            "INSERT INTO shop.tidemark_lock (lock_id, acquired_at, owner) VALUES ('schema_migration', ?, 'intruder') IF NOT EXISTS USING TTL 60",
            vec![Value::Timestamp(self.cluster.now())],
        )
        .await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_lost_lock_stops_run_without_deleting_new_holder() {
    let cluster = Arc::new(MockCluster::new());
    let registry = MigrationRegistry::from_entries(vec![
        MigrationEntry::new(
            A,
            "hijack",
            Hijack {
                cluster: cluster.clone(),
            },
        ),
        create_table(B, "b"),
    ])
    .unwrap();
    let runner = runner(&cluster, registry);

    let result = runner.apply(false, None).await;

    assert_migration_error(&result, |e| matches!(e, MigrationError::LockLost { .. }));
    assert!(!cluster.has_table("shop", "b"));
    let lock_rows = cluster.rows("shop", "tidemark_lock");
    assert_eq!(lock_rows.len(), 1);
    assert_eq!(lock_rows[0].text("owner").unwrap(), "intruder");
}

// ============================================================================
// BLOCKING FACADE
// ============================================================================

#[test]
fn test_blocking_runner_round_trip() {
    let cluster = Arc::new(MockCluster::new());
    let runner = BlockingRunner::new(cluster.clone(), scenario_registry(), config()).unwrap();

    assert_eq!(runner.apply(false, None).unwrap().names(), vec![A, B]);
    assert!(runner.pending().unwrap().is_empty());
    assert_eq!(runner.rollback(1, false).unwrap().names(), vec![B]);
    assert_eq!(names(&runner.pending().unwrap()), vec![B]);
    assert!(!cluster.has_table("shop", "b"));
}
