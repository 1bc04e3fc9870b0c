//! Cluster-wide migration lock built on a lightweight-transaction row.
//!
//! Acquisition is a conditional insert with a row TTL; the row vanishes on
//! its own if the holder dies. Renewal is a conditional update guarded on the
//! owner column that rewrites every non-key column, since a TTL only covers
//! the cells a write touches. Release is an unconditional delete.

use chrono::Utc;
use std::time::Duration;
use tidemark_core::row::APPLIED_COLUMN;
use tidemark_core::{
    Held, Lease, LockRecord, MigrateConfig, MigrationError, Row, RowError, Statement,
    TidemarkResult, Value, MAX_TTL,
};
use tidemark_driver::Executor;
use tracing::{debug, info, warn};

/// Lock operations against `keyspace.lock_table`.
pub struct DistributedLock<'a, E: ?Sized> {
    executor: &'a E,
    qualified_table: String,
    lock_id: String,
    owner: String,
    ttl: Duration,
}

impl<'a, E: Executor + ?Sized> DistributedLock<'a, E> {
    pub fn new(executor: &'a E, config: &MigrateConfig) -> Self {
        Self {
            executor,
            qualified_table: format!("{}.{}", config.keyspace, config.lock_table),
            lock_id: config.lock_id.clone(),
            owner: config.owner.clone(),
            ttl: config.lock_ttl,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Create the lock table if it is missing.
    pub async fn ensure_table(&self) -> TidemarkResult<()> {
        let cql = format!(
            "CREATE TABLE IF NOT EXISTS {} (lock_id text PRIMARY KEY, acquired_at timestamp, owner text)",
            self.qualified_table
        );
        self.executor.execute(&Statement::new(cql)).await?;
        Ok(())
    }

    /// Try once to take the lock. Contention is an error; there is no retry.
    pub async fn acquire(&self) -> TidemarkResult<Lease<Held>> {
        let record = LockRecord::new(&self.lock_id, &self.owner, Utc::now(), self.ttl);
        let statement = Statement::new(format!(
            "INSERT INTO {} (lock_id, acquired_at, owner) VALUES (?, ?, ?) IF NOT EXISTS USING TTL ?",
            self.qualified_table
        ))
        .bind(record.lock_id.as_str())
        .bind(record.acquired_at)
        .bind(record.owner.as_str())
        .bind(self.ttl_secs());

        let rows = self.executor.execute(&statement).await?;
        let outcome = lwt_outcome(&rows)?;
        if !outcome.boolean(APPLIED_COLUMN)? {
            let holder = outcome.opt_text("owner")?.unwrap_or("unknown").to_string();
            return Err(MigrationError::LockContention {
                lock_id: self.lock_id.clone(),
                holder,
            }
            .into());
        }

        info!(
            lock_id = %self.lock_id,
            owner = %self.owner,
            ttl_secs = self.ttl.as_secs(),
            "migration lock acquired"
        );
        Ok(Lease::new(record))
    }

    /// Extend the lock's TTL, provided we still own it.
    pub async fn renew(&self, lease: &Lease<Held>) -> TidemarkResult<Lease<Held>> {
        let now = Utc::now();
        match lease.record().remaining(now) {
            Some(left) => debug!(
                lock_id = %lease.lock_id(),
                remaining_ms = left.as_millis() as u64,
                "renewing migration lock"
            ),
            None => warn!(lock_id = %lease.lock_id(), "renewing migration lock after its local expiry"),
        }
        let statement = Statement::new(format!(
            "UPDATE {} USING TTL ? SET owner = ?, acquired_at = ? WHERE lock_id = ? IF owner = ?",
            self.qualified_table
        ))
        .bind(self.ttl_secs())
        .bind(lease.owner())
        .bind(now)
        .bind(lease.lock_id())
        .bind(lease.owner());

        let rows = self.executor.execute(&statement).await?;
        if !lwt_outcome(&rows)?.boolean(APPLIED_COLUMN)? {
            return Err(MigrationError::LockLost {
                lock_id: lease.lock_id().to_string(),
            }
            .into());
        }
        debug!(lock_id = %lease.lock_id(), "migration lock renewed");
        Ok(lease.clone().renewed(now, self.ttl))
    }

    /// Delete the lock row.
    pub async fn release(&self, lease: Lease<Held>) -> TidemarkResult<()> {
        let record = lease.release();
        let statement = Statement::new(format!(
            "DELETE FROM {} WHERE lock_id = ?",
            self.qualified_table
        ))
        .bind(record.lock_id.as_str());
        self.executor.execute(&statement).await?;
        info!(lock_id = %record.lock_id, owner = %record.owner, "migration lock released");
        Ok(())
    }

    fn ttl_secs(&self) -> Value {
        let secs = self.ttl.min(MAX_TTL).as_secs().max(1);
        Value::Int(i32::try_from(secs).unwrap_or(i32::MAX))
    }
}

fn lwt_outcome(rows: &[Row]) -> TidemarkResult<&Row> {
    rows.first().ok_or_else(|| {
        RowError::MissingColumn {
            column: APPLIED_COLUMN.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidemark_core::TidemarkError;
    use tidemark_driver::{MockCluster, SuspendingExecutor};
    use tidemark_test_utils::assertions::assert_migration_error;

    fn config(owner: &str) -> MigrateConfig {
        let mut config = MigrateConfig::new("shop");
        config.owner = owner.to_string();
        config.lock_ttl = Duration::from_secs(30);
        config
    }

    #[tokio::test]
    async fn test_second_acquire_fails_until_release() {
        let cluster = Arc::new(MockCluster::new());
        let executor = SuspendingExecutor::new(cluster.clone());
        let alice_config = config("alice");
        let bob_config = config("bob");
        let alice = DistributedLock::new(&executor, &alice_config);
        let bob = DistributedLock::new(&executor, &bob_config);
        alice.ensure_table().await.unwrap();

        let lease = alice.acquire().await.unwrap();
        let contended = bob.acquire().await;
        assert_migration_error(&contended, |e| {
            matches!(e, MigrationError::LockContention { holder, .. } if holder == "alice")
        });

        alice.release(lease).await.unwrap();
        assert!(bob.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_same_owner_cannot_reacquire() {
        let cluster = Arc::new(MockCluster::new());
        let executor = SuspendingExecutor::new(cluster);
        let cfg = config("alice");
        let lock = DistributedLock::new(&executor, &cfg);
        lock.ensure_table().await.unwrap();

        assert!(lock.acquire().await.is_ok());
        assert!(matches!(
            lock.acquire().await,
            Err(TidemarkError::Migration(MigrationError::LockContention { .. }))
        ));
    }

    #[tokio::test]
    async fn test_lock_expires_after_ttl() {
        let cluster = Arc::new(MockCluster::new());
        let executor = SuspendingExecutor::new(cluster.clone());
        let alice_config = config("alice");
        let bob_config = config("bob");
        let alice = DistributedLock::new(&executor, &alice_config);
        let bob = DistributedLock::new(&executor, &bob_config);
        alice.ensure_table().await.unwrap();

        let _abandoned = alice.acquire().await.unwrap();
        cluster.advance(Duration::from_secs(31));
        assert!(bob.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_renew_extends_and_detects_loss() {
        let cluster = Arc::new(MockCluster::new());
        let executor = SuspendingExecutor::new(cluster.clone());
        let alice_config = config("alice");
        let bob_config = config("bob");
        let alice = DistributedLock::new(&executor, &alice_config);
        let bob = DistributedLock::new(&executor, &bob_config);
        alice.ensure_table().await.unwrap();

        let lease = alice.acquire().await.unwrap();
        cluster.advance(Duration::from_secs(20));
        let lease = alice.renew(&lease).await.unwrap();
        cluster.advance(Duration::from_secs(20));
        // Without the renewal the row would have expired by now.
        assert_eq!(cluster.row_count("shop", "tidemark_lock"), 1);

        cluster.advance(Duration::from_secs(11));
        let _stolen = bob.acquire().await.unwrap();
        let lost = alice.renew(&lease).await;
        assert_migration_error(&lost, |e| matches!(e, MigrationError::LockLost { .. }));
    }

    #[tokio::test]
    async fn test_repeated_renewal_outlives_original_ttl() {
        let cluster = Arc::new(MockCluster::new());
        let executor = SuspendingExecutor::new(cluster.clone());
        let alice_config = config("alice");
        let bob_config = config("bob");
        let alice = DistributedLock::new(&executor, &alice_config);
        let bob = DistributedLock::new(&executor, &bob_config);
        alice.ensure_table().await.unwrap();

        let mut lease = alice.acquire().await.unwrap();
        for _ in 0..4 {
            cluster.advance(Duration::from_secs(20));
            lease = alice.renew(&lease).await.unwrap();
        }
        assert!(matches!(
            bob.acquire().await,
            Err(TidemarkError::Migration(MigrationError::LockContention { .. }))
        ));

        let renewals: Vec<String> = cluster
            .executed_cql()
            .into_iter()
            .filter(|cql| cql.starts_with("UPDATE"))
            .collect();
        assert_eq!(renewals.len(), 4);
        assert!(renewals.iter().all(|cql| cql.contains("SET owner = ?")));
    }

    #[tokio::test]
    async fn test_ttl_is_clamped_to_cluster_maximum() {
        let cluster = Arc::new(MockCluster::new());
        let executor = SuspendingExecutor::new(cluster.clone());
        let mut long = config("alice");
        long.lock_ttl = MAX_TTL * 2;
        let lock = DistributedLock::new(&executor, &long);
        lock.ensure_table().await.unwrap();

        let lease = lock.acquire().await.unwrap();
        let acquire = cluster
            .statements()
            .into_iter()
            .find(|s| s.cql.starts_with("INSERT"))
            .unwrap();
        assert!(acquire
            .params
            .contains(&Value::Int(MAX_TTL.as_secs() as i32)));
        assert!(lock.renew(&lease).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_lwt_outcome_is_an_error() {
        assert!(matches!(
            lwt_outcome(&[]),
            Err(TidemarkError::Row(RowError::MissingColumn { .. }))
        ));
    }

    mod prop_tests {
        use super::*;
        use futures::executor::block_on;
        use proptest::prelude::*;
        use tidemark_driver::BlockingExecutor;

        #[derive(Debug, Clone)]
        enum Op {
            Acquire(usize),
            ReleaseHeld,
            Advance(u64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0usize..3).prop_map(Op::Acquire),
                Just(Op::ReleaseHeld),
                prop::sample::select(vec![1u64, 7, 29, 45]).prop_map(Op::Advance),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// At most one owner holds the lock at any time: an acquire
            /// succeeds exactly when no unexpired lease exists.
            #[test]
            fn prop_mutual_exclusion(ops in prop::collection::vec(op(), 1..30)) {
                let cluster = Arc::new(MockCluster::new());
                let executor = BlockingExecutor::new(cluster.clone());
                let configs: Vec<MigrateConfig> =
                    ["alice", "bob", "carol"].iter().map(|o| config(o)).collect();
                let locks: Vec<_> = configs
                    .iter()
                    .map(|c| DistributedLock::new(&executor, c))
                    .collect();
                block_on(locks[0].ensure_table()).unwrap();

                // (owner index, lease, seconds since acquisition)
                let mut held: Option<(usize, Lease<Held>, u64)> = None;
                for op in ops {
                    match op {
                        Op::Acquire(who) => {
                            let free = held.as_ref().map_or(true, |(_, _, age)| *age >= 30);
                            let result = block_on(locks[who].acquire());
                            prop_assert_eq!(result.is_ok(), free);
                            if let Ok(lease) = result {
                                held = Some((who, lease, 0));
                            }
                        }
                        Op::ReleaseHeld => {
                            if let Some((who, lease, age)) = held.take() {
                                if age < 30 {
                                    block_on(locks[who].release(lease)).unwrap();
                                } else {
                                    held = Some((who, lease, age));
                                }
                            }
                        }
                        Op::Advance(secs) => {
                            cluster.advance(Duration::from_secs(secs));
                            if let Some((_, _, age)) = held.as_mut() {
                                *age += secs;
                            }
                        }
                    }
                }
            }
        }
    }
}
