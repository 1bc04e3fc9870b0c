//! The statement-executor capability and its two concrete executors.
//!
//! Every core algorithm (introspection, locking, agreement polling, the
//! runner, the scanner) is written once against [`Executor`]. Which
//! scheduling model it runs under is decided solely by the executor:
//!
//! - [`BlockingExecutor`] wraps a blocking [`Driver`]. Its futures complete
//!   on first poll and `pause` sleeps the calling thread, so the core can be
//!   driven by a trivial `block_on`.
//! - [`SuspendingExecutor`] wraps an [`AsyncDriver`]. Every network call and
//!   every pause is a real suspension point on the tokio runtime.

use crate::{AsyncDriver, Driver};
use ::async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tidemark_core::{Page, PagingState, Row, Statement, TidemarkResult};

/// Abstract statement-execution capability.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>>;

    async fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page>;

    /// Wait for `duration` in the executor's scheduling model.
    async fn pause(&self, duration: Duration);
}

#[async_trait]
impl<T: Executor + ?Sized> Executor for Arc<T> {
    async fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>> {
        (**self).execute(statement).await
    }

    async fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page> {
        (**self).execute_page(statement, page_size, paging_state).await
    }

    async fn pause(&self, duration: Duration) {
        (**self).pause(duration).await
    }
}

// ============================================================================
// BLOCKING EXECUTOR
// ============================================================================

/// Runs statements synchronously on the calling thread.
#[derive(Debug, Clone)]
pub struct BlockingExecutor<D> {
    driver: D,
}

impl<D: Driver> BlockingExecutor<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[async_trait]
impl<D: Driver> Executor for BlockingExecutor<D> {
    async fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>> {
        tracing::debug!(cql = %statement.cql, "execute (blocking)");
        self.driver.execute(statement)
    }

    async fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page> {
        self.driver.execute_page(statement, page_size, paging_state)
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

// ============================================================================
// SUSPENDING EXECUTOR
// ============================================================================

/// Runs statements through an async driver, yielding at every call.
#[derive(Debug, Clone)]
pub struct SuspendingExecutor<D> {
    driver: D,
}

impl<D: AsyncDriver> SuspendingExecutor<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[async_trait]
impl<D: AsyncDriver> Executor for SuspendingExecutor<D> {
    async fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>> {
        tracing::debug!(cql = %statement.cql, "execute (async)");
        self.driver.execute(statement).await
    }

    async fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page> {
        self.driver
            .execute_page(statement, page_size, paging_state)
            .await
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockCluster;
    use tidemark_core::Value;

    const CREATE: &str = "CREATE TABLE IF NOT EXISTS shop.items (id text PRIMARY KEY, name text)";

    #[test]
    fn test_blocking_executor_runs_on_first_poll() {
        let executor = BlockingExecutor::new(MockCluster::new());
        futures::executor::block_on(async {
            executor.execute(&Statement::new(CREATE)).await.unwrap();
            executor
                .execute(
                    &Statement::new("INSERT INTO shop.items (id, name) VALUES (?, ?)")
                        .bind("a")
                        .bind("anvil"),
                )
                .await
                .unwrap();
            let rows = executor
                .execute(&Statement::new("SELECT name FROM shop.items"))
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].get("name"), Some(&Value::Text("anvil".to_string())));
        });
    }

    #[tokio::test]
    async fn test_suspending_executor_shares_state_through_arc() {
        let cluster = Arc::new(MockCluster::new());
        let executor = SuspendingExecutor::new(cluster.clone());
        executor.execute(&Statement::new(CREATE)).await.unwrap();
        assert!(cluster.has_table("shop", "items"));
        executor.pause(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn test_executor_through_arc_dyn() {
        let executor: Arc<dyn Executor> = Arc::new(SuspendingExecutor::new(MockCluster::new()));
        executor.execute(&Statement::new(CREATE)).await.unwrap();
        let page = executor
            .execute_page(&Statement::new("SELECT * FROM shop.items"), 10, None)
            .await
            .unwrap();
        assert!(page.rows.is_empty());
        assert!(page.paging_state.is_none());
    }
}
