//! TIDEMARK Driver - Statement Execution Traits and Mock Cluster
//!
//! Defines the driver collaborator contract (blocking `Driver` and suspending
//! `AsyncDriver`), the `Executor` capability every core algorithm is written
//! against, the two concrete executors, and `MockCluster`, an in-memory
//! cluster used by tests across the workspace.
//!
//! Connection setup and pooling belong to the application; Tidemark only
//! needs something that can run a statement and return rows.

pub mod async_trait;
pub mod executor;
pub mod mock;

pub use crate::async_trait::AsyncDriver;
pub use executor::{BlockingExecutor, Executor, SuspendingExecutor};
pub use mock::MockCluster;

use tidemark_core::{Page, PagingState, Row, Statement, TidemarkResult};

// ============================================================================
// BLOCKING DRIVER TRAIT
// ============================================================================

/// Blocking driver collaborator.
///
/// Implementations must report failures as `Err`; returning an empty or
/// sentinel row set on failure is a contract violation.
pub trait Driver: Send + Sync {
    /// Execute a statement and return every result row.
    fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>>;

    /// Execute a statement and return one page of at most `page_size` rows.
    ///
    /// Pass the previous page's `paging_state` to continue; `None` starts
    /// from the beginning.
    fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page>;
}

impl<T: Driver + ?Sized> Driver for std::sync::Arc<T> {
    fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>> {
        (**self).execute(statement)
    }

    fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page> {
        (**self).execute_page(statement, page_size, paging_state)
    }
}
