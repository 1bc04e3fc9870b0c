//! Async driver trait for cooperatively-suspending execution.
//!
//! This trait is the async alternative to the blocking `Driver`. It is meant
//! for applications already running on tokio, where each statement should
//! yield to other tasks while it is in flight.

use ::async_trait::async_trait;
use tidemark_core::{Page, PagingState, Row, Statement, TidemarkResult};

/// Async driver collaborator.
///
/// Same contract as [`crate::Driver`]: failures are `Err`, never sentinels.
#[async_trait]
pub trait AsyncDriver: Send + Sync {
    /// Execute a statement and return every result row.
    async fn execute(&self, statement: &Statement) -> TidemarkResult<Vec<Row>>;

    /// Execute a statement and return one page of at most `page_size` rows.
    async fn execute_page(
        &self,
        statement: &Statement,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> TidemarkResult<Page>;
}

#[async_trait]
impl<T: AsyncDriver + ?Sized> AsyncDriver for std::sync::Arc<T> {
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
}
