//! Schema-agreement gate.
//!
//! Before each migration the runner waits until the coordinator and every
//! known peer report the same schema version. The wait is advisory: on
//! timeout a warning is logged and the caller carries on.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tidemark_core::{MigrateConfig, Statement, TidemarkResult};
use tidemark_driver::Executor;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOCAL_VERSION_CQL: &str = "SELECT schema_version FROM system.local";
const PEER_VERSIONS_CQL: &str = "SELECT peer, schema_version FROM system.peers";

pub struct SchemaAgreement<'a, E: ?Sized> {
    executor: &'a E,
    timeout: Duration,
    interval: Duration,
}

impl<'a, E: Executor + ?Sized> SchemaAgreement<'a, E> {
    pub fn new(executor: &'a E, timeout: Duration, interval: Duration) -> Self {
        Self {
            executor,
            timeout,
            interval,
        }
    }

    pub fn from_config(executor: &'a E, config: &MigrateConfig) -> Self {
        Self::new(executor, config.agreement_timeout, config.agreement_interval)
    }

    /// Distinct schema versions currently reported. Members that report no
    /// version are ignored.
    pub async fn versions(&self) -> TidemarkResult<BTreeSet<Uuid>> {
        let mut versions = BTreeSet::new();
        for cql in [LOCAL_VERSION_CQL, PEER_VERSIONS_CQL] {
            for row in self.executor.execute(&Statement::new(cql)).await? {
                if row.get("schema_version").is_some_and(|v| !v.is_null()) {
                    versions.insert(row.uuid("schema_version")?);
                }
            }
        }
        Ok(versions)
    }

    /// Poll until at most one version is observed or the timeout passes.
    ///
    /// Returns `Ok(false)` on timeout. Driver errors while polling are
    /// propagated.
    pub async fn wait(&self) -> TidemarkResult<bool> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut polls = 0u32;
        loop {
            let versions = self.versions().await?;
            polls += 1;
            if versions.len() <= 1 {
                if polls > 1 {
                    info!(polls, elapsed_ms = started.elapsed().as_millis() as u64, "schema agreement reached");
                }
                return Ok(true);
            }
            debug!(versions = versions.len(), polls, "schema versions disagree");
            if Instant::now() >= deadline {
                warn!(
                    versions = versions.len(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "schema agreement not reached before timeout, proceeding"
                );
                return Ok(false);
            }
            self.executor.pause(self.interval).await;
        }
    }
}
