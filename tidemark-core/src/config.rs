//! Configuration types
//!
//! `MigrateConfig` is passed explicitly to the runner, lock and agreement gate;
//! there is no process-wide configuration singleton. Values come from
//! `MigrateConfig::new` defaults, environment variables or a TOML file, and
//! must pass `validate()` before use.

use crate::error::{ConfigError, TidemarkResult};
use crate::is_valid_identifier;
use crate::lock::MAX_TTL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// MIGRATION RUNNER CONFIGURATION
// ============================================================================

/// Settings for one migration run against one keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfig {
    /// Target keyspace (REQUIRED)
    pub keyspace: String,
    /// Table holding applied-migration records
    pub applied_table: String,
    /// Table holding the lock row
    pub lock_table: String,
    /// Fixed identifier of the lock row
    pub lock_id: String,
    /// Owner label written into the lock row
    pub owner: String,
    /// Lock row time-to-live
    pub lock_ttl: Duration,
    /// Upper bound on waiting for schema agreement
    pub agreement_timeout: Duration,
    /// Delay between schema-version polls
    pub agreement_interval: Duration,
    /// Directory `makemigration` writes new files into
    pub migrations_dir: PathBuf,
}

impl MigrateConfig {
    /// Configuration with defaults for everything but the keyspace.
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            applied_table: "tidemark_migrations".to_string(),
            lock_table: "tidemark_lock".to_string(),
            lock_id: "schema_migration".to_string(),
            owner: default_owner(),
            lock_ttl: Duration::from_secs(60),
            agreement_timeout: Duration::from_secs(30),
            agreement_interval: Duration::from_millis(500),
            migrations_dir: PathBuf::from("migrations"),
        }
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TIDEMARK_KEYSPACE`: Target keyspace (required)
    /// - `TIDEMARK_LOCK_TTL_SECS`: Lock time-to-live (default: 60)
    /// - `TIDEMARK_AGREEMENT_TIMEOUT_SECS`: Schema agreement timeout (default: 30)
    /// - `TIDEMARK_AGREEMENT_INTERVAL_MS`: Schema agreement poll interval (default: 500)
    /// - `TIDEMARK_MIGRATIONS_DIR`: Output directory for new migrations (default: migrations)
    /// - `TIDEMARK_LOCK_OWNER`: Owner label for the lock row (default: host:pid:nonce)
    pub fn from_env() -> TidemarkResult<Self> {
        let keyspace = std::env::var("TIDEMARK_KEYSPACE").map_err(|_| {
            ConfigError::MissingRequired {
                field: "TIDEMARK_KEYSPACE".to_string(),
            }
        })?;
        let mut config = Self::new(keyspace);

        if let Some(secs) = env_u64("TIDEMARK_LOCK_TTL_SECS")? {
            config.lock_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("TIDEMARK_AGREEMENT_TIMEOUT_SECS")? {
            config.agreement_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64("TIDEMARK_AGREEMENT_INTERVAL_MS")? {
            config.agreement_interval = Duration::from_millis(ms);
        }
        if let Ok(dir) = std::env::var("TIDEMARK_MIGRATIONS_DIR") {
            config.migrations_dir = PathBuf::from(dir);
        }
        if let Ok(owner) = std::env::var("TIDEMARK_LOCK_OWNER") {
            config.owner = owner;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. Only `keyspace` is required.
    pub fn from_toml_file(path: &Path) -> TidemarkResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> TidemarkResult<Self> {
        let file: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::InvalidValue {
            field: "toml".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;

        let mut config = Self::new(file.keyspace);
        if let Some(v) = file.applied_table {
            config.applied_table = v;
        }
        if let Some(v) = file.lock_table {
            config.lock_table = v;
        }
        if let Some(v) = file.lock_id {
            config.lock_id = v;
        }
        if let Some(v) = file.owner {
            config.owner = v;
        }
        if let Some(v) = file.lock_ttl_secs {
            config.lock_ttl = Duration::from_secs(v);
        }
        if let Some(v) = file.agreement_timeout_secs {
            config.agreement_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.agreement_interval_ms {
            config.agreement_interval = Duration::from_millis(v);
        }
        if let Some(v) = file.migrations_dir {
            config.migrations_dir = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - keyspace and table names are plain identifiers
    /// - lock id and owner are non-empty
    /// - lock TTL and agreement interval are positive
    pub fn validate(&self) -> TidemarkResult<()> {
        if self.keyspace.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "keyspace".to_string(),
            }
            .into());
        }

        for (field, value) in [
            ("keyspace", &self.keyspace),
            ("applied_table", &self.applied_table),
            ("lock_table", &self.lock_table),
        ] {
            if !is_valid_identifier(value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                    reason: "must be a plain CQL identifier".to_string(),
                }
                .into());
            }
        }

        if self.lock_id.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "lock_id".to_string(),
            }
            .into());
        }
        if self.owner.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "owner".to_string(),
            }
            .into());
        }

        // Row TTLs have one-second granularity.
        if self.lock_ttl.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lock_ttl".to_string(),
                value: format!("{:?}", self.lock_ttl),
                reason: "lock_ttl must be at least one second".to_string(),
            }
            .into());
        }

        if self.lock_ttl > MAX_TTL {
            return Err(ConfigError::InvalidValue {
                field: "lock_ttl".to_string(),
                value: format!("{:?}", self.lock_ttl),
                reason: format!("lock_ttl must not exceed {}s", MAX_TTL.as_secs()),
            }
            .into());
        }

        if self.agreement_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "agreement_interval".to_string(),
                value: format!("{:?}", self.agreement_interval),
                reason: "agreement_interval must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    keyspace: String,
    applied_table: Option<String>,
    lock_table: Option<String>,
    lock_id: Option<String>,
    owner: Option<String>,
    lock_ttl_secs: Option<u64>,
    agreement_timeout_secs: Option<u64>,
    agreement_interval_ms: Option<u64>,
    migrations_dir: Option<PathBuf>,
}

fn env_u64(key: &str) -> TidemarkResult<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw,
                reason: "must be a non-negative integer".to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

/// `host:pid:nonce`, unique per process invocation.
fn default_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{}:{}:{}", host, std::process::id(), &nonce[..8])
}

// ============================================================================
// SCAN OPTIONS
// ============================================================================

/// Options for a token-range table scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Rows fetched per page request
    pub page_size: usize,
    /// Number of contiguous token ranges the ring is split into
    pub num_ranges: usize,
    /// Skip every range whose lower bound is <= this token
    pub resume_token: Option<i64>,
    /// Pause after each completed range
    pub throttle: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            num_ranges: 256,
            resume_token: None,
            throttle: Duration::ZERO,
        }
    }
}

impl ScanOptions {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn num_ranges(mut self, num_ranges: usize) -> Self {
        self.num_ranges = num_ranges;
        self
    }

    pub fn resume_token(mut self, token: i64) -> Self {
        self.resume_token = Some(token);
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn validate(&self) -> TidemarkResult<()> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "page_size".to_string(),
                value: "0".to_string(),
                reason: "page_size must be greater than 0".to_string(),
            }
            .into());
        }
        if self.num_ranges == 0 {
            return Err(ConfigError::InvalidValue {
                field: "num_ranges".to_string(),
                value: "0".to_string(),
                reason: "num_ranges must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
