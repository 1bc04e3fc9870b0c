//! Error types for TIDEMARK operations

use thiserror::Error;

/// Driver / statement execution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Query failed: {statement}: {reason}")]
    QueryFailed { statement: String, reason: String },

    #[error("Unsupported statement: {statement}")]
    Unsupported { statement: String },

    #[error("Driver lock poisoned")]
    LockPoisoned,
}

/// Row decoding errors raised at the driver boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("Missing column in result row: {column}")]
    MissingColumn { column: String },

    #[error("Column {column} has type {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid catalog value for {column}: {value}")]
    InvalidCatalogValue { column: String, value: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Migration registry, locking and runner errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Invalid migration name {name}: expected YYYYMMDD_NNN_slug")]
    InvalidName { name: String },

    #[error("Duplicate migration name: {name}")]
    DuplicateName { name: String },

    #[error("Migration lock {lock_id} is held by {holder}")]
    LockContention { lock_id: String, holder: String },

    #[error("Migration lock {lock_id} was lost to another owner")]
    LockLost { lock_id: String },

    #[error("Migration {name} is not reversible")]
    Irreversible { name: String },

    #[error("Unknown migration target: {target}")]
    UnknownTarget { target: String },

    #[error("Applied migration {name} is not registered")]
    NotRegistered { name: String },

    #[error("Migration {name} failed: {reason}")]
    OperationFailed { name: String, reason: String },

    #[error("Table {keyspace}.{table} does not exist")]
    UnknownTable { keyspace: String, table: String },
}

/// Migration rendering / file generation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Nothing to render: schema is up to date")]
    NothingToRender,

    #[error("Failed to write migration file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Unknown schema module: {module}")]
    UnknownModule { module: String },
}

/// Master error type for all TIDEMARK errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TidemarkError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Row error: {0}")]
    Row(#[from] RowError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Result type alias for TIDEMARK operations.
pub type TidemarkResult<T> = Result<T, TidemarkError>;

// =============================================================================
// TESTS
// =============================================================================
