//! TIDEMARK CLI - `migrate`, `makemigration` and `schema-diff`
//!
//! Migrations are compiled into the application, so the command surface is
//! a library: the application's own binary builds a [`CliEnvironment`] (an
//! executor, the keyspace config, its migration registry and schema catalog)
//! and hands it to [`execute`] or [`execute_blocking`].

pub mod catalog;
pub mod logging;

pub use catalog::SchemaCatalog;
pub use clap::{Parser, Subcommand};
pub use logging::init_tracing;

use chrono::{NaiveDate, Utc};
use clap::Args;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tidemark_core::{MigrateConfig, RenderError, TidemarkResult};
use tidemark_driver::Executor;
use tidemark_migrate::{slugify, MigrationName, MigrationRegistry, Runner};
use tidemark_schema::{diff_live, MigrationRenderer};

// ============================================================================
// ARGUMENTS
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "tidemark")]
#[command(about = "Schema migrations and backfills for wide-column stores")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply, roll back or report on migrations
    Migrate(MigrateArgs),
    /// Diff live tables against a schema module and write a migration file
    #[command(name = "makemigration")]
    MakeMigration(MakeMigrationArgs),
    /// Print the diff between live tables and a schema module
    SchemaDiff(SchemaDiffArgs),
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Log the statements instead of executing them
    #[arg(long, conflicts_with = "status")]
    pub dry_run: bool,

    /// Show applied and pending migrations
    #[arg(long, conflicts_with_all = ["rollback", "target"])]
    pub status: bool,

    /// Roll back the most recently applied migrations
    #[arg(long, conflicts_with = "target")]
    pub rollback: bool,

    /// How many migrations to roll back
    #[arg(long, requires = "rollback", default_value_t = 1)]
    pub steps: usize,

    /// Stop after this migration (full name or YYYYMMDD_NNN)
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Debug, Args)]
pub struct MakeMigrationArgs {
    /// Short description, also used for the file slug
    #[arg(long)]
    pub name: String,

    /// Schema module to compare against the live cluster
    #[arg(long)]
    pub module: String,
}

#[derive(Debug, Args)]
pub struct SchemaDiffArgs {
    /// Schema module to compare against the live cluster
    #[arg(long)]
    pub module: String,
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Everything a command needs from the host application.
pub struct CliEnvironment {
    pub executor: Arc<dyn Executor>,
    pub config: MigrateConfig,
    pub registry: MigrationRegistry,
    pub catalog: SchemaCatalog,
    /// Date used to number new migrations; today (UTC) when unset.
    pub today: Option<NaiveDate>,
}

impl CliEnvironment {
    pub fn new(
        executor: Arc<dyn Executor>,
        config: MigrateConfig,
        registry: MigrationRegistry,
        catalog: SchemaCatalog,
    ) -> Self {
        Self {
            executor,
            config,
            registry,
            catalog,
            today: None,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Parse the process arguments, run the command and return the exit code.
///
/// Errors are logged and printed to stderr and yield exit code 1.
pub async fn execute(env: CliEnvironment) -> i32 {
    init_tracing();
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    finish(run(cli, env, &mut stdout).await)
}

/// [`execute`] for applications whose executor never suspends
/// (`BlockingExecutor`).
pub fn execute_blocking(env: CliEnvironment) -> i32 {
    init_tracing();
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    finish(futures::executor::block_on(run(cli, env, &mut stdout)))
}

fn finish(result: TidemarkResult<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {}", err);
            1
        }
    }
}

/// Run one parsed command, writing human-readable output to `out`.
///
/// Exit codes: 0 success, 1 checksum mismatch reported by `migrate --status`,
/// 2 `makemigration` emitted unsafe changes.
pub async fn run<W: Write>(cli: Cli, env: CliEnvironment, out: &mut W) -> TidemarkResult<i32> {
    match cli.command {
        Commands::Migrate(args) => migrate(args, env, out).await,
        Commands::MakeMigration(args) => make_migration(args, env, out).await,
        Commands::SchemaDiff(args) => schema_diff(args, env, out).await,
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

async fn migrate<W: Write>(args: MigrateArgs, env: CliEnvironment, out: &mut W) -> TidemarkResult<i32> {
    let runner = Runner::new(env.executor, env.registry, env.config)?;

    if args.status {
        let report = runner.status().await?;
        emit(out, &report.to_string())?;
        return Ok(if report.has_checksum_mismatch() { 1 } else { 0 });
    }

    let report = if args.rollback {
        runner.rollback(args.steps, args.dry_run).await?
    } else {
        runner.apply(args.dry_run, args.target.as_deref()).await?
    };
    emit(out, &report.to_string())?;
    Ok(0)
}

async fn make_migration<W: Write>(
    args: MakeMigrationArgs,
    env: CliEnvironment,
    out: &mut W,
) -> TidemarkResult<i32> {
    let schemas = env.catalog.get(&args.module)?;
    let mut renderer = MigrationRenderer::new(args.name.as_str());
    let mut unsafe_changes = false;
    for schema in schemas {
        let diff = diff_live(env.executor.as_ref(), &env.config.keyspace, schema).await?;
        emit(out, &format!("{}\n", diff))?;
        unsafe_changes |= diff.has_unsafe_changes();
        renderer = renderer.table(&diff, schema);
    }

    let rendered = renderer.finish();
    if rendered.is_empty() {
        emit(out, "No changes detected; nothing written.\n")?;
        return Ok(0);
    }

    let today = env.today.unwrap_or_else(|| Utc::now().date_naive());
    let name = MigrationName::from_parts(today, env.registry.next_sequence(), &slugify(&args.name))?;
    let path = env.config.migrations_dir.join(name.file_name());
    write_new_file(&path, &rendered.to_source(&name.to_string()))?;
    tracing::info!(migration = %name, path = %path.display(), "migration written");

    emit(
        out,
        &format!(
            "Created {}\nRegister it with `mod m{};` and `m{}::entry()`.\n",
            path.display(),
            name,
            name
        ),
    )?;
    if unsafe_changes {
        emit(
            out,
            "Unsafe changes were found; edit the MANUAL STEP REQUIRED sections before applying.\n",
        )?;
        return Ok(2);
    }
    Ok(0)
}

async fn schema_diff<W: Write>(args: SchemaDiffArgs, env: CliEnvironment, out: &mut W) -> TidemarkResult<i32> {
    for schema in env.catalog.get(&args.module)? {
        let diff = diff_live(env.executor.as_ref(), &env.config.keyspace, schema).await?;
        emit(out, &format!("{}\n", diff))?;
    }
    Ok(0)
}

fn emit<W: Write>(out: &mut W, text: &str) -> TidemarkResult<()> {
    out.write_all(text.as_bytes()).map_err(|e| {
        RenderError::Io {
            path: "<output>".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Write `contents` to `path`, creating parent directories. Never overwrites.
fn write_new_file(path: &Path, contents: &str) -> TidemarkResult<()> {
    let io_err = |e: std::io::Error| RenderError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(contents.as_bytes()).map_err(io_err)?;
    Ok(())
}
