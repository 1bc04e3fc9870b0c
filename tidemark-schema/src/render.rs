//! Rendering schema diffs into migration source.
//!
//! Rendering happens in two stages. [`MigrationRenderer`] turns one or more
//! diffs into a [`RenderedMigration`]: per-table sections of forward and
//! reverse steps. [`RenderedMigration::to_source`] then prints that as a Rust
//! migration module ready to be registered.
//!
//! Safe changes become symmetric statements. Unsafe ones become
//! [`RenderedStep::Placeholder`]s carrying the diff warning, and are never
//! rewritten into a guessed statement.

use std::fmt::Write as _;
use tidemark_core::{
    ColumnChange, ColumnChangeKind, IndexChange, IndexChangeKind, KeyRole, SchemaDiff, SortOrder,
    TableSchema,
};

// ============================================================================
// RENDERED MODEL
// ============================================================================

/// One step of a migration body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedStep {
    /// A statement to execute. `destructive` marks statements that discard data.
    Statement { cql: String, destructive: bool },
    /// A change that needs a hand-written replacement.
    Placeholder { summary: String, warning: Option<String> },
}

impl RenderedStep {
    fn statement(cql: String) -> Self {
        RenderedStep::Statement {
            cql,
            destructive: false,
        }
    }

    fn destructive(cql: String) -> Self {
        RenderedStep::Statement {
            cql,
            destructive: true,
        }
    }

    fn placeholder(summary: impl Into<String>, warning: Option<String>) -> Self {
        RenderedStep::Placeholder {
            summary: summary.into(),
            warning,
        }
    }

    pub fn cql(&self) -> Option<&str> {
        match self {
            RenderedStep::Statement { cql, .. } => Some(cql),
            RenderedStep::Placeholder { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, RenderedStep::Placeholder { .. })
    }
}

/// Steps for one table. `reverse` is already in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSection {
    pub qualified_table: String,
    pub forward: Vec<RenderedStep>,
    pub reverse: Vec<RenderedStep>,
}

/// A migration body built from one or more diffs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMigration {
    pub description: String,
    pub reversible: bool,
    pub allow_destructive: bool,
    pub sections: Vec<TableSection>,
}

impl RenderedMigration {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// True when any step needs manual attention.
    pub fn has_placeholders(&self) -> bool {
        self.sections
            .iter()
            .flat_map(|s| s.forward.iter().chain(&s.reverse))
            .any(RenderedStep::is_placeholder)
    }

    /// Forward statements in execution order, placeholders skipped.
    pub fn forward_statements(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|s| s.forward.iter().filter_map(RenderedStep::cql))
            .collect()
    }

    /// Reverse statements in execution order (last table first).
    pub fn reverse_statements(&self) -> Vec<&str> {
        self.sections
            .iter()
            .rev()
            .flat_map(|s| s.reverse.iter().filter_map(RenderedStep::cql))
            .collect()
    }

    /// Print as a migration module named `name` (`YYYYMMDD_NNN_slug`).
    ///
    /// The module embeds its own source through `include_str!`, so the file
    /// must be saved as `m<name>.rs`.
    pub fn to_source(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "//! {}", self.description);
        out.push_str("//!\n");
        out.push_str("//! Generated by `tidemark makemigration`. Review before applying.\n\n");
        out.push_str("use tidemark_migrate::{async_trait, Migration, MigrationContext, MigrationEntry};\n");
        out.push_str("use tidemark_core::TidemarkResult;\n\n");
        out.push_str("pub struct Change;\n\n");
        out.push_str("#[async_trait]\n");
        out.push_str("impl Migration for Change {\n");
        let _ = writeln!(out, "    fn description(&self) -> &str {{\n        {:?}\n    }}\n", self.description);
        let _ = writeln!(out, "    fn reversible(&self) -> bool {{\n        {}\n    }}\n", self.reversible);
        let _ = writeln!(
            out,
            "    fn allow_destructive(&self) -> bool {{\n        {}\n    }}\n",
            self.allow_destructive
        );

        out.push_str("    async fn upgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {\n");
        for section in &self.sections {
            write_section(&mut out, &section.qualified_table, &section.forward);
        }
        out.push_str("        Ok(())\n    }\n\n");

        out.push_str("    async fn downgrade(&self, ctx: &mut MigrationContext<'_>) -> TidemarkResult<()> {\n");
        for section in self.sections.iter().rev() {
            write_section(&mut out, &section.qualified_table, &section.reverse);
        }
        out.push_str("        Ok(())\n    }\n}\n\n");

        out.push_str("pub fn entry() -> MigrationEntry {\n");
        let _ = writeln!(
            out,
            "    MigrationEntry::from_source({:?}, include_str!(\"m{}.rs\"), Change)",
            name, name
        );
        out.push_str("}\n");
        out
    }
}

fn write_section(out: &mut String, table: &str, steps: &[RenderedStep]) {
    let _ = writeln!(out, "        // ---- {} ----", table);
    for step in steps {
        match step {
            RenderedStep::Statement { cql, destructive } => {
                if *destructive {
                    out.push_str("        // DESTRUCTIVE: discards stored data\n");
                }
                let _ = writeln!(out, "        ctx.execute({:?}, vec![]).await?;", cql);
            }
            RenderedStep::Placeholder { summary, warning } => {
                let _ = writeln!(out, "        // MANUAL STEP REQUIRED: {}", summary);
                if let Some(warning) = warning {
                    let _ = writeln!(out, "        //   {}", warning);
                }
            }
        }
    }
}

// ============================================================================
// RENDERER
// ============================================================================

/// Accumulates table sections into one migration.
#[derive(Debug, Clone)]
pub struct MigrationRenderer {
    description: String,
    reversible: bool,
    allow_destructive: bool,
    sections: Vec<TableSection>,
}

impl MigrationRenderer {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            reversible: true,
            allow_destructive: false,
            sections: Vec::new(),
        }
    }

    /// Add the section for one table. Empty diffs contribute nothing.
    ///
    /// `declared` is only consulted when the table does not exist yet.
    pub fn table(mut self, diff: &SchemaDiff, declared: &TableSchema) -> Self {
        if diff.is_empty() {
            return self;
        }
        if diff.has_destructive_changes() {
            self.allow_destructive = true;
        }
        let section = if diff.table_exists {
            self.alter_section(diff)
        } else {
            create_section(diff, declared)
        };
        self.sections.push(section);
        self
    }

    pub fn finish(self) -> RenderedMigration {
        RenderedMigration {
            description: self.description,
            reversible: self.reversible,
            allow_destructive: self.allow_destructive,
            sections: self.sections,
        }
    }

    fn alter_section(&mut self, diff: &SchemaDiff) -> TableSection {
        let table = diff.qualified_table();
        let mut forward = Vec::new();
        let mut reverse = Vec::new();

        // Index drops run first so columns they target can be dropped.
        for change in diff
            .index_changes
            .iter()
            .filter(|c| c.kind == IndexChangeKind::Drop)
        {
            forward.push(RenderedStep::destructive(format!(
                "DROP INDEX IF EXISTS {}.{}",
                diff.keyspace, change.index_name
            )));
            reverse.push(RenderedStep::placeholder(
                format!("recreate index {}", change.index_name),
                Some("the original index definition cannot be recovered from the catalog".to_string()),
            ));
            self.reversible = false;
        }

        for change in &diff.column_changes {
            let (fwd, rev) = column_steps(&table, change);
            forward.push(fwd);
            reverse.push(rev);
        }

        for change in diff
            .index_changes
            .iter()
            .filter(|c| c.kind == IndexChangeKind::Add)
        {
            let (fwd, rev) = index_add_steps(diff, change);
            forward.push(fwd);
            reverse.push(rev);
        }

        reverse.reverse();
        TableSection {
            qualified_table: table,
            forward,
            reverse,
        }
    }
}

/// Render a single diff.
pub fn render(diff: &SchemaDiff, declared: &TableSchema, description: &str) -> RenderedMigration {
    MigrationRenderer::new(description).table(diff, declared).finish()
}

fn column_steps(table: &str, change: &ColumnChange) -> (RenderedStep, RenderedStep) {
    if change.is_unsafe {
        let summary = change.to_string();
        return (
            RenderedStep::placeholder(format!("{} on {}", summary, table), change.warning.clone()),
            RenderedStep::placeholder(format!("undo {} on {}", summary, table), change.warning.clone()),
        );
    }
    let type_of = |t: &Option<tidemark_core::WireType>| {
        t.as_ref().map(|t| t.as_cql().to_string()).unwrap_or_default()
    };
    match change.kind {
        ColumnChangeKind::Add => {
            let is_static = change.declared_role == Some(KeyRole::Static);
            (
                RenderedStep::statement(format!(
                    "ALTER TABLE {} ADD {} {}{}",
                    table,
                    change.name,
                    type_of(&change.declared_type),
                    if is_static { " STATIC" } else { "" }
                )),
                RenderedStep::destructive(format!("ALTER TABLE {} DROP {}", table, change.name)),
            )
        }
        ColumnChangeKind::Drop => {
            let is_static = change.live_role == Some(KeyRole::Static);
            (
                RenderedStep::destructive(format!("ALTER TABLE {} DROP {}", table, change.name)),
                RenderedStep::statement(format!(
                    "ALTER TABLE {} ADD {} {}{}",
                    table,
                    change.name,
                    type_of(&change.live_type),
                    if is_static { " STATIC" } else { "" }
                )),
            )
        }
        ColumnChangeKind::TypeChange => (
            RenderedStep::statement(format!(
                "ALTER TABLE {} ALTER {} TYPE {}",
                table,
                change.name,
                type_of(&change.declared_type)
            )),
            RenderedStep::statement(format!(
                "ALTER TABLE {} ALTER {} TYPE {}",
                table,
                change.name,
                type_of(&change.live_type)
            )),
        ),
        ColumnChangeKind::KeyRoleChange => (
            RenderedStep::placeholder(change.to_string(), change.warning.clone()),
            RenderedStep::placeholder(change.to_string(), change.warning.clone()),
        ),
    }
}

fn index_add_steps(diff: &SchemaDiff, change: &IndexChange) -> (RenderedStep, RenderedStep) {
    let Some(column) = &change.column else {
        return (
            RenderedStep::placeholder(format!("create index {}", change.index_name), None),
            RenderedStep::placeholder(format!("drop index {}", change.index_name), None),
        );
    };
    (
        RenderedStep::statement(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            change.index_name,
            diff.qualified_table(),
            column
        )),
        RenderedStep::statement(format!(
            "DROP INDEX IF EXISTS {}.{}",
            diff.keyspace, change.index_name
        )),
    )
}

fn create_section(diff: &SchemaDiff, declared: &TableSchema) -> TableSection {
    let table = diff.qualified_table();
    let mut forward = Vec::new();
    let mut reverse = Vec::new();

    match create_table_cql(&table, declared) {
        Some(cql) => {
            forward.push(RenderedStep::statement(cql));
            reverse.push(RenderedStep::destructive(format!("DROP TABLE IF EXISTS {}", table)));
        }
        None => {
            forward.push(RenderedStep::placeholder(
                format!("create table {}", table),
                Some("the declared schema has no partition key".to_string()),
            ));
            reverse.push(RenderedStep::placeholder(format!("drop table {}", table), None));
        }
    }

    for (index_name, column) in declared.declared_indexes() {
        forward.push(RenderedStep::statement(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            index_name, table, column
        )));
        reverse.push(RenderedStep::statement(format!(
            "DROP INDEX IF EXISTS {}.{}",
            diff.keyspace, index_name
        )));
    }

    reverse.reverse();
    TableSection {
        qualified_table: table,
        forward,
        reverse,
    }
}

fn create_table_cql(table: &str, declared: &TableSchema) -> Option<String> {
    let partition: Vec<&str> = declared
        .partition_keys()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    if partition.is_empty() {
        return None;
    }
    let clustering = declared.clustering_keys();

    let mut parts: Vec<String> = declared
        .columns
        .iter()
        .map(|c| {
            let suffix = if c.key_role == KeyRole::Static { " STATIC" } else { "" };
            format!("{} {}{}", c.name, c.wire_type, suffix)
        })
        .collect();

    let partition_clause = if partition.len() == 1 {
        partition[0].to_string()
    } else {
        format!("({})", partition.join(", "))
    };
    let mut key = vec![partition_clause];
    key.extend(clustering.iter().map(|c| c.name.clone()));
    parts.push(format!("PRIMARY KEY ({})", key.join(", ")));

    let mut cql = format!("CREATE TABLE IF NOT EXISTS {} ({})", table, parts.join(", "));
    if clustering.iter().any(|c| c.sort_order != SortOrder::None) {
        let orders: Vec<String> = clustering
            .iter()
            .map(|c| {
                let order = if c.sort_order == SortOrder::Desc { "DESC" } else { "ASC" };
                format!("{} {}", c.name, order)
            })
            .collect();
        let _ = write!(cql, " WITH CLUSTERING ORDER BY ({})", orders.join(", "));
    }
    Some(cql)
}

// ============================================================================
// TESTS
// ============================================================================
