//! Migration names and the ordered registry.
//!
//! A migration name is `YYYYMMDD_NNN_slug`. Module files carry an extra
//! leading `m` (`m20260115_001_add_rating.rs`) so they are legal Rust module
//! names; the registry accepts either form and stores the bare name.

use crate::migration::MigrationEntry;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tidemark_core::{MigrationError, TidemarkError, TidemarkResult};

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^m?(\d{8})_(\d{3})_([a-z0-9_]+)$").expect("Invalid migration name regex")
});

// ============================================================================
// MIGRATION NAME
// ============================================================================

/// Parsed migration name. Ordering is by date, then sequence, then slug.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MigrationName {
    date: u32,
    sequence: u16,
    slug: String,
}

impl MigrationName {
    pub fn parse(raw: &str) -> TidemarkResult<Self> {
        let invalid = || MigrationError::InvalidName {
            name: raw.to_string(),
        };
        let caps = NAME_PATTERN.captures(raw).ok_or_else(invalid)?;
        let date_str = &caps[1];
        NaiveDate::parse_from_str(date_str, "%Y%m%d").map_err(|_| invalid())?;
        Ok(Self {
            date: date_str.parse().map_err(|_| invalid())?,
            sequence: caps[2].parse().map_err(|_| invalid())?,
            slug: caps[3].to_string(),
        })
    }

    /// Build from parts, validating the result.
    pub fn from_parts(date: NaiveDate, sequence: u16, slug: &str) -> TidemarkResult<Self> {
        Self::parse(&format!("{}_{:03}_{}", date.format("%Y%m%d"), sequence, slug))
    }

    pub fn date(&self) -> u32 {
        self.date
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// `YYYYMMDD_NNN`
    pub fn prefix(&self) -> String {
        format!("{:08}_{:03}", self.date, self.sequence)
    }

    /// File name of the migration module: `m<name>.rs`.
    pub fn file_name(&self) -> String {
        format!("m{}.rs", self)
    }
}

impl fmt::Display for MigrationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}_{:03}_{}", self.date, self.sequence, self.slug)
    }
}

impl FromStr for MigrationName {
    type Err = TidemarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Turn free text into a slug: lower-case alphanumerics joined by `_`.
pub fn slugify(description: &str) -> String {
    let mut slug = String::new();
    for word in description
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('_');
        }
        slug.push_str(&word.to_ascii_lowercase());
    }
    if slug.is_empty() {
        slug.push_str("migration");
    }
    slug
}

// ============================================================================
// REGISTRY
// ============================================================================

/// All migrations known to the application, kept in name order.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    entries: Vec<(MigrationName, MigrationEntry)>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries in any order.
    pub fn from_entries(entries: impl IntoIterator<Item = MigrationEntry>) -> TidemarkResult<Self> {
        let mut registry = Self::new();
        for entry in entries {
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Add one migration. Rejects malformed names and duplicates, where a
    /// duplicate is the same `YYYYMMDD_NNN_slug` after normalization.
    pub fn register(&mut self, entry: MigrationEntry) -> TidemarkResult<()> {
        let name = MigrationName::parse(entry.name())?;
        let pos = match self.entries.binary_search_by(|(n, _)| n.cmp(&name)) {
            Ok(_) => {
                return Err(MigrationError::DuplicateName {
                    name: name.to_string(),
                }
                .into())
            }
            Err(pos) => pos,
        };
        self.entries.insert(pos, (name, entry));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&MigrationName, &MigrationEntry)> {
        self.entries.iter().map(|(n, e)| (n, e))
    }

    pub fn names(&self) -> Vec<&MigrationName> {
        self.entries.iter().map(|(n, _)| n).collect()
    }

    pub fn get(&self, name: &str) -> Option<(&MigrationName, &MigrationEntry)> {
        let parsed = MigrationName::parse(name).ok()?;
        self.entries
            .binary_search_by(|(n, _)| n.cmp(&parsed))
            .ok()
            .map(|i| (&self.entries[i].0, &self.entries[i].1))
    }

    pub fn last(&self) -> Option<&MigrationName> {
        self.entries.last().map(|(n, _)| n)
    }

    /// Resolve a target given as a full name or a `YYYYMMDD_NNN` prefix.
    pub fn resolve_target(&self, target: &str) -> TidemarkResult<&MigrationName> {
        let target = target.strip_prefix('m').unwrap_or(target);
        self.entries
            .iter()
            .map(|(n, _)| n)
            .find(|n| n.to_string() == target || n.prefix() == target)
            .ok_or_else(|| {
                MigrationError::UnknownTarget {
                    target: target.to_string(),
                }
                .into()
            })
    }

    /// Sequence number for a new migration: one past the highest sequence
    /// used on any date.
    pub fn next_sequence(&self) -> u16 {
        self.entries
            .iter()
            .map(|(n, _)| n.sequence)
            .max()
            .map_or(1, |s| s.saturating_add(1))
    }
}
