//! Named groups of declared table schemas, selected with `--module`.

use std::collections::BTreeMap;
use tidemark_core::{RenderError, TableSchema, TidemarkResult};

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    modules: BTreeMap<String, Vec<TableSchema>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a module.
    pub fn module(mut self, name: impl Into<String>, tables: Vec<TableSchema>) -> Self {
        self.modules.insert(name.into(), tables);
        self
    }

    pub fn get(&self, name: &str) -> TidemarkResult<&[TableSchema]> {
        self.modules
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                RenderError::UnknownModule {
                    module: name.to_string(),
                }
                .into()
            })
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}
