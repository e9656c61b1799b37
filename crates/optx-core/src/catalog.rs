//! # Catalog Interface
//!
//! The catalog supplies base-relation metadata to the statistics layer: column names
//! and table-level statistics. It sits behind a trait object (`dyn Catalog`) so that a
//! host engine can back it with its own metadata service; [`InMemoryCatalog`] is the
//! programmatically populated implementation used by the server and tests.
//!
//! Column statistics in the catalog are keyed by the bare column name. They are
//! requalified with the scan alias when a scan's statistics are derived.

use crate::expr::TableRef;
use crate::stats::Statistics;
use std::collections::HashMap;

/// Catalog provides schema and statistics information.
pub trait Catalog: Send + Sync {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics>;
    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<String>>;
}

/// In-memory catalog keyed by the fully-qualified name (`schema.table`).
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    pub table_stats: HashMap<String, Statistics>,
    pub table_columns: HashMap<String, Vec<String>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &TableRef, columns: Vec<String>, stats: Statistics) {
        let key = table.to_string();
        self.table_columns.insert(key.clone(), columns);
        self.table_stats.insert(key, stats);
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics> {
        self.table_stats.get(&table.to_string()).cloned()
    }

    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<String>> {
        self.table_columns.get(&table.to_string()).cloned()
    }
}
