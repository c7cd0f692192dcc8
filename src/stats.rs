use crate::models::Table;
use std::collections::BTreeMap;

/// Statistics collected during a load
#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    records_seen: u64,
    publications_loaded: u64,
    records_skipped: u64,
    commits: u64,
    unresolved_entities: u64,
    rows: BTreeMap<Table, u64>,
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_records(&mut self) {
        self.records_seen += 1;
    }

    pub fn inc_publications(&mut self) {
        self.publications_loaded += 1;
    }

    pub fn inc_skipped(&mut self) {
        self.records_skipped += 1;
    }

    pub fn inc_commits(&mut self) {
        self.commits += 1;
    }

    pub fn add_row(&mut self, table: Table) {
        *self.rows.entry(table).or_insert(0) += 1;
    }

    pub fn set_unresolved_entities(&mut self, count: u64) {
        self.unresolved_entities = count;
    }

    /// Top-level records read, loaded or not
    pub fn records(&self) -> u64 {
        self.records_seen
    }

    pub fn publications(&self) -> u64 {
        self.publications_loaded
    }

    /// Records dropped whole: unknown type or missing key
    pub fn skipped(&self) -> u64 {
        self.records_skipped
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    pub fn unresolved_entities(&self) -> u64 {
        self.unresolved_entities
    }

    pub fn rows(&self, table: Table) -> u64 {
        self.rows.get(&table).copied().unwrap_or(0)
    }

    pub fn total_rows(&self) -> u64 {
        self.rows.values().sum()
    }
}
