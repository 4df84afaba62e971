//! Tabular query results and mutation statistics.

use serde::{Deserialize, Serialize};

use crate::model::Value;

/// Query execution result: ordered columns, rows of tagged values, and the
/// mutation counters for this execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: QueryStats,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at (row, column name). None if either is out of range.
    pub fn value_at(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Project the result as JSON: `{"columns": [...], "rows": [[...]]}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "columns": self.columns,
            "rows": self.rows.iter()
                .map(|row| row.iter().map(Value::to_json).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
        })
    }
}

/// Per-execution mutation counters. Zero-initialized, increment-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub indexes_created: u64,
    pub indexes_deleted: u64,
    pub constraints_created: u64,
    pub constraints_deleted: u64,
}

impl QueryStats {
    /// Fold another execution's counters into this one (script execution).
    pub fn merge(&mut self, other: &QueryStats) {
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
        self.labels_removed += other.labels_removed;
        self.indexes_created += other.indexes_created;
        self.indexes_deleted += other.indexes_deleted;
        self.constraints_created += other.constraints_created;
        self.constraints_deleted += other.constraints_deleted;
    }

    pub fn contains_updates(&self) -> bool {
        *self != QueryStats::default()
    }
}
