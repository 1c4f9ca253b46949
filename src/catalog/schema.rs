//! Table and index definitions.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::types::{ColumnDef, DataType};

/// A secondary index declared on a table.
///
/// Rows sharing the same key values are stored together, ordered by the
/// optional time column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its table.
    pub name: String,
    /// Ordered key columns.
    pub keys: Vec<String>,
    /// Column the rows of each key are ordered by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, keys: Vec<String>, ts: Option<String>) -> Self {
        Self {
            name: name.into(),
            keys,
            ts,
        }
    }

    /// Check whether this index is keyed on exactly `columns`, in any order.
    pub fn keyed_on(&self, columns: &[&str]) -> bool {
        self.keys.len() == columns.len()
            && self.keys.iter().all(|k| columns.contains(&k.as_str()))
    }
}

/// Table definition as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Database the table lives in.
    pub db: String,
    /// Table name.
    pub name: String,
    /// Column definitions, in storage order.
    pub columns: Vec<ColumnDef>,
    /// Secondary indexes keyed by index name.
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexDef>,
}

impl TableDef {
    /// Get a column definition by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column in the table schema.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of the index's time column in the table schema.
    pub fn ts_position(&self, index: &IndexDef) -> Option<usize> {
        index.ts.as_deref().and_then(|ts| self.column_position(ts))
    }

    /// Validate the definition: unique columns, and every index key and
    /// time column refers to an existing column.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(col.name.clone()));
            }
        }

        for (name, index) in &self.indexes {
            if name != &index.name {
                return Err(SchemaError::InvalidIndex {
                    index: name.clone(),
                    reason: format!("registered under a different name '{}'", index.name),
                });
            }
            if index.keys.is_empty() {
                return Err(SchemaError::InvalidIndex {
                    index: name.clone(),
                    reason: "no key columns".into(),
                });
            }
            let mut keys = HashSet::new();
            for key in &index.keys {
                if !keys.insert(key.as_str()) {
                    return Err(SchemaError::InvalidIndex {
                        index: name.clone(),
                        reason: format!("duplicate key column '{}'", key),
                    });
                }
                if self.get_column(key).is_none() {
                    return Err(SchemaError::UnknownIndexColumn {
                        index: name.clone(),
                        column: key.clone(),
                    });
                }
            }
            if let Some(ts) = &index.ts {
                if self.get_column(ts).is_none() {
                    return Err(SchemaError::UnknownIndexColumn {
                        index: name.clone(),
                        column: ts.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Schema-related errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("duplicate index: {0}")]
    DuplicateIndex(String),

    #[error("index {index} references unknown column {column}")]
    UnknownIndexColumn { index: String, column: String },

    #[error("invalid index {index}: {reason}")]
    InvalidIndex { index: String, reason: String },

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("failed to load catalog: {0}")]
    Load(String),
}

/// Builder for table definitions.
pub struct TableBuilder {
    db: String,
    name: String,
    columns: Vec<ColumnDef>,
    indexes: Vec<IndexDef>,
}

impl TableBuilder {
    /// Start building a table in database `db`.
    pub fn new(db: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnDef::new(name, data_type));
        self
    }

    /// Add an index over `keys`, optionally ordered by the `ts` column.
    pub fn add_index(mut self, name: impl Into<String>, keys: &[&str], ts: Option<&str>) -> Self {
        self.indexes.push(IndexDef::new(
            name,
            keys.iter().map(|k| k.to_string()).collect(),
            ts.map(str::to_string),
        ));
        self
    }

    /// Build and validate the table definition.
    pub fn build(self) -> Result<TableDef, SchemaError> {
        let mut indexes = BTreeMap::new();
        for index in self.indexes {
            if indexes.contains_key(&index.name) {
                return Err(SchemaError::DuplicateIndex(index.name));
            }
            indexes.insert(index.name.clone(), index);
        }

        let table = TableDef {
            db: self.db,
            name: self.name,
            columns: self.columns,
            indexes,
        };
        table.validate()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TableDef {
        TableBuilder::new("db", "t1")
            .add_column("col0", DataType::String)
            .add_column("col1", DataType::Int32)
            .add_column("col2", DataType::Int16)
            .add_column("col5", DataType::Int64)
            .add_index("index12", &["col1", "col2"], Some("col5"))
            .add_index("index1", &["col1"], Some("col5"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_table() {
        let table = sample_table();
        assert_eq!(table.column_names(), vec!["col0", "col1", "col2", "col5"]);
        // Indexes iterate in name order.
        let names: Vec<&str> = table.indexes.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["index1", "index12"]);
        let index = &table.indexes["index12"];
        assert_eq!(table.ts_position(index), Some(3));
    }

    #[test]
    fn test_keyed_on_ignores_order() {
        let table = sample_table();
        let index = &table.indexes["index12"];
        assert!(index.keyed_on(&["col2", "col1"]));
        assert!(!index.keyed_on(&["col1"]));
        assert!(!index.keyed_on(&["col1", "col2", "col5"]));
    }

    #[test]
    fn test_duplicate_column() {
        let result = TableBuilder::new("db", "bad")
            .add_column("a", DataType::Int32)
            .add_column("a", DataType::String)
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateColumn(_))));
    }

    #[test]
    fn test_unknown_index_column() {
        let result = TableBuilder::new("db", "bad")
            .add_column("a", DataType::Int32)
            .add_index("idx", &["b"], None)
            .build();
        assert!(matches!(result, Err(SchemaError::UnknownIndexColumn { .. })));

        let result = TableBuilder::new("db", "bad")
            .add_column("a", DataType::Int32)
            .add_index("idx", &["a"], Some("ts"))
            .build();
        assert!(matches!(result, Err(SchemaError::UnknownIndexColumn { .. })));
    }

    #[test]
    fn test_invalid_index_keys() {
        let result = TableBuilder::new("db", "bad")
            .add_column("a", DataType::Int32)
            .add_index("idx", &[], None)
            .build();
        assert!(matches!(result, Err(SchemaError::InvalidIndex { .. })));

        let result = TableBuilder::new("db", "bad")
            .add_column("a", DataType::Int32)
            .add_index("idx", &["a", "a"], None)
            .build();
        assert!(matches!(result, Err(SchemaError::InvalidIndex { .. })));
    }

    #[test]
    fn test_duplicate_index() {
        let result = TableBuilder::new("db", "bad")
            .add_column("a", DataType::Int32)
            .add_index("idx", &["a"], None)
            .add_index("idx", &["a"], None)
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateIndex(_))));
    }

    #[test]
    fn test_table_serialization() {
        let table = sample_table();
        let json = serde_json::to_string_pretty(&table).unwrap();
        let back: TableDef = serde_json::from_str(&json).unwrap();
        assert_eq!(table, back);
    }
}
