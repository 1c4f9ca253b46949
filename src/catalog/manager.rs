//! Catalog access for table and index metadata.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::schema::{SchemaError, TableDef};

/// Shared, read-only handle to a resolved table.
pub type TableHandle = Arc<TableDef>;

/// Read access to table metadata.
///
/// Implementations must be safe to share across threads; the planner only
/// reads from the catalog while compiling.
pub trait Catalog: Send + Sync {
    /// Look up a table by database and name.
    fn get_table(&self, db: &str, name: &str) -> Option<TableHandle>;
}

/// In-memory catalog keyed by `(db, table)`.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<BTreeMap<(String, String), TableHandle>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON array of table definitions.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let tables: Vec<TableDef> =
            serde_json::from_str(json).map_err(|e| SchemaError::Load(e.to_string()))?;
        let catalog = Self::new();
        for table in tables {
            catalog.create_table(table)?;
        }
        Ok(catalog)
    }

    /// Load a catalog from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| SchemaError::Load(e.to_string()))?;
        Self::from_json_str(&content)
    }

    /// Register a new table.
    pub fn create_table(&self, table: TableDef) -> Result<(), SchemaError> {
        table.validate()?;

        let key = (table.db.clone(), table.name.clone());
        let mut tables = self.tables.write();
        if tables.contains_key(&key) {
            return Err(SchemaError::TableExists(format!("{}.{}", key.0, key.1)));
        }
        debug!(db = %key.0, table = %key.1, indexes = table.indexes.len(), "registered table");
        tables.insert(key, Arc::new(table));
        Ok(())
    }

    /// Remove a table.
    pub fn drop_table(&self, db: &str, name: &str) -> Result<(), SchemaError> {
        self.tables
            .write()
            .remove(&(db.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| SchemaError::TableNotFound(format!("{}.{}", db, name)))
    }

    /// Check if a table exists.
    pub fn table_exists(&self, db: &str, name: &str) -> bool {
        self.tables
            .read()
            .contains_key(&(db.to_string(), name.to_string()))
    }

    /// List the tables of a database, in name order.
    pub fn list_tables(&self, db: &str) -> Vec<String> {
        self.tables
            .read()
            .keys()
            .filter(|(d, _)| d == db)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

impl Catalog for MemoryCatalog {
    fn get_table(&self, db: &str, name: &str) -> Option<TableHandle> {
        self.tables
            .read()
            .get(&(db.to_string(), name.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, TableBuilder};
    use std::io::Write;

    fn table(name: &str) -> TableDef {
        TableBuilder::new("db", name)
            .add_column("id", DataType::Int64)
            .add_column("name", DataType::String)
            .add_index("idx_id", &["id"], None)
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_and_get_table() {
        let catalog = MemoryCatalog::new();
        catalog.create_table(table("users")).unwrap();

        let handle = catalog.get_table("db", "users").unwrap();
        assert_eq!(handle.name, "users");
        assert_eq!(handle.columns.len(), 2);
        assert!(catalog.get_table("other", "users").is_none());
    }

    #[test]
    fn test_create_duplicate_table() {
        let catalog = MemoryCatalog::new();
        catalog.create_table(table("users")).unwrap();
        let result = catalog.create_table(table("users"));
        assert!(matches!(result, Err(SchemaError::TableExists(_))));
    }

    #[test]
    fn test_drop_table() {
        let catalog = MemoryCatalog::new();
        catalog.create_table(table("users")).unwrap();
        assert!(catalog.table_exists("db", "users"));

        catalog.drop_table("db", "users").unwrap();
        assert!(!catalog.table_exists("db", "users"));

        let result = catalog.drop_table("db", "users");
        assert!(matches!(result, Err(SchemaError::TableNotFound(_))));
    }

    #[test]
    fn test_list_tables() {
        let catalog = MemoryCatalog::new();
        for name in ["users", "orders", "products"] {
            catalog.create_table(table(name)).unwrap();
        }
        assert_eq!(catalog.list_tables("db"), vec!["orders", "products", "users"]);
        assert!(catalog.list_tables("nope").is_empty());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {
                "db": "db",
                "name": "t1",
                "columns": [
                    {"name": "col1", "data_type": "int32"},
                    {"name": "col5", "data_type": "int64"}
                ],
                "indexes": {
                    "index1": {"name": "index1", "keys": ["col1"], "ts": "col5"}
                }
            }
        ]"#;
        let catalog = MemoryCatalog::from_json_str(json).unwrap();
        let t1 = catalog.get_table("db", "t1").unwrap();
        assert_eq!(t1.indexes["index1"].ts.as_deref(), Some("col5"));
    }

    #[test]
    fn test_from_json_rejects_invalid_index() {
        let json = r#"[{"db": "db", "name": "t1",
            "columns": [{"name": "col1", "data_type": "int32"}],
            "indexes": {"bad": {"name": "bad", "keys": ["missing"]}}}]"#;
        let result = MemoryCatalog::from_json_str(json);
        assert!(matches!(result, Err(SchemaError::UnknownIndexColumn { .. })));

        let result = MemoryCatalog::from_json_str("not json");
        assert!(matches!(result, Err(SchemaError::Load(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let tables = vec![table("users")];
        write!(file, "{}", serde_json::to_string(&tables).unwrap()).unwrap();

        let catalog = MemoryCatalog::from_file(file.path()).unwrap();
        assert!(catalog.table_exists("db", "users"));
    }
}
