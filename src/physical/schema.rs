//! Output schemas of physical nodes.

use crate::catalog::{DataType, TableDef};
use crate::sql::ColumnRef;

/// A column produced by a physical node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Relation the column can be qualified with.
    pub relation: Option<String>,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, relation: Option<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            relation,
            data_type,
        }
    }
}

/// Ordered list of columns, split into the parts it was concatenated from.
///
/// A join's schema has one part per side; every other node produces a single
/// part. Parts let a column be addressed as `(part, offset)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
    parts: Vec<usize>,
}

impl Schema {
    /// Single-part schema.
    pub fn new(columns: Vec<Column>) -> Self {
        let parts = if columns.is_empty() {
            vec![]
        } else {
            vec![columns.len()]
        };
        Self { columns, parts }
    }

    /// Schema of a table, qualified by the table name.
    pub fn from_table(table: &TableDef) -> Self {
        Self::new(
            table
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), Some(table.name.clone()), c.data_type))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, position: usize) -> Option<&Column> {
        self.columns.get(position)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of parts.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// This schema followed by `other`, keeping both part lists.
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().copied());
        Schema { columns, parts }
    }

    /// Same columns, all qualified by `relation`.
    pub fn with_relation(&self, relation: &str) -> Schema {
        Schema {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), Some(relation.to_string()), c.data_type))
                .collect(),
            parts: self.parts.clone(),
        }
    }

    /// Position of the first column matching `col`.
    ///
    /// An unqualified reference matches on name alone.
    pub fn resolve(&self, col: &ColumnRef) -> Option<usize> {
        self.columns.iter().position(|c| {
            c.name == col.name
                && match &col.relation {
                    Some(r) => c.relation.as_deref() == Some(r.as_str()),
                    None => true,
                }
        })
    }

    /// Positions of the columns a `*` or `relation.*` expands to.
    pub fn expand_all(&self, relation: Option<&str>) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| relation.is_none() || c.relation.as_deref() == relation)
            .map(|(i, _)| i)
            .collect()
    }

    /// Split a flat position into `(part, offset within part)`.
    pub fn locate(&self, position: usize) -> Option<(usize, usize)> {
        let mut start = 0;
        for (part, len) in self.parts.iter().enumerate() {
            if position < start + len {
                return Some((part, position - start));
            }
            start += len;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableBuilder;

    fn t(name: &str) -> Schema {
        let table = TableBuilder::new("db", name)
            .add_column("col1", DataType::Int32)
            .add_column("col2", DataType::Int64)
            .build()
            .unwrap();
        Schema::from_table(&table)
    }

    #[test]
    fn test_resolve() {
        let joined = t("t1").concat(&t("t2"));
        assert_eq!(joined.resolve(&ColumnRef::new("col2")), Some(1));
        assert_eq!(joined.resolve(&ColumnRef::qualified("t2", "col1")), Some(2));
        assert_eq!(joined.resolve(&ColumnRef::qualified("t3", "col1")), None);
        assert_eq!(joined.resolve(&ColumnRef::new("nope")), None);
    }

    #[test]
    fn test_locate_parts() {
        let joined = t("t1").concat(&t("t2"));
        assert_eq!(joined.part_count(), 2);
        assert_eq!(joined.locate(0), Some((0, 0)));
        assert_eq!(joined.locate(3), Some((1, 1)));
        assert_eq!(joined.locate(4), None);
        assert_eq!(Schema::default().concat(&t("t1")).part_count(), 1);
    }

    #[test]
    fn test_expand_all_and_rename() {
        let joined = t("t1").concat(&t("t2"));
        assert_eq!(joined.expand_all(None), vec![0, 1, 2, 3]);
        assert_eq!(joined.expand_all(Some("t2")), vec![2, 3]);

        let renamed = t("t1").with_relation("a");
        assert_eq!(renamed.resolve(&ColumnRef::qualified("a", "col1")), Some(0));
        assert_eq!(renamed.resolve(&ColumnRef::qualified("t1", "col1")), None);
    }
}
