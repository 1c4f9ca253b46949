//! Column data types for table definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column types understood by the planner and the expression compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Boolean values.
    Bool,
    /// 16-bit signed integer (SMALLINT).
    Int16,
    /// 32-bit signed integer (INT).
    Int32,
    /// 64-bit signed integer (BIGINT).
    Int64,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Variable length text.
    String,
    /// Milliseconds since the epoch.
    Timestamp,
    /// Calendar date.
    Date,
    /// Type of a bare NULL literal.
    Null,
}

impl DataType {
    /// Get the SQL name for this type.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Int16 => "SMALLINT",
            DataType::Int32 => "INT",
            DataType::Int64 => "BIGINT",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Date => "DATE",
            DataType::Null => "NULL",
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Rank used for arithmetic promotion; wider types rank higher.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            DataType::Int16 => Some(1),
            DataType::Int32 => Some(2),
            DataType::Int64 => Some(3),
            DataType::Float => Some(4),
            DataType::Double => Some(5),
            _ => None,
        }
    }

    /// The result type of an arithmetic operation between two numeric types.
    ///
    /// Returns `None` when either side is not numeric.
    pub fn promote(self, other: DataType) -> Option<DataType> {
        let (a, b) = (self.numeric_rank()?, other.numeric_rank()?);
        Some(if a >= b { self } else { other })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// A column in a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Data type.
    pub data_type: DataType,
}

impl ColumnDef {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)
    }
}
