//! Catalog module for table and index metadata.
//!
//! The planner resolves every data source against a [`Catalog`] and reads the
//! declared secondary indexes from the returned [`TableDef`].

mod manager;
mod schema;
mod types;

pub use manager::{Catalog, MemoryCatalog, TableHandle};
pub use schema::{IndexDef, SchemaError, TableBuilder, TableDef};
pub use types::{ColumnDef, DataType};
