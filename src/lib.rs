//! physplan - logical to physical SQL plan compiler
//!
//! Turns logical query plans into a DAG of physical operators, binds every
//! expression-carrying node to a compiled function and runs a configurable
//! list of index-aware rewrite passes over the result.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use physplan::catalog::{DataType, MemoryCatalog, TableBuilder};
//! use physplan::config::TransformConfig;
//! use physplan::transform::PlanTransformer;
//!
//! let catalog = MemoryCatalog::new();
//! catalog
//!     .create_table(
//!         TableBuilder::new("db", "t1")
//!             .add_column("col1", DataType::Int32)
//!             .add_column("col5", DataType::Int64)
//!             .add_index("index1", &["col1"], Some("col5"))
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let mut transformer = PlanTransformer::new(TransformConfig::new("db"), Arc::new(catalog)).unwrap();
//! let plan = transformer.transform_sql("SELECT sum(col5) FROM t1 GROUP BY col1").unwrap();
//! println!("{}", plan);
//! ```

pub mod catalog;
pub mod codegen;
pub mod config;
pub mod passes;
pub mod physical;
pub mod planner;
pub mod sql;
pub mod transform;

pub use config::{PassKind, TransformConfig, TransformMode};
pub use physical::{NodeId, PhysicalPlan};
pub use planner::{PlanError, PlanResult};
pub use transform::PlanTransformer;
