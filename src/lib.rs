//! Cobble - Columnar Block-Transformation Engine
//!
//! Cobble is the in-memory block algebra of a distributed tabular
//! data-processing stack: it merges, repartitions, sorts and
//! schema-normalizes columnar blocks that arrive from independent,
//! possibly heterogeneous sources.
//!
//! # Features
//!
//! - **Schema unification**: one schema for blocks with diverging field
//!   sets, tensor shapes, nested structs and null-typed placeholders
//! - **Extension-aware concatenation**: fixed/variable-shape tensor and
//!   opaque-object columns concatenate through type-specific rules
//! - **Overflow-safe defragmentation**: 32-bit-offset columns never combine
//!   past the offset ceiling
//! - **Deterministic partitioning**: stable hash partitioning and
//!   sorted-boundary location for range partitioning
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use arrow::array::Int64Array;
//! use arrow::datatypes::{DataType, Field, Schema};
//! use cobble::{concat, sort, ChunkedColumn, Result, SortKey, Table};
//!
//! fn main() -> Result<()> {
//!     let field = Arc::new(Field::new("x", DataType::Int64, true));
//!     let schema = Arc::new(Schema::new(vec![field.clone()]));
//!
//!     let block = |values: Vec<i64>| -> Result<Table> {
//!         let column =
//!             ChunkedColumn::from_array(field.clone(), Arc::new(Int64Array::from(values)))?;
//!         Table::try_new(schema.clone(), vec![column])
//!     };
//!
//!     let combined = concat(&[block(vec![3, 1])?, block(vec![2])?], false)?;
//!     let sorted = sort(&combined, &SortKey::ascending(&["x"]))?;
//!     assert_eq!(sorted.num_rows(), 3);
//!     Ok(())
//! }
//! ```
//!
//! All operations are synchronous, free of blocking I/O, and treat tables
//! as immutable values: concurrent callers may share a table freely. Row
//! order is preserved end-to-end unless a hash partition or shuffle is
//! requested, and both of those stay deterministic for a fixed hash
//! function or seed.

pub mod align;
pub mod column;
pub mod combine;
pub mod concat;
pub mod error;
pub mod extension;
pub mod options;
pub mod partition;
pub mod scalar;
pub mod schema;
pub mod sort;
pub mod take;

// Re-export the public surface of the engine.
pub use align::align_struct_fields;
pub use column::{ChunkedColumn, Table};
pub use combine::{
    coalesce_if_fragmented, coalesce_if_fragmented_opts, combine_chunks, combine_chunks_opts,
};
pub use concat::{concat, concat_and_sort};
pub use error::{CobbleError, Result};
pub use extension::ColumnKind;
pub use options::TransformOptions;
pub use partition::{hash_partition, hash_partition_opts, shuffle};
pub use scalar::ScalarValue;
pub use schema::unify_schemas;
pub use sort::{find_partition_index, sort, SortDirection, SortField, SortKey};
pub use take::take;
