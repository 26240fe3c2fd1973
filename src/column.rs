//! In-memory table and column representations.
//!
//! A [`ChunkedColumn`] is a named, typed sequence of values stored as one or
//! more contiguous fragments; a [`Table`] is an ordered list of equally-sized
//! columns. Both are immutable value types: every transformation in this
//! crate returns a new table rather than mutating in place. Fragments are
//! reference-counted and may be aliased between the input and output of a
//! no-op transformation.

use std::sync::Arc;

use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::datatypes::{FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::{CobbleError, Result};

/// A named, typed column physically stored as one or more fragments.
///
/// All fragments share the column's logical data type.
#[derive(Debug, Clone)]
pub struct ChunkedColumn {
    field: FieldRef,
    chunks: Vec<ArrayRef>,
    length: usize,
}

impl ChunkedColumn {
    /// Create a column from a field and its fragments.
    ///
    /// Fails if any fragment's type differs from the field's declared type.
    pub fn try_new(field: FieldRef, chunks: Vec<ArrayRef>) -> Result<Self> {
        for chunk in &chunks {
            if chunk.data_type() != field.data_type() {
                return Err(CobbleError::type_mismatch(
                    field.data_type().to_string(),
                    chunk.data_type().to_string(),
                ));
            }
        }
        let length = chunks.iter().map(|c| c.len()).sum();
        Ok(Self {
            field,
            chunks,
            length,
        })
    }

    /// Create a single-fragment column.
    pub fn from_array(field: FieldRef, array: ArrayRef) -> Result<Self> {
        Self::try_new(field, vec![array])
    }

    /// Create an empty (zero-row, single empty fragment) column for a field.
    pub fn empty(field: FieldRef) -> Self {
        let chunk = new_empty_array(field.data_type());
        Self {
            field,
            chunks: vec![chunk],
            length: 0,
        }
    }

    /// The column's field (name, type, nullability, metadata).
    pub fn field(&self) -> &FieldRef {
        &self.field
    }

    /// The column name.
    pub fn name(&self) -> &str {
        self.field.name()
    }

    /// The column's logical data type.
    pub fn data_type(&self) -> &arrow::datatypes::DataType {
        self.field.data_type()
    }

    /// The column's fragments.
    pub fn chunks(&self) -> &[ArrayRef] {
        &self.chunks
    }

    /// Number of fragments.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Total row count across fragments.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the column has zero rows.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Estimated payload size in bytes, summed over fragments.
    pub fn byte_size(&self) -> usize {
        self.chunks.iter().map(|c| c.get_buffer_memory_size()).sum()
    }

    /// Rebuild this column with the same field but different fragments.
    pub(crate) fn with_chunks(&self, chunks: Vec<ArrayRef>) -> Result<Self> {
        Self::try_new(self.field.clone(), chunks)
    }
}

/// An ordered list of named columns of equal row count.
///
/// Row order is semantically significant: it is preserved end-to-end through
/// alignment, concatenation and selection unless the caller explicitly
/// requests a hash partition or a shuffle.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    columns: Vec<ChunkedColumn>,
    num_rows: usize,
}

impl Table {
    /// Create a table from a schema and matching columns.
    ///
    /// Fails if column count, names or types drift from the schema, or if
    /// columns disagree on row count.
    pub fn try_new(schema: SchemaRef, columns: Vec<ChunkedColumn>) -> Result<Self> {
        if schema.fields().len() != columns.len() {
            return Err(CobbleError::invalid_argument(format!(
                "schema has {} fields but {} columns were provided",
                schema.fields().len(),
                columns.len()
            )));
        }
        let mut num_rows = None;
        for (field, column) in schema.fields().iter().zip(&columns) {
            if field.name() != column.name() {
                return Err(CobbleError::invalid_argument(format!(
                    "column name '{}' does not match schema field '{}'",
                    column.name(),
                    field.name()
                )));
            }
            if field.data_type() != column.data_type() {
                return Err(CobbleError::type_mismatch(
                    field.data_type().to_string(),
                    column.data_type().to_string(),
                ));
            }
            match num_rows {
                None => num_rows = Some(column.len()),
                Some(n) if n != column.len() => {
                    return Err(CobbleError::invalid_argument(format!(
                        "column '{}' has {} rows, expected {}",
                        column.name(),
                        column.len(),
                        n
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(Self {
            schema,
            columns,
            num_rows: num_rows.unwrap_or(0),
        })
    }

    /// Create a zero-column, zero-row table.
    pub fn empty() -> Self {
        Self {
            schema: Arc::new(Schema::empty()),
            columns: Vec::new(),
            num_rows: 0,
        }
    }

    /// Create a zero-row table carrying the given schema, with one explicit
    /// empty fragment per column.
    pub fn empty_with_schema(schema: SchemaRef) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ChunkedColumn::empty(f.clone()))
            .collect();
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    /// Build a table from a record batch; every column starts as a single
    /// fragment.
    pub fn from_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| ChunkedColumn::from_array(field.clone(), array.clone()))
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(schema, columns)
    }

    /// Combine every column into a single fragment and return the result as
    /// a record batch. Intended for interop and tests, not for the hot path.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        let arrays = self
            .columns
            .iter()
            .map(|col| match col.chunks() {
                [] => Ok(new_empty_array(col.data_type())),
                [only] => Ok(only.clone()),
                many => {
                    let refs: Vec<&dyn Array> = many.iter().map(|a| a.as_ref()).collect();
                    Ok(arrow::compute::concat(&refs)?)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        RecordBatch::try_new(self.schema.clone(), arrays).map_err(CobbleError::from)
    }

    /// The table schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Total row count.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// All columns in schema order.
    pub fn columns(&self) -> &[ChunkedColumn] {
        &self.columns
    }

    /// Column by position.
    pub fn column(&self, index: usize) -> Option<&ChunkedColumn> {
        self.columns.get(index)
    }

    /// Column by name.
    pub fn column_by_name(&self, name: &str) -> Option<&ChunkedColumn> {
        self.schema
            .fields()
            .find(name)
            .map(|(index, _)| &self.columns[index])
    }

    /// Project the table to the named columns, in the given order.
    pub fn project(&self, names: &[&str]) -> Result<Table> {
        let mut fields = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self.column_by_name(name).ok_or_else(|| {
                CobbleError::invalid_argument(format!("column '{name}' not found"))
            })?;
            fields.push(column.field().clone());
            columns.push(column.clone());
        }
        let mut table = Table::try_new(Arc::new(Schema::new(fields)), columns)?;
        table.num_rows = self.num_rows;
        Ok(table)
    }

    /// Re-check internal consistency: schema arity, per-column field
    /// agreement and equal row counts.
    pub fn validate(&self) -> Result<()> {
        Table::try_new(self.schema.clone(), self.columns.clone()).map(|_| ())
    }
}
