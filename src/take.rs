//! Extension-safe positional row selection.
//!
//! The native bulk-select kernels mishandle extension columns that span
//! multiple fragments, so those columns are first combined into a single
//! fragment and indexed directly. Non-extension columns use the native
//! kernels: `take` on single fragments, `interleave` across fragments.

use std::sync::Arc;

use arrow::array::{new_empty_array, Array, ArrayRef, UInt64Array};
use arrow::compute::{concat, interleave};

use crate::column::{ChunkedColumn, Table};
use crate::error::{CobbleError, Result};
use crate::extension::ColumnKind;

/// Select the given rows, in the given order, into a new table.
///
/// Indices need not be sorted or unique. The result carries the original
/// schema unchanged.
pub fn take(table: &Table, indices: &[u64]) -> Result<Table> {
    let num_rows = table.num_rows() as u64;
    if let Some(bad) = indices.iter().find(|&&i| i >= num_rows) {
        return Err(CobbleError::invalid_argument(format!(
            "selection index {bad} out of bounds for table with {num_rows} rows"
        )));
    }

    let columns = table
        .columns()
        .iter()
        .map(|column| take_column(column, indices))
        .collect::<Result<Vec<_>>>()?;
    Table::try_new(table.schema().clone(), columns)
}

fn take_column(column: &ChunkedColumn, indices: &[u64]) -> Result<ChunkedColumn> {
    let kind = ColumnKind::of(column.field());

    let taken = match column.chunks() {
        [] => new_empty_array(column.data_type()),
        [only] => take_fragment(only, indices)?,
        many => {
            if kind.is_extension() {
                // Selecting across extension fragments through the native
                // kernels corrupts the encoding; combine first.
                let refs: Vec<&dyn Array> =
                    many.iter().map(|a| a.as_ref()).collect();
                let combined = concat(&refs)?;
                take_fragment(&combined, indices)?
            } else {
                let refs: Vec<&dyn Array> =
                    many.iter().map(|a| a.as_ref()).collect();
                let locations = fragment_locations(many, indices);
                interleave(&refs, &locations)?
            }
        }
    };
    column.with_chunks(vec![taken])
}

fn take_fragment(fragment: &ArrayRef, indices: &[u64]) -> Result<ArrayRef> {
    let indices = UInt64Array::from(indices.to_vec());
    Ok(arrow::compute::take(fragment.as_ref(), &indices, None)?)
}

/// Map global row indices to `(fragment, offset)` pairs for the native
/// interleave kernel.
fn fragment_locations(chunks: &[ArrayRef], indices: &[u64]) -> Vec<(usize, usize)> {
    let mut starts = Vec::with_capacity(chunks.len());
    let mut total = 0usize;
    for chunk in chunks {
        starts.push(total);
        total += chunk.len();
    }

    indices
        .iter()
        .map(|&index| {
            let index = index as usize;
            let fragment = starts.partition_point(|&start| start <= index) - 1;
            (fragment, index - starts[fragment])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::fixed_shape_tensor_field;
    use arrow::array::{Array, FixedSizeListArray, Float32Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};

    fn chunked_table(chunks: Vec<Vec<i64>>) -> Table {
        let field = Arc::new(Field::new("x", DataType::Int64, true));
        let arrays: Vec<ArrayRef> = chunks
            .into_iter()
            .map(|v| Arc::new(Int64Array::from(v)) as ArrayRef)
            .collect();
        let column = ChunkedColumn::try_new(field.clone(), arrays).unwrap();
        Table::try_new(Arc::new(Schema::new(vec![field])), vec![column]).unwrap()
    }

    fn values_of(table: &Table) -> Vec<i64> {
        table
            .column(0)
            .unwrap()
            .chunks()
            .iter()
            .flat_map(|chunk| {
                chunk
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap()
                    .values()
                    .to_vec()
            })
            .collect()
    }

    #[test]
    fn test_take_reorders_and_duplicates() {
        let table = chunked_table(vec![vec![10, 20, 30]]);
        let taken = take(&table, &[2, 0, 0]).unwrap();
        assert_eq!(values_of(&taken), vec![30, 10, 10]);
        assert_eq!(taken.schema(), table.schema());
    }

    #[test]
    fn test_take_spans_fragments() {
        let table = chunked_table(vec![vec![10, 20], vec![30], vec![40, 50]]);
        let taken = take(&table, &[4, 2, 0, 3]).unwrap();
        assert_eq!(values_of(&taken), vec![50, 30, 10, 40]);
    }

    #[test]
    fn test_take_out_of_bounds_is_invalid_argument() {
        let table = chunked_table(vec![vec![10, 20]]);
        let err = take(&table, &[2]).unwrap_err();
        assert!(matches!(err, CobbleError::InvalidArgument { .. }));
    }

    #[test]
    fn test_take_permutation_round_trips() {
        let table = chunked_table(vec![vec![1, 2], vec![3, 4]]);
        let permutation = [2u64, 0, 3, 1];
        let mut inverse = vec![0u64; permutation.len()];
        for (at, &p) in permutation.iter().enumerate() {
            inverse[p as usize] = at as u64;
        }

        let shuffled = take(&table, &permutation).unwrap();
        let restored = take(&shuffled, &inverse).unwrap();
        assert_eq!(values_of(&restored), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_take_fragmented_extension_column() {
        let field = Arc::new(fixed_shape_tensor_field("t", DataType::Float32, &[2]));
        let make_fragment = |values: Vec<f32>| -> ArrayRef {
            Arc::new(FixedSizeListArray::new(
                Arc::new(Field::new("item", DataType::Float32, true)),
                2,
                Arc::new(Float32Array::from(values)),
                None,
            ))
        };
        let column = ChunkedColumn::try_new(
            field.clone(),
            vec![make_fragment(vec![1.0, 2.0]), make_fragment(vec![3.0, 4.0])],
        )
        .unwrap();
        let table = Table::try_new(Arc::new(Schema::new(vec![field])), vec![column]).unwrap();

        let taken = take(&table, &[1, 0]).unwrap();
        let column = taken.column(0).unwrap();
        assert_eq!(column.num_chunks(), 1);

        let tensors = column.chunks()[0]
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap();
        let first = tensors.value(0);
        let first = first.as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(first.values(), &[3.0, 4.0]);
    }

    #[test]
    fn test_take_empty_selection() {
        let table = chunked_table(vec![vec![1, 2]]);
        let taken = take(&table, &[]).unwrap();
        assert_eq!(taken.num_rows(), 0);
    }
}
