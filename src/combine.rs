//! Fragment combination and defragmentation.
//!
//! Positional selection cost scales with a column's fragment count, so
//! heavily fragmented columns are combined into fewer, larger fragments
//! before such operations. Combination must respect a hard ceiling for
//! types that address their payload through 32-bit offsets: combining past
//! ~2 GiB of payload would silently overflow the offsets, so those columns
//! are instead regrouped into multiple individually-safe fragments.

use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::compute::concat;

use crate::column::{ChunkedColumn, Table};
use crate::error::Result;
use crate::extension::ColumnKind;
use crate::options::TransformOptions;

/// Combine each column of a table into contiguous fragments.
///
/// With `copy` unset, a single-fragment column is returned as-is (fragments
/// stay aliased); with `copy` set, even single fragments are rebuilt.
pub fn combine_chunks(table: &Table, copy: bool) -> Result<Table> {
    combine_chunks_opts(table, copy, &TransformOptions::default())
}

/// [`combine_chunks`] with explicit options.
pub fn combine_chunks_opts(table: &Table, copy: bool, opts: &TransformOptions) -> Result<Table> {
    let columns = table
        .columns()
        .iter()
        .map(|col| combine_chunked_column(col, copy, opts))
        .collect::<Result<Vec<_>>>()?;
    Table::try_new(table.schema().clone(), columns)
}

/// Combine only the columns whose fragment count has reached `threshold`.
///
/// Used before row-selection operations; columns below the threshold keep
/// their fragments (and their memory) untouched.
pub fn coalesce_if_fragmented(table: &Table, threshold: usize) -> Result<Table> {
    let opts = TransformOptions::default().with_combine_chunk_threshold(threshold);
    coalesce_if_fragmented_opts(table, &opts)
}

/// [`coalesce_if_fragmented`] with explicit options.
pub fn coalesce_if_fragmented_opts(table: &Table, opts: &TransformOptions) -> Result<Table> {
    if table.num_columns() == 0 {
        return Ok(table.clone());
    }
    let columns = table
        .columns()
        .iter()
        .map(|col| {
            if col.num_chunks() >= opts.combine_chunk_threshold {
                combine_chunked_column(col, false, opts)
            } else {
                Ok(col.clone())
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Table::try_new(table.schema().clone(), columns)
}

/// Combine one column's fragments.
///
/// Extension-typed columns go through type-aware concatenation, since the
/// native byte-level combine mishandles them. Zero-fragment columns yield
/// one explicit empty fragment. Single fragments are returned as-is unless
/// `ensure_copy` is set. Everything else takes the overflow-safe path.
pub fn combine_chunked_column(
    column: &ChunkedColumn,
    ensure_copy: bool,
    opts: &TransformOptions,
) -> Result<ChunkedColumn> {
    let kind = ColumnKind::of(column.field());

    if kind.is_extension() {
        return concat_extension_column(column, ensure_copy);
    }
    match column.chunks() {
        [] => column.with_chunks(vec![new_empty_array(column.data_type())]),
        [_] if !ensure_copy => Ok(column.clone()),
        _ => try_combine_chunks_safe(column, &kind, opts),
    }
}

/// Combine an extension column's fragments into one, through concatenation
/// of the extension storage (never the native byte-level combine).
fn concat_extension_column(column: &ChunkedColumn, ensure_copy: bool) -> Result<ChunkedColumn> {
    match column.chunks() {
        [] => column.with_chunks(vec![new_empty_array(column.data_type())]),
        [_] if !ensure_copy => Ok(column.clone()),
        chunks => {
            let refs: Vec<&dyn Array> = chunks.iter().map(|a| a.as_ref()).collect();
            column.with_chunks(vec![concat(&refs)?])
        }
    }
}

/// Combine into a single fragment when that cannot overflow 32-bit offsets;
/// otherwise greedily pack consecutive fragments into groups, sealing each
/// group before it would exceed the ceiling.
fn try_combine_chunks_safe(
    column: &ChunkedColumn,
    kind: &ColumnKind,
    opts: &TransformOptions,
) -> Result<ChunkedColumn> {
    let ceiling = opts.offset_overflow_ceiling;

    if !kind.uses_small_offsets() || column.byte_size() < ceiling {
        let refs: Vec<&dyn Array> = column.chunks().iter().map(|a| a.as_ref()).collect();
        return column.with_chunks(vec![concat(&refs)?]);
    }

    let mut new_chunks: Vec<ArrayRef> = Vec::new();
    let mut group: Vec<&dyn Array> = Vec::new();
    let mut group_size = 0usize;

    for chunk in column.chunks() {
        let chunk_size = chunk.get_buffer_memory_size();
        if !group.is_empty() && group_size + chunk_size > ceiling {
            new_chunks.push(concat(&group)?);
            group.clear();
            group_size = 0;
        }
        group.push(chunk.as_ref());
        group_size += chunk_size;
    }
    if !group.is_empty() {
        new_chunks.push(concat(&group)?);
    }

    column.with_chunks(new_chunks)
}
