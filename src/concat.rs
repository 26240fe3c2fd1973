//! Block concatenation with extension-type awareness.
//!
//! Stacks aligned blocks into one table: the unified schema is computed,
//! struct columns are aligned, and columns are spliced fragment-wise. When
//! no extension columns and no null-typed list placeholders are involved,
//! the whole table goes through the native splicing path; otherwise the
//! result is built column by column with the extension-specific rules.

use std::collections::HashSet;

use arrow::array::{new_null_array, Array, ArrayRef};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use tracing::debug;

use crate::align::align_struct_fields;
use crate::column::{ChunkedColumn, Table};
use crate::error::{CobbleError, Result};
use crate::extension::{
    coerce_fragment_to_object, concat_tensor_fragments, ColumnKind,
};
use crate::schema::{is_null_list, unify_schemas};
use crate::sort::{sort, SortKey};

/// Concatenate blocks into a single table under the unified schema.
///
/// Zero blocks produce an empty table and a single block is returned
/// unchanged. Schema-unification failures are wrapped as
/// [`CobbleError::Concatenation`] carrying the input schemas.
pub fn concat(blocks: &[Table], promote_types: bool) -> Result<Table> {
    if blocks.is_empty() {
        return Ok(Table::empty());
    }
    if blocks.len() == 1 {
        return Ok(blocks[0].clone());
    }

    let schemas: Vec<SchemaRef> = blocks.iter().map(|b| b.schema().clone()).collect();
    let unified = unify_schemas(&schemas, promote_types).map_err(|err| {
        let rendered: Vec<String> = schemas.iter().map(|s| format!("{s:?}")).collect();
        CobbleError::concatenation(
            format!(
                "{} blocks with schemas:\n{}",
                blocks.len(),
                rendered.join("\n-----\n")
            ),
            err,
        )
    })?;

    let aligned = align_struct_fields(blocks, &unified)?;

    // Null-typed list placeholders surviving alignment need per-column
    // resolution, same as extension columns.
    let mut cols_with_null_list: HashSet<String> = HashSet::new();
    for block in &aligned {
        for field in block.schema().fields() {
            if is_null_list(field.data_type()) {
                cols_with_null_list.insert(field.name().clone());
            }
        }
    }

    let has_extension = unified
        .fields()
        .iter()
        .any(|f| ColumnKind::of(f).is_extension());

    let table = if !has_extension && cols_with_null_list.is_empty() {
        debug!(blocks = aligned.len(), "concatenating via native splicing");
        splice_native(&aligned, &unified)?
    } else {
        debug!(blocks = aligned.len(), "concatenating via extension-aware path");
        splice_columnwise(&aligned, &unified, &cols_with_null_list)?
    };

    table.validate()?;
    Ok(table)
}

/// Concatenate blocks, then sort the result by `sort_key`.
pub fn concat_and_sort(blocks: &[Table], sort_key: &SortKey, promote_types: bool) -> Result<Table> {
    if blocks.is_empty() {
        return Ok(Table::empty());
    }
    let combined = concat(blocks, promote_types)?;
    sort(&combined, sort_key)
}

/// Fast path: flat fragment splicing with promotion casts, no extension
/// handling needed.
fn splice_native(blocks: &[Table], unified: &SchemaRef) -> Result<Table> {
    let mut columns = Vec::with_capacity(unified.fields().len());
    for field in unified.fields() {
        let mut chunks: Vec<ArrayRef> = Vec::new();
        for block in blocks {
            match block.column_by_name(field.name()) {
                Some(column) if column.data_type() == field.data_type() => {
                    chunks.extend(column.chunks().iter().cloned());
                }
                Some(column) => {
                    for chunk in column.chunks() {
                        chunks.push(cast(chunk, field.data_type())?);
                    }
                }
                None => chunks.push(new_null_array(field.data_type(), block.num_rows())),
            }
        }
        columns.push(ChunkedColumn::try_new(field.clone(), chunks)?);
    }
    Table::try_new(unified.clone(), columns)
}

/// Extension-aware path: build the result column by column.
fn splice_columnwise(
    blocks: &[Table],
    unified: &SchemaRef,
    cols_with_null_list: &HashSet<String>,
) -> Result<Table> {
    let mut columns = Vec::with_capacity(unified.fields().len());

    for field in unified.fields() {
        let kind = ColumnKind::of(field);
        let column = match &kind {
            k if k.is_tensor() => {
                // Tensor columns follow the tensor chunking rule: fragments
                // are re-encoded to the variable-shape layout when element
                // shapes differ across blocks.
                let mut sources = Vec::with_capacity(blocks.len());
                for block in blocks {
                    match block.column_by_name(field.name()) {
                        Some(column) => sources
                            .push((ColumnKind::of(column.field()), column.chunks().to_vec())),
                        None => sources.push((
                            kind.clone(),
                            vec![new_null_array(field.data_type(), block.num_rows())],
                        )),
                    }
                }
                let chunks = concat_tensor_fragments(&sources, &kind)?;
                ChunkedColumn::try_new(field.clone(), chunks)?
            }
            ColumnKind::OpaqueObject => {
                // Everything concatenated with an object column becomes an
                // object payload.
                let mut chunks: Vec<ArrayRef> = Vec::new();
                for block in blocks {
                    match block.column_by_name(field.name()) {
                        Some(column)
                            if ColumnKind::of(column.field()) == ColumnKind::OpaqueObject =>
                        {
                            chunks.extend(column.chunks().iter().cloned());
                        }
                        Some(column) => {
                            for chunk in column.chunks() {
                                chunks.push(coerce_fragment_to_object(chunk)?);
                            }
                        }
                        None => {
                            chunks.push(new_null_array(&DataType::LargeBinary, block.num_rows()));
                        }
                    }
                }
                ChunkedColumn::try_new(field.clone(), chunks)?
            }
            _ => {
                let mut per_block: Vec<Vec<ArrayRef>> = Vec::with_capacity(blocks.len());
                for block in blocks {
                    match block.column_by_name(field.name()) {
                        Some(column) => per_block.push(column.chunks().to_vec()),
                        None => per_block
                            .push(vec![new_null_array(field.data_type(), block.num_rows())]),
                    }
                }

                if cols_with_null_list.contains(field.name().as_str()) {
                    resolve_null_list_fragments(&mut per_block)?;
                }

                let chunks = concatenate_fragment_lists(per_block.concat())?;
                ChunkedColumn::try_new(field.clone(), chunks)?
            }
        };
        columns.push(column);
    }

    Table::try_new(unified.clone(), columns)
}

/// Resolve null-typed list placeholders against the first concrete type
/// found across blocks: cast to it when it is a list type, otherwise fill
/// with nulls of that type.
fn resolve_null_list_fragments(per_block: &mut [Vec<ArrayRef>]) -> Result<()> {
    let concrete = per_block
        .iter()
        .flat_map(|chunks| chunks.iter())
        .map(|chunk| chunk.data_type())
        .find(|dt| !is_null_list(dt))
        .cloned();

    let Some(concrete) = concrete else {
        return Ok(());
    };

    for chunks in per_block.iter_mut() {
        for chunk in chunks.iter_mut() {
            if !is_null_list(chunk.data_type()) {
                continue;
            }
            let resolved = if matches!(concrete, DataType::List(_)) {
                cast(chunk.as_ref(), &concrete)?
            } else {
                new_null_array(&concrete, chunk.len())
            };
            *chunk = resolved;
        }
    }
    Ok(())
}

/// Splice fragment lists into one list, reconciling null-typed fragments by
/// casting and failing fast on any real type mismatch.
fn concatenate_fragment_lists(fragments: Vec<ArrayRef>) -> Result<Vec<ArrayRef>> {
    let inferred = fragments
        .iter()
        .map(|f| f.data_type())
        .find(|dt| *dt != &DataType::Null)
        .cloned();

    let Some(inferred) = inferred else {
        // All fragments are null-typed; the column stays null-typed.
        return Ok(fragments);
    };

    fragments
        .into_iter()
        .map(|fragment| {
            if fragment.data_type() == &DataType::Null {
                cast(&fragment, &inferred).map_err(CobbleError::from)
            } else if fragment.data_type() != &inferred {
                Err(CobbleError::type_mismatch(
                    inferred.to_string(),
                    fragment.data_type().to_string(),
                ))
            } else {
                Ok(fragment)
            }
        })
        .collect()
}
