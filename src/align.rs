//! Struct column alignment across blocks.
//!
//! Rewrites each block's struct-typed columns so their field sets exactly
//! match the unified schema, backfilling missing fields with nulls. This is
//! a structural rewrite only: it never changes row count or row order, and
//! non-struct mismatches are left for the concatenator to resolve.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{new_empty_array, new_null_array, Array, ArrayRef, StructArray};
use arrow::compute::concat;
use arrow::datatypes::{DataType, Field, FieldRef, Fields, Schema, SchemaRef};

use crate::column::{ChunkedColumn, Table};
use crate::error::{CobbleError, Result};
use crate::extension::{fixed_to_variable, needs_variable_shape, ColumnKind};

/// Align every block's struct columns to the unified schema.
pub fn align_struct_fields(blocks: &[Table], schema: &SchemaRef) -> Result<Vec<Table>> {
    if blocks.iter().all(|b| b.schema().as_ref() == schema.as_ref()) {
        return Ok(blocks.to_vec());
    }

    // Struct columns of the unified schema; tensor storage structs are
    // classified as extensions and excluded.
    let unified_struct_types: HashMap<&str, (&FieldRef, &Fields)> = schema
        .fields()
        .iter()
        .filter(|f| ColumnKind::of(f) == ColumnKind::Struct)
        .map(|f| {
            let DataType::Struct(fields) = f.data_type() else {
                unreachable!("classified as struct");
            };
            (f.name().as_str(), (f, fields))
        })
        .collect();

    if unified_struct_types.is_empty() {
        return Ok(blocks.to_vec());
    }

    let mut aligned_blocks = Vec::with_capacity(blocks.len());
    for block in blocks {
        let block_length = block.num_rows();
        let mut aligned_columns: HashMap<&str, ChunkedColumn> = HashMap::new();

        for (&name, &(unified_field, unified_fields)) in &unified_struct_types {
            match block.column_by_name(name) {
                Some(column) if ColumnKind::of(column.field()) == ColumnKind::Struct => {
                    let combined = combine_fragments(column)?;
                    let backfilled =
                        backfill_missing_fields(&combined, unified_fields, block_length)?;
                    aligned_columns.insert(
                        name,
                        ChunkedColumn::from_array(unified_field.clone(), backfilled)?,
                    );
                }
                // Present but not struct-typed: pass through unchanged.
                Some(_) => {}
                None => {
                    let nulls = new_null_array(unified_field.data_type(), block_length);
                    aligned_columns
                        .insert(name, ChunkedColumn::from_array(unified_field.clone(), nulls)?);
                }
            }
        }

        // Rebuild in unified-schema order. Non-struct columns the block does
        // not have stay missing; the concatenator fills them later.
        let mut fields: Vec<FieldRef> = Vec::new();
        let mut columns: Vec<ChunkedColumn> = Vec::new();
        for field in schema.fields() {
            if let Some(column) = aligned_columns.remove(field.name().as_str()) {
                fields.push(column.field().clone());
                columns.push(column);
            } else if let Some(column) = block.column_by_name(field.name()) {
                fields.push(column.field().clone());
                columns.push(column.clone());
            }
        }
        aligned_blocks.push(Table::try_new(Arc::new(Schema::new(fields)), columns)?);
    }

    Ok(aligned_blocks)
}

/// Align a struct column's fields to the target struct field set,
/// recursively for nested structs. Missing fields backfill as
/// `row_count`-many typed nulls; tensor fields needing the variable-shape
/// encoding are converted on the spot.
pub(crate) fn backfill_missing_fields(
    column: &ArrayRef,
    unified_fields: &Fields,
    row_count: usize,
) -> Result<ArrayRef> {
    let current = column
        .as_any()
        .downcast_ref::<StructArray>()
        .ok_or_else(|| CobbleError::type_mismatch("Struct", column.data_type().to_string()))?;
    let DataType::Struct(current_fields) = column.data_type() else {
        unreachable!("struct array has struct type");
    };

    // Unification already produced the union of field sets; anything extra
    // here is an invariant violation.
    for field in current_fields {
        if unified_fields.find(field.name()).is_none() {
            return Err(CobbleError::type_mismatch(
                format!("struct field set {:?}", field_names(unified_fields)),
                format!("unexpected field '{}'", field.name()),
            ));
        }
    }

    if column.data_type() == &DataType::Struct(unified_fields.clone()) {
        return Ok(column.clone());
    }

    let mut aligned: Vec<ArrayRef> = Vec::with_capacity(unified_fields.len());
    for field in unified_fields {
        let existing = current_fields
            .find(field.name())
            .map(|(at, current_field)| (current_field, current.column(at)));

        let child = match existing {
            Some((current_field, child)) => {
                let target_kind = ColumnKind::of(field);
                let current_kind = ColumnKind::of(current_field);
                // A variable-tensor target also stores as a struct, so
                // dispatch on the classified kind, not the storage type.
                if target_kind == ColumnKind::Struct {
                    let DataType::Struct(nested) = field.data_type() else {
                        unreachable!("classified as struct");
                    };
                    backfill_missing_fields(child, nested, row_count)?
                } else if target_kind.is_tensor()
                    && current_kind.is_tensor()
                    && needs_variable_shape(&[current_kind.clone(), target_kind.clone()])
                {
                    match current_kind {
                        ColumnKind::FixedTensor { shape, element } => {
                            fixed_to_variable(child, &shape, &element)?
                        }
                        // Already variable-shaped.
                        _ => child.clone(),
                    }
                } else {
                    child.clone()
                }
            }
            None => new_null_array(field.data_type(), row_count),
        };
        aligned.push(child);
    }

    let rebuilt = StructArray::try_new(unified_fields.clone(), aligned, None)?;
    Ok(Arc::new(rebuilt))
}

fn combine_fragments(column: &ChunkedColumn) -> Result<ArrayRef> {
    match column.chunks() {
        [] => Ok(new_empty_array(column.data_type())),
        [only] => Ok(only.clone()),
        many => {
            let refs: Vec<&dyn Array> = many.iter().map(|a| a.as_ref()).collect();
            Ok(concat(&refs)?)
        }
    }
}

fn field_names(fields: &Fields) -> Vec<&str> {
    fields.iter().map(|f| f.name().as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::unify_schemas;
    use arrow::array::{Int64Array, StringArray};

    fn struct_column(name: &str, fields: Vec<(&str, ArrayRef)>) -> (FieldRef, ChunkedColumn) {
        let struct_fields: Fields = fields
            .iter()
            .map(|(n, a)| Field::new(*n, a.data_type().clone(), true))
            .collect();
        let arrays: Vec<ArrayRef> = fields.into_iter().map(|(_, a)| a).collect();
        let array = StructArray::try_new(struct_fields.clone(), arrays, None).unwrap();
        let field = Arc::new(Field::new(name, DataType::Struct(struct_fields), true));
        let column = ChunkedColumn::from_array(field.clone(), Arc::new(array)).unwrap();
        (field, column)
    }

    fn block_with_struct(fields: Vec<(&str, ArrayRef)>) -> Table {
        let (field, column) = struct_column("s", fields);
        Table::try_new(Arc::new(Schema::new(vec![field])), vec![column]).unwrap()
    }

    #[test]
    fn test_backfill_fills_missing_field_with_nulls() {
        let narrow = block_with_struct(vec![(
            "a",
            Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
        )]);
        let wide = block_with_struct(vec![
            ("a", Arc::new(Int64Array::from(vec![3])) as ArrayRef),
            ("b", Arc::new(StringArray::from(vec!["x"])) as ArrayRef),
        ]);

        let unified =
            unify_schemas(&[narrow.schema().clone(), wide.schema().clone()], false).unwrap();
        let aligned = align_struct_fields(&[narrow, wide], &unified).unwrap();

        let first = aligned[0].column_by_name("s").unwrap();
        let array = first.chunks()[0]
            .as_any()
            .downcast_ref::<StructArray>()
            .unwrap();
        let b = array.column_by_name("b").unwrap();
        assert_eq!(b.null_count(), 2);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_nested_struct_recursion() {
        let inner_a: ArrayRef = Arc::new(Int64Array::from(vec![1]));
        let (_, inner_col) = struct_column("inner", vec![("x", inner_a)]);
        let inner_array = inner_col.chunks()[0].clone();
        let narrow = block_with_struct(vec![("inner", inner_array)]);

        let inner_b: ArrayRef = Arc::new(StringArray::from(vec!["y"]));
        let (_, inner_col_b) = struct_column("inner", vec![("y", inner_b)]);
        let wide = block_with_struct(vec![("inner", inner_col_b.chunks()[0].clone())]);

        let unified =
            unify_schemas(&[narrow.schema().clone(), wide.schema().clone()], false).unwrap();
        let aligned = align_struct_fields(&[narrow, wide], &unified).unwrap();

        let outer = aligned[0].column_by_name("s").unwrap().chunks()[0].clone();
        let outer = outer.as_any().downcast_ref::<StructArray>().unwrap();
        let inner = outer.column_by_name("inner").unwrap();
        let inner = inner.as_any().downcast_ref::<StructArray>().unwrap();
        assert!(inner.column_by_name("x").is_some());
        assert_eq!(inner.column_by_name("y").unwrap().null_count(), 1);
    }

    #[test]
    fn test_wholly_missing_struct_column_synthesized_as_null() {
        let with_struct = block_with_struct(vec![(
            "a",
            Arc::new(Int64Array::from(vec![1])) as ArrayRef,
        )]);
        let without = Table::try_new(
            Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)])),
            vec![ChunkedColumn::from_array(
                Arc::new(Field::new("id", DataType::Int64, true)),
                Arc::new(Int64Array::from(vec![10, 20])),
            )
            .unwrap()],
        )
        .unwrap();

        let unified =
            unify_schemas(&[with_struct.schema().clone(), without.schema().clone()], false)
                .unwrap();
        let aligned = align_struct_fields(&[with_struct, without.clone()], &unified).unwrap();

        let synthesized = aligned[1].column_by_name("s").unwrap();
        assert_eq!(synthesized.len(), 2);
        assert_eq!(synthesized.chunks()[0].null_count(), 2);
        // Row count and order of the existing column are untouched.
        assert_eq!(aligned[1].num_rows(), 2);
    }

    #[test]
    fn test_aligned_blocks_with_matching_schema_pass_through() {
        let block = block_with_struct(vec![(
            "a",
            Arc::new(Int64Array::from(vec![1])) as ArrayRef,
        )]);
        let schema = block.schema().clone();
        let aligned = align_struct_fields(&[block], &schema).unwrap();
        assert_eq!(aligned.len(), 1);
    }
}
