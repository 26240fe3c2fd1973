//! Integration tests for the cobble block-transformation engine.
//!
//! These tests exercise the full pipeline: schema unification over
//! heterogeneous blocks, struct alignment, extension-aware concatenation,
//! sorting, partitioning and row selection.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, StringArray, StructArray,
};
use arrow::datatypes::{DataType, Field, Fields, Schema};

use cobble::{
    coalesce_if_fragmented, combine_chunks, concat, concat_and_sort, find_partition_index,
    hash_partition, shuffle, sort, take, ChunkedColumn, ColumnKind, ScalarValue, SortField,
    SortKey, Table, TransformOptions,
};
use cobble::combine::combine_chunks_opts;
use cobble::extension::fixed_shape_tensor_field;

fn int64_column(name: &str, values: Vec<Option<i64>>) -> (Arc<Field>, ChunkedColumn) {
    let field = Arc::new(Field::new(name, DataType::Int64, true));
    let column =
        ChunkedColumn::from_array(field.clone(), Arc::new(Int64Array::from(values))).unwrap();
    (field, column)
}

fn string_column(name: &str, values: Vec<&str>) -> (Arc<Field>, ChunkedColumn) {
    let field = Arc::new(Field::new(name, DataType::Utf8, true));
    let column =
        ChunkedColumn::from_array(field.clone(), Arc::new(StringArray::from(values))).unwrap();
    (field, column)
}

fn table_of(columns: Vec<(Arc<Field>, ChunkedColumn)>) -> Table {
    let fields: Vec<Arc<Field>> = columns.iter().map(|(f, _)| f.clone()).collect();
    let columns = columns.into_iter().map(|(_, c)| c).collect();
    Table::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
}

fn int64_values(table: &Table, name: &str) -> Vec<Option<i64>> {
    let column = table.column_by_name(name).unwrap();
    column
        .chunks()
        .iter()
        .flat_map(|chunk| {
            chunk
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap()
                .iter()
                .collect::<Vec<_>>()
        })
        .collect()
}

fn tensor_block(name: &str, shape: &[usize], values: Vec<f32>) -> Table {
    let field = Arc::new(fixed_shape_tensor_field(name, DataType::Float32, shape));
    let size: usize = shape.iter().product();
    let array = FixedSizeListArray::new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        size as i32,
        Arc::new(Float32Array::from(values)),
        None,
    );
    let column = ChunkedColumn::from_array(field.clone(), Arc::new(array)).unwrap();
    Table::try_new(Arc::new(Schema::new(vec![field])), vec![column]).unwrap()
}

#[test]
fn test_concat_then_sort_then_partition_round_trip() {
    let t1 = table_of(vec![
        int64_column("id", vec![Some(3), Some(1)]),
        string_column("name", vec!["c", "a"]),
    ]);
    let t2 = table_of(vec![
        int64_column("id", vec![Some(2), Some(4)]),
        string_column("name", vec!["b", "d"]),
    ]);

    let sorted = concat_and_sort(&[t1, t2], &SortKey::ascending(&["id"]), false).unwrap();
    assert_eq!(
        int64_values(&sorted, "id"),
        vec![Some(1), Some(2), Some(3), Some(4)]
    );

    let partitions = hash_partition(&sorted, &["id"], 2).unwrap();
    let mut all_ids: Vec<Option<i64>> = partitions
        .values()
        .flat_map(|sub| int64_values(sub, "id"))
        .collect();
    all_ids.sort();
    assert_eq!(all_ids, vec![Some(1), Some(2), Some(3), Some(4)]);
}

#[test]
fn test_struct_evolution_across_blocks() {
    // Block 1: s = {a}. Block 2: s = {a, b}. Block 3: no struct at all.
    let narrow_fields: Fields = vec![Field::new("a", DataType::Int64, true)].into();
    let narrow = StructArray::try_new(
        narrow_fields.clone(),
        vec![Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef],
        None,
    )
    .unwrap();
    let narrow_field = Arc::new(Field::new("s", DataType::Struct(narrow_fields), true));
    let block1 = Table::try_new(
        Arc::new(Schema::new(vec![narrow_field.clone()])),
        vec![ChunkedColumn::from_array(narrow_field, Arc::new(narrow)).unwrap()],
    )
    .unwrap();

    let wide_fields: Fields = vec![
        Field::new("a", DataType::Int64, true),
        Field::new("b", DataType::Utf8, true),
    ]
    .into();
    let wide = StructArray::try_new(
        wide_fields.clone(),
        vec![
            Arc::new(Int64Array::from(vec![3])) as ArrayRef,
            Arc::new(StringArray::from(vec!["x"])) as ArrayRef,
        ],
        None,
    )
    .unwrap();
    let wide_field = Arc::new(Field::new("s", DataType::Struct(wide_fields), true));
    let block2 = Table::try_new(
        Arc::new(Schema::new(vec![wide_field.clone()])),
        vec![ChunkedColumn::from_array(wide_field, Arc::new(wide)).unwrap()],
    )
    .unwrap();

    let block3 = table_of(vec![int64_column("id", vec![Some(9)])]);

    let combined = concat(&[block1, block2, block3], false).unwrap();
    assert_eq!(combined.num_rows(), 4);

    let struct_column = combined.column_by_name("s").unwrap();
    let DataType::Struct(unified_fields) = struct_column.data_type() else {
        panic!("expected struct column");
    };
    let names: Vec<&str> = unified_fields.iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);

    // The block without the struct contributes an all-null row.
    let last = struct_column.chunks().last().unwrap();
    assert_eq!(last.null_count(), last.len());

    // Rows from the narrow block carry nulls only in the backfilled field.
    let first = struct_column.chunks()[0]
        .as_any()
        .downcast_ref::<StructArray>()
        .unwrap();
    assert_eq!(first.column_by_name("a").unwrap().null_count(), 0);
    assert_eq!(first.column_by_name("b").unwrap().null_count(), 2);
}

#[test]
fn test_tensor_blocks_with_different_shapes_concatenate_and_select() {
    let t1 = tensor_block("t", &[2], vec![1.0, 2.0, 3.0, 4.0]);
    let t2 = tensor_block("t", &[3], vec![5.0, 6.0, 7.0]);

    let combined = concat(&[t1, t2], false).unwrap();
    assert_eq!(combined.num_rows(), 3);
    assert!(matches!(
        ColumnKind::of(combined.schema().field(0)),
        ColumnKind::VariableTensor { ndim: 1, .. }
    ));

    // The variable-shape column is fragmented; selection must combine it.
    let taken = take(&combined, &[2, 0]).unwrap();
    assert_eq!(taken.num_rows(), 2);

    let column = taken.column(0).unwrap();
    assert_eq!(column.num_chunks(), 1);
    let tensors = column.chunks()[0]
        .as_any()
        .downcast_ref::<StructArray>()
        .unwrap();
    let data = tensors.column(0);
    let data = data
        .as_any()
        .downcast_ref::<arrow::array::ListArray>()
        .unwrap();
    let first = data.value(0);
    let first = first.as_any().downcast_ref::<Float32Array>().unwrap();
    assert_eq!(first.values(), &[5.0, 6.0, 7.0]);
}

#[test]
fn test_take_round_trip_through_inverse_permutation() {
    let table = table_of(vec![
        int64_column("id", vec![Some(1), Some(2), Some(3), Some(4), Some(5)]),
        string_column("name", vec!["a", "b", "c", "d", "e"]),
    ]);

    let permutation = [4u64, 2, 0, 3, 1];
    let mut inverse = vec![0u64; permutation.len()];
    for (at, &p) in permutation.iter().enumerate() {
        inverse[p as usize] = at as u64;
    }

    let permuted = take(&table, &permutation).unwrap();
    let restored = take(&permuted, &inverse).unwrap();
    assert_eq!(
        int64_values(&restored, "id"),
        int64_values(&table, "id")
    );
}

#[test]
fn test_combine_and_coalesce_over_fragmented_table() {
    let field = Arc::new(Field::new("s", DataType::Utf8, true));
    let chunks: Vec<ArrayRef> = (0..12)
        .map(|i| Arc::new(StringArray::from(vec![format!("row-{i}")])) as ArrayRef)
        .collect();
    let column = ChunkedColumn::try_new(field.clone(), chunks).unwrap();
    let table = Table::try_new(Arc::new(Schema::new(vec![field])), vec![column]).unwrap();

    // Threshold above the fragment count leaves the column untouched.
    let untouched = coalesce_if_fragmented(&table, 20).unwrap();
    assert_eq!(untouched.column(0).unwrap().num_chunks(), 12);

    // Default threshold combines it.
    let coalesced = coalesce_if_fragmented(&table, 10).unwrap();
    assert_eq!(coalesced.column(0).unwrap().num_chunks(), 1);

    let combined = combine_chunks(&table, false).unwrap();
    assert_eq!(combined.column(0).unwrap().num_chunks(), 1);
    assert_eq!(combined.num_rows(), 12);
}

#[test]
fn test_overflow_ceiling_bounds_fragment_sizes_end_to_end() {
    let field = Arc::new(Field::new("payload", DataType::Utf8, true));
    let chunks: Vec<ArrayRef> = (0..8)
        .map(|i| {
            let value = format!("{i}").repeat(64);
            Arc::new(StringArray::from(vec![value])) as ArrayRef
        })
        .collect();
    let column = ChunkedColumn::try_new(field.clone(), chunks).unwrap();
    let table = Table::try_new(Arc::new(Schema::new(vec![field])), vec![column]).unwrap();

    let per_chunk = table.column(0).unwrap().chunks()[0].get_buffer_memory_size();
    let opts = TransformOptions::default().with_offset_overflow_ceiling(per_chunk * 3);

    let combined = combine_chunks_opts(&table, false, &opts).unwrap();
    let column = combined.column(0).unwrap();
    assert!(column.num_chunks() > 1);
    for chunk in column.chunks() {
        assert!(chunk.get_buffer_memory_size() <= per_chunk * 3);
    }

    // Values survive regrouping in order.
    let original: Vec<String> = (0..8).map(|i| format!("{i}").repeat(64)).collect();
    let regrouped: Vec<String> = column
        .chunks()
        .iter()
        .flat_map(|chunk| {
            let strings = chunk.as_any().downcast_ref::<StringArray>().unwrap();
            (0..strings.len())
                .map(|i| strings.value(i).to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(regrouped, original);
}

#[test]
fn test_range_partition_boundaries_split_sorted_table() {
    let table = table_of(vec![int64_column(
        "x",
        vec![Some(1), Some(3), Some(3), Some(5), Some(7), None],
    )]);
    let key = SortKey::ascending(&["x"]);

    let boundaries = [
        ScalarValue::Int64(Some(3)),
        ScalarValue::Int64(Some(6)),
        ScalarValue::Int64(None),
    ];
    let splits: Vec<usize> = boundaries
        .iter()
        .map(|b| find_partition_index(&table, std::slice::from_ref(b), &key).unwrap())
        .collect();

    // Boundary 3 inserts before the first 3; 6 between 5 and 7; a null
    // boundary lands after every real value.
    assert_eq!(splits, vec![1, 4, 5]);
}

#[test]
fn test_sort_descending_then_locate_boundary() {
    let table = table_of(vec![int64_column(
        "x",
        vec![Some(5), Some(1), Some(3), Some(3), Some(7)],
    )]);
    let key = SortKey::new(vec![SortField::descending("x")]);

    let sorted = sort(&table, &key).unwrap();
    assert_eq!(
        int64_values(&sorted, "x"),
        vec![Some(7), Some(5), Some(3), Some(3), Some(1)]
    );

    let at = find_partition_index(&sorted, &[ScalarValue::Int64(Some(3))], &key).unwrap();
    assert_eq!(at, 4);
}

#[test]
fn test_shuffle_preserves_multiset_and_determinism() {
    let table = table_of(vec![
        int64_column("id", (0..64).map(Some).collect()),
        string_column("name", (0..64).map(|_| "r").collect()),
    ]);

    let a = shuffle(&table, Some(42)).unwrap();
    let b = shuffle(&table, Some(42)).unwrap();
    assert_eq!(int64_values(&a, "id"), int64_values(&b, "id"));

    let mut sorted = int64_values(&a, "id");
    sorted.sort();
    assert_eq!(sorted, (0..64).map(Some).collect::<Vec<_>>());
}

#[test]
fn test_hash_partition_after_heavy_fragmentation() {
    // Build a table whose column is split across many fragments, the way
    // repeated small appends leave it.
    let field = Arc::new(Field::new("id", DataType::Int64, true));
    let chunks: Vec<ArrayRef> = (0..20)
        .map(|i| Arc::new(Int64Array::from(vec![i])) as ArrayRef)
        .collect();
    let column = ChunkedColumn::try_new(field.clone(), chunks).unwrap();
    let table = Table::try_new(Arc::new(Schema::new(vec![field])), vec![column]).unwrap();

    let partitions = hash_partition(&table, &["id"], 4).unwrap();
    let mut all: Vec<Option<i64>> = partitions
        .values()
        .flat_map(|sub| int64_values(sub, "id"))
        .collect();
    all.sort();
    assert_eq!(all, (0..20).map(Some).collect::<Vec<_>>());
}

#[test]
fn test_promote_types_flag_widens_across_blocks() {
    let narrow_field = Arc::new(Field::new("x", DataType::Int32, true));
    let narrow = Table::try_new(
        Arc::new(Schema::new(vec![narrow_field.clone()])),
        vec![ChunkedColumn::from_array(
            narrow_field,
            Arc::new(arrow::array::Int32Array::from(vec![1, 2])),
        )
        .unwrap()],
    )
    .unwrap();
    let wide = table_of(vec![int64_column("x", vec![Some(3)])]);

    assert!(concat(&[narrow.clone(), wide.clone()], false).is_err());

    let combined = concat(&[narrow, wide], true).unwrap();
    assert_eq!(combined.schema().field(0).data_type(), &DataType::Int64);
    assert_eq!(
        int64_values(&combined, "x"),
        vec![Some(1), Some(2), Some(3)]
    );
}
