//! Hash partitioning and row shuffling.
//!
//! Both operations redefine row order, but deterministically: hash
//! partitioning groups rows by the hash of a projected column tuple while
//! preserving relative order within each partition, and shuffling applies a
//! seeded permutation.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use arrow::array::Array;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::column::Table;
use crate::combine::coalesce_if_fragmented_opts;
use crate::error::{CobbleError, Result};
use crate::options::TransformOptions;
use crate::scalar::ScalarValue;
use crate::take::take;

/// Split a table's rows into `num_partitions` buckets by hash of the tuple
/// of values in the projected columns.
///
/// Some partitions can come out empty under skew, so the result maps
/// partition index to sub-table and omits empty partitions. Row order
/// within a partition follows the input.
pub fn hash_partition(
    table: &Table,
    columns: &[&str],
    num_partitions: usize,
) -> Result<HashMap<usize, Table>> {
    hash_partition_opts(table, columns, num_partitions, &TransformOptions::default())
}

/// [`hash_partition`] with explicit options for the pre-selection
/// coalescing pass.
pub fn hash_partition_opts(
    table: &Table,
    columns: &[&str],
    num_partitions: usize,
    opts: &TransformOptions,
) -> Result<HashMap<usize, Table>> {
    if num_partitions == 0 {
        return Err(CobbleError::invalid_argument(
            "partition count must be at least 1",
        ));
    }
    if table.num_rows() == 0 {
        return Ok(HashMap::new());
    }
    if num_partitions == 1 {
        return Ok(HashMap::from([(0, table.clone())]));
    }

    let projected = table.project(columns)?;
    let key_values: Vec<Vec<ScalarValue>> = projected
        .columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>>>()?;

    // Stable per-partition index lists: rows keep their relative order.
    let mut partition_indices: Vec<Vec<u64>> = vec![Vec::new(); num_partitions];
    for row in 0..table.num_rows() {
        let mut hasher = DefaultHasher::new();
        for column in &key_values {
            column[row].hash(&mut hasher);
        }
        let partition = (hasher.finish() % num_partitions as u64) as usize;
        partition_indices[partition].push(row as u64);
    }

    // Positional selection is sensitive to fragment count, so defragment
    // heavily chunked columns before materializing the partitions.
    let table = coalesce_if_fragmented_opts(table, opts)?;

    let mut partitions = HashMap::new();
    for (partition, indices) in partition_indices.into_iter().enumerate() {
        if indices.is_empty() {
            continue;
        }
        partitions.insert(partition, take(&table, &indices)?);
    }
    Ok(partitions)
}

/// Permute a table's rows. A fixed seed yields a deterministic permutation.
pub fn shuffle(table: &Table, seed: Option<u64>) -> Result<Table> {
    if table.num_rows() == 0 {
        return Ok(table.clone());
    }

    let mut indices: Vec<u64> = (0..table.num_rows() as u64).collect();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    indices.shuffle(&mut rng);
    take(table, &indices)
}

fn column_values(column: &crate::column::ChunkedColumn) -> Result<Vec<ScalarValue>> {
    let mut out = Vec::with_capacity(column.len());
    for chunk in column.chunks() {
        for row in 0..chunk.len() {
            out.push(ScalarValue::try_from_array(chunk.as_ref(), row)?);
        }
    }
    Ok(out)
}
