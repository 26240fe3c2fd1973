//! Sorting and sorted-partition boundary location.
//!
//! Sorting delegates to the native lexicographic sort-indices kernel with
//! nulls placed last, then materializes through the extension-safe row
//! selector. [`find_partition_index`] binary-searches an already-sorted
//! table for the offset at which a boundary tuple should be inserted,
//! honoring per-column direction and a total order that places nulls and
//! not-a-numbers after every real value.

use std::cmp::Ordering;

use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::compute::{lexsort_to_indices, SortColumn, SortOptions};

use crate::column::{ChunkedColumn, Table};
use crate::error::{CobbleError, Result};
use crate::scalar::{compare_real, ScalarValue};
use crate::take::take;

/// Per-column sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// Whether this direction is descending.
    pub fn is_descending(&self) -> bool {
        matches!(self, SortDirection::Descending)
    }
}

/// One component of a sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    name: String,
    direction: SortDirection,
}

impl SortField {
    /// Sort the named column ascending.
    pub fn ascending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Sort the named column descending.
    pub fn descending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: SortDirection::Descending,
        }
    }

    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sort direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// An ordered list of sort-key components with independent directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    fields: Vec<SortField>,
}

impl SortKey {
    /// Build a sort key from components.
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    /// Build an all-ascending key over the named columns.
    pub fn ascending(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| SortField::ascending(*n)).collect())
    }

    /// The key components in order.
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Number of key components.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the key has no components.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Adapter to the native sort-indices kernel: one combined values array
    /// per component, nulls placed last in either direction.
    pub(crate) fn to_sort_columns(&self, table: &Table) -> Result<Vec<SortColumn>> {
        self.fields
            .iter()
            .map(|field| {
                let column = table.column_by_name(field.name()).ok_or_else(|| {
                    CobbleError::invalid_argument(format!(
                        "sort column '{}' not found",
                        field.name()
                    ))
                })?;
                Ok(SortColumn {
                    values: combined_values(column)?,
                    options: Some(SortOptions {
                        descending: field.direction().is_descending(),
                        nulls_first: false,
                    }),
                })
            })
            .collect()
    }
}

fn combined_values(column: &ChunkedColumn) -> Result<ArrayRef> {
    match column.chunks() {
        [] => Ok(new_empty_array(column.data_type())),
        [only] => Ok(only.clone()),
        many => {
            let refs: Vec<&dyn Array> = many.iter().map(|a| a.as_ref()).collect();
            Ok(arrow::compute::concat(&refs)?)
        }
    }
}

/// Sort a table by the given key. Row selection is extension-safe.
pub fn sort(table: &Table, sort_key: &SortKey) -> Result<Table> {
    if sort_key.is_empty() {
        return Err(CobbleError::invalid_argument("sort key is empty"));
    }
    if table.num_rows() == 0 {
        return Ok(table.clone());
    }

    let sort_columns = sort_key.to_sort_columns(table)?;
    let indices = lexsort_to_indices(&sort_columns, None)?;
    let indices: Vec<u64> = indices.values().iter().map(|&i| i as u64).collect();
    take(table, &indices)
}

/// Boundary component used during binary search. A missing or not-a-number
/// desired component searches as the sentinel, which orders after every real
/// value and before the column's nulls.
enum SearchBound {
    Value(ScalarValue),
    Sentinel,
}

/// For a table sorted by `sort_key`, find the row offset at which the
/// boundary tuple `desired` should be inserted to preserve sort order.
///
/// `desired` may cover only a prefix of the sort columns; the search narrows
/// a candidate window per component and the remaining components are left
/// free. Descending components are searched through the mirrored ascending
/// view with positions mapped back into descending coordinates.
pub fn find_partition_index(
    table: &Table,
    desired: &[ScalarValue],
    sort_key: &SortKey,
) -> Result<usize> {
    if sort_key.is_empty() {
        return Err(CobbleError::invalid_argument("sort key is empty"));
    }
    if desired.len() > sort_key.len() {
        return Err(CobbleError::invalid_argument(format!(
            "boundary tuple has {} components but the sort key has {}",
            desired.len(),
            sort_key.len()
        )));
    }

    let mut left = 0usize;
    let mut right = table.num_rows();

    for (component, field) in desired.iter().zip(sort_key.fields()) {
        if left == right {
            return Ok(right);
        }
        let column = table.column_by_name(field.name()).ok_or_else(|| {
            CobbleError::invalid_argument(format!("sort column '{}' not found", field.name()))
        })?;
        let values = window_values(column, left, right)?;
        let bound = if component.is_null_or_nan() {
            SearchBound::Sentinel
        } else {
            SearchBound::Value(component.clone())
        };

        let previous_left = left;
        let window = values.len();
        if field.direction().is_descending() {
            // Reversing a descending window yields an ascending view; the
            // found positions mirror back into descending coordinates.
            let lower = search_sorted(&values, &bound, Side::Left, true)?;
            let upper = search_sorted(&values, &bound, Side::Right, true)?;
            left = previous_left + (window - upper);
            right = previous_left + (window - lower);
        } else {
            left = previous_left + search_sorted(&values, &bound, Side::Left, false)?;
            right = previous_left + search_sorted(&values, &bound, Side::Right, false)?;
        }
    }

    if sort_key.fields()[0].direction().is_descending() {
        Ok(right)
    } else {
        Ok(left)
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Binary search over an ascending window (optionally viewed reversed),
/// returning the leftmost or rightmost insertion point for `bound`.
fn search_sorted(
    values: &[ScalarValue],
    bound: &SearchBound,
    side: Side,
    reversed: bool,
) -> Result<usize> {
    let n = values.len();
    let value_at = |i: usize| if reversed { &values[n - 1 - i] } else { &values[i] };

    let mut lo = 0usize;
    let mut hi = n;
    while lo < hi {
        let mid = (lo + hi) / 2;
        let ord = compare_to_bound(value_at(mid), bound)?;
        let go_right = match side {
            Side::Left => ord == Ordering::Less,
            Side::Right => ord != Ordering::Greater,
        };
        if go_right {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// Total order against a search bound: real values < sentinel < nulls and
/// not-a-numbers, which compare equal to each other.
fn compare_to_bound(value: &ScalarValue, bound: &SearchBound) -> Result<Ordering> {
    let value_rank: u8 = if value.is_null_or_nan() { 2 } else { 0 };
    let bound_rank: u8 = match bound {
        SearchBound::Sentinel => 1,
        SearchBound::Value(v) if v.is_null_or_nan() => 2,
        SearchBound::Value(_) => 0,
    };

    if value_rank != bound_rank {
        return Ok(value_rank.cmp(&bound_rank));
    }
    match bound {
        SearchBound::Value(v) if value_rank == 0 => compare_real(value, v),
        _ => Ok(Ordering::Equal),
    }
}

/// Materialize the scalar values of `column` in rows `[start, end)`.
fn window_values(column: &ChunkedColumn, start: usize, end: usize) -> Result<Vec<ScalarValue>> {
    let mut out = Vec::with_capacity(end.saturating_sub(start));
    let mut offset = 0usize;
    for chunk in column.chunks() {
        let chunk_end = offset + chunk.len();
        let lo = start.max(offset);
        let hi = end.min(chunk_end);
        for row in lo..hi {
            out.push(ScalarValue::try_from_array(chunk.as_ref(), row - offset)?);
        }
        offset = chunk_end;
        if offset >= end {
            break;
        }
    }
    Ok(out)
}
