//! Extension column encodings and the column-kind classifier.
//!
//! Extension types are layered on top of native physical encodings through
//! Arrow field metadata:
//!
//! - fixed-shape tensor: `FixedSizeList<elem>` storage, metadata records the
//!   element shape;
//! - variable-shape tensor: `Struct{data: List<elem>, shape: List<Int64>}`
//!   storage, metadata records the dimensionality;
//! - opaque object: `LargeBinary` storage, each value a serialized scalar
//!   payload whose contents are not type-checked further.
//!
//! Every algorithm in this crate dispatches on [`ColumnKind`], a closed
//! tagged classification of a field, so extension handling stays exhaustive.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, FixedSizeListArray, Int64Array, LargeBinaryArray, ListArray,
    StructArray};
use arrow::buffer::OffsetBuffer;
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Fields};
use serde::{Deserialize, Serialize};

use crate::error::{CobbleError, Result};
use crate::scalar::ScalarValue;

/// Field metadata key naming the extension encoding.
pub const EXTENSION_NAME_KEY: &str = "ARROW:extension:name";
/// Field metadata key carrying the encoding's parameters.
pub const EXTENSION_METADATA_KEY: &str = "ARROW:extension:metadata";

/// Extension name of the fixed-shape tensor encoding.
pub const FIXED_TENSOR_NAME: &str = "cobble.tensor";
/// Extension name of the variable-shape tensor encoding.
pub const VARIABLE_TENSOR_NAME: &str = "cobble.tensor.variable";
/// Extension name of the opaque-object encoding.
pub const OBJECT_NAME: &str = "cobble.object";

#[derive(Serialize, Deserialize)]
struct FixedTensorMetadata {
    shape: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct VariableTensorMetadata {
    ndim: usize,
}

/// Closed classification of a column's field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Any native type without special handling.
    Primitive,
    /// Variable-width native type addressed through a byte-offsets array;
    /// `large` marks 64-bit offsets.
    VariableWidth { large: bool },
    /// Native struct type.
    Struct,
    /// Fixed-shape tensor extension; every element has `shape`.
    FixedTensor { element: DataType, shape: Vec<usize> },
    /// Variable-shape tensor extension; elements share dimensionality only.
    VariableTensor { element: DataType, ndim: usize },
    /// Opaque-object extension.
    OpaqueObject,
}

impl ColumnKind {
    /// Classify a field. Malformed extension metadata falls back to the
    /// structural classification of the storage type.
    pub fn of(field: &Field) -> ColumnKind {
        if let Some(kind) = Self::of_extension(field) {
            return kind;
        }
        match field.data_type() {
            DataType::Struct(_) => ColumnKind::Struct,
            DataType::Utf8
            | DataType::Binary
            | DataType::List(_)
            | DataType::ListView(_)
            | DataType::Map(_, _)
            | DataType::Utf8View
            | DataType::BinaryView => ColumnKind::VariableWidth { large: false },
            DataType::LargeUtf8
            | DataType::LargeBinary
            | DataType::LargeList(_)
            | DataType::LargeListView(_) => ColumnKind::VariableWidth { large: true },
            _ => ColumnKind::Primitive,
        }
    }

    fn of_extension(field: &Field) -> Option<ColumnKind> {
        let name = field.metadata().get(EXTENSION_NAME_KEY)?;
        match name.as_str() {
            FIXED_TENSOR_NAME => {
                let meta: FixedTensorMetadata =
                    serde_json::from_str(field.metadata().get(EXTENSION_METADATA_KEY)?).ok()?;
                let DataType::FixedSizeList(item, _) = field.data_type() else {
                    return None;
                };
                Some(ColumnKind::FixedTensor {
                    element: item.data_type().clone(),
                    shape: meta.shape,
                })
            }
            VARIABLE_TENSOR_NAME => {
                let meta: VariableTensorMetadata =
                    serde_json::from_str(field.metadata().get(EXTENSION_METADATA_KEY)?).ok()?;
                let DataType::Struct(fields) = field.data_type() else {
                    return None;
                };
                let DataType::List(item) = fields.first()?.data_type() else {
                    return None;
                };
                Some(ColumnKind::VariableTensor {
                    element: item.data_type().clone(),
                    ndim: meta.ndim,
                })
            }
            OBJECT_NAME => Some(ColumnKind::OpaqueObject),
            _ => None,
        }
    }

    /// Whether this is one of the tensor encodings.
    pub fn is_tensor(&self) -> bool {
        matches!(
            self,
            ColumnKind::FixedTensor { .. } | ColumnKind::VariableTensor { .. }
        )
    }

    /// Whether this is an extension encoding (tensor or object).
    pub fn is_extension(&self) -> bool {
        self.is_tensor() || matches!(self, ColumnKind::OpaqueObject)
    }

    /// Whether this kind addresses payload bytes through 32-bit offsets and
    /// is therefore subject to the combine ceiling.
    pub fn uses_small_offsets(&self) -> bool {
        matches!(self, ColumnKind::VariableWidth { large: false })
    }
}

/// Human-readable type label used in schema-conflict diagnostics.
pub(crate) fn field_type_label(field: &Field) -> String {
    match ColumnKind::of(field) {
        ColumnKind::FixedTensor { element, shape } => {
            let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("tensor<{element}>[{}]", dims.join(","))
        }
        ColumnKind::VariableTensor { element, ndim } => {
            format!("tensor<{element}>[ndim={ndim}]")
        }
        ColumnKind::OpaqueObject => "object".to_string(),
        _ => field.data_type().to_string(),
    }
}

/// Storage type of the variable-shape tensor encoding.
pub fn variable_tensor_storage(element: &DataType) -> DataType {
    DataType::Struct(Fields::from(vec![
        Field::new(
            "data",
            DataType::List(Arc::new(Field::new("item", element.clone(), true))),
            true,
        ),
        Field::new(
            "shape",
            DataType::List(Arc::new(Field::new("item", DataType::Int64, true))),
            true,
        ),
    ]))
}

fn extension_metadata(name: &str, metadata: String) -> HashMap<String, String> {
    HashMap::from([
        (EXTENSION_NAME_KEY.to_string(), name.to_string()),
        (EXTENSION_METADATA_KEY.to_string(), metadata),
    ])
}

/// Build a fixed-shape tensor field.
pub fn fixed_shape_tensor_field(
    name: impl Into<String>,
    element: DataType,
    shape: &[usize],
) -> Field {
    let size: usize = shape.iter().product();
    let storage = DataType::FixedSizeList(
        Arc::new(Field::new("item", element, true)),
        size as i32,
    );
    let metadata =
        serde_json::to_string(&FixedTensorMetadata { shape: shape.to_vec() }).expect("shape json");
    Field::new(name, storage, true)
        .with_metadata(extension_metadata(FIXED_TENSOR_NAME, metadata))
}

/// Build a variable-shape tensor field.
pub fn variable_shape_tensor_field(
    name: impl Into<String>,
    element: DataType,
    ndim: usize,
) -> Field {
    let metadata =
        serde_json::to_string(&VariableTensorMetadata { ndim }).expect("ndim json");
    Field::new(name, variable_tensor_storage(&element), true)
        .with_metadata(extension_metadata(VARIABLE_TENSOR_NAME, metadata))
}

/// Build an opaque-object field.
pub fn object_field(name: impl Into<String>) -> Field {
    Field::new(name, DataType::LargeBinary, true)
        .with_metadata(extension_metadata(OBJECT_NAME, String::new()))
}

/// Whether a set of tensor occurrences requires the variable-shape encoding:
/// true when any occurrence is already variable-shaped or fixed shapes are
/// not uniform.
pub fn needs_variable_shape(kinds: &[ColumnKind]) -> bool {
    let mut fixed_shape: Option<&[usize]> = None;
    for kind in kinds {
        match kind {
            ColumnKind::VariableTensor { .. } => return true,
            ColumnKind::FixedTensor { shape, .. } => match fixed_shape {
                None => fixed_shape = Some(shape),
                Some(seen) if seen != shape.as_slice() => return true,
                Some(_) => {}
            },
            _ => {}
        }
    }
    false
}

/// Re-encode a fixed-shape tensor fragment in the variable-shape layout,
/// preserving values, order and element validity.
pub fn fixed_to_variable(
    fragment: &ArrayRef,
    shape: &[usize],
    element: &DataType,
) -> Result<ArrayRef> {
    let fixed = fragment
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| {
            CobbleError::type_mismatch("FixedSizeList", fragment.data_type().to_string())
        })?;

    let DataType::Struct(storage_fields) = variable_tensor_storage(element) else {
        unreachable!("variable tensor storage is a struct");
    };
    let data = cast(fragment, storage_fields[0].data_type())?;

    let len = fixed.len();
    let shape_values: Vec<i64> = shape
        .iter()
        .map(|&d| d as i64)
        .cycle()
        .take(shape.len() * len)
        .collect();
    let shape_list = ListArray::new(
        Arc::new(Field::new("item", DataType::Int64, true)),
        OffsetBuffer::from_lengths(std::iter::repeat(shape.len()).take(len)),
        Arc::new(Int64Array::from(shape_values)),
        None,
    );

    let result = StructArray::try_new(
        storage_fields,
        vec![data, Arc::new(shape_list)],
        fixed.nulls().cloned(),
    )?;
    Ok(Arc::new(result))
}

/// Concatenate tensor fragments gathered from several source columns into
/// the fragment list of the unified encoding. Fixed-shape fragments are
/// re-encoded when the unified kind is variable-shaped.
pub fn concat_tensor_fragments(
    sources: &[(ColumnKind, Vec<ArrayRef>)],
    unified: &ColumnKind,
) -> Result<Vec<ArrayRef>> {
    match unified {
        ColumnKind::FixedTensor { shape, .. } => {
            let mut out = Vec::new();
            for (kind, fragments) in sources {
                match kind {
                    ColumnKind::FixedTensor { shape: s, .. } if s == shape => {
                        out.extend(fragments.iter().cloned());
                    }
                    other => {
                        return Err(CobbleError::type_mismatch(
                            format!("{unified:?}"),
                            format!("{other:?}"),
                        ));
                    }
                }
            }
            Ok(out)
        }
        ColumnKind::VariableTensor { element, .. } => {
            let mut out = Vec::new();
            for (kind, fragments) in sources {
                match kind {
                    ColumnKind::FixedTensor { shape, .. } => {
                        for fragment in fragments {
                            out.push(fixed_to_variable(fragment, shape, element)?);
                        }
                    }
                    ColumnKind::VariableTensor { .. } => out.extend(fragments.iter().cloned()),
                    other => {
                        return Err(CobbleError::type_mismatch(
                            format!("{unified:?}"),
                            format!("{other:?}"),
                        ));
                    }
                }
            }
            Ok(out)
        }
        other => Err(CobbleError::invalid_argument(format!(
            "not a tensor kind: {other:?}"
        ))),
    }
}

/// Build an opaque-object fragment from owned scalar values. Nulls stay
/// null; everything else becomes a serialized payload.
pub fn object_fragment_from_values(values: &[ScalarValue]) -> Result<ArrayRef> {
    let payloads = values
        .iter()
        .map(|value| {
            if value.is_null() {
                Ok(None)
            } else {
                serde_json::to_vec(value)
                    .map(Some)
                    .map_err(|e| CobbleError::invalid_argument(format!("payload encoding: {e}")))
            }
        })
        .collect::<Result<Vec<Option<Vec<u8>>>>>()?;
    Ok(Arc::new(LargeBinaryArray::from_iter(payloads)))
}

/// Coerce a non-object fragment into the opaque-object encoding.
pub fn coerce_fragment_to_object(fragment: &ArrayRef) -> Result<ArrayRef> {
    let values = (0..fragment.len())
        .map(|row| ScalarValue::try_from_array(fragment.as_ref(), row))
        .collect::<Result<Vec<_>>>()?;
    object_fragment_from_values(&values)
}
