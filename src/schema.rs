//! Schema unification across heterogeneous blocks.
//!
//! Given the schemas of independently produced blocks, compute one schema
//! every block can be coerced to: tensor columns are promoted to the
//! variable-shape encoding when shapes vary or occurrences are missing,
//! object columns absorb everything they meet, struct columns unify to the
//! union of their fields, null-typed list placeholders take the first
//! concrete type observed, and the remaining columns go through a field-wise
//! merge with optional numeric/size widening.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tracing::error;

use crate::error::{CobbleError, Result};
use crate::extension::{
    field_type_label, needs_variable_shape, object_field, variable_shape_tensor_field, ColumnKind,
};

/// Replacement type (and extension metadata) for one column, applied to every
/// schema where the column occurs before the final merge.
struct FieldOverride {
    data_type: DataType,
    metadata: HashMap<String, String>,
}

impl FieldOverride {
    fn from_field(field: &Field) -> Self {
        Self {
            data_type: field.data_type().clone(),
            metadata: field.metadata().clone(),
        }
    }

    fn apply(&self, original: &Field) -> Field {
        Field::new(
            original.name(),
            self.data_type.clone(),
            original.is_nullable(),
        )
        .with_metadata(self.metadata.clone())
    }
}

pub(crate) fn is_null_list(data_type: &DataType) -> bool {
    matches!(data_type, DataType::List(item) if item.data_type() == &DataType::Null)
}

/// Compute the unified schema for a set of input schemas.
///
/// `promote_types` selects the merge mode for columns without special
/// handling: `false` restricts reconciliation to nullability changes,
/// `true` additionally allows numeric and size widening.
///
/// Fails with [`CobbleError::SchemaConflict`] naming the offending column
/// when types cannot be reconciled, and with
/// [`CobbleError::InvalidArgument`] on duplicate field names.
pub fn unify_schemas(schemas: &[SchemaRef], promote_types: bool) -> Result<SchemaRef> {
    if schemas.is_empty() {
        return Err(CobbleError::invalid_argument(
            "at least one schema is required",
        ));
    }

    // Column names in first-seen order, plus the null-list placeholder
    // rollup. Duplicate names within one schema are rejected outright.
    let mut all_columns: Vec<String> = Vec::new();
    let mut seen_columns: HashSet<String> = HashSet::new();
    let mut cols_with_null_list: HashSet<String> = HashSet::new();
    for schema in schemas {
        let mut names_in_schema = HashSet::new();
        for field in schema.fields() {
            if !names_in_schema.insert(field.name()) {
                return Err(CobbleError::invalid_argument(format!(
                    "schema has multiple fields with the same name: {}",
                    field.name()
                )));
            }
            if is_null_list(field.data_type()) {
                cols_with_null_list.insert(field.name().clone());
            }
            if seen_columns.insert(field.name().clone()) {
                all_columns.push(field.name().clone());
            }
        }
    }

    // Roll up which columns carry tensors, objects and structs anywhere.
    let mut columns_with_objects = HashSet::new();
    let mut columns_with_tensors = HashSet::new();
    let mut columns_with_structs = HashSet::new();
    for name in &all_columns {
        for schema in schemas {
            let Some((_, field)) = schema.fields().find(name) else {
                continue;
            };
            match ColumnKind::of(field) {
                ColumnKind::OpaqueObject => {
                    columns_with_objects.insert(name.clone());
                }
                kind if kind.is_tensor() => {
                    columns_with_tensors.insert(name.clone());
                }
                ColumnKind::Struct => {
                    columns_with_structs.insert(name.clone());
                }
                _ => {}
            }
        }
    }

    for name in columns_with_objects.intersection(&columns_with_tensors) {
        return Err(CobbleError::schema_conflict(
            name.clone(),
            observed_types(schemas, name),
        ));
    }

    let mut overrides: HashMap<String, FieldOverride> = HashMap::new();

    for name in &all_columns {
        if !columns_with_tensors.contains(name) {
            continue;
        }
        let tensor_kinds: Vec<ColumnKind> = schemas
            .iter()
            .filter_map(|s| s.fields().find(name))
            .map(|(_, f)| ColumnKind::of(f))
            .filter(|k| k.is_tensor())
            .collect();

        // A schema missing the column (or carrying it as a non-tensor)
        // forces the variable-shape encoding: the gaps backfill as nulls and
        // the fixed layout cannot represent them alongside real elements.
        let has_missing_fields = tensor_kinds.len() < schemas.len();

        if needs_variable_shape(&tensor_kinds) || has_missing_fields {
            let proto = match &tensor_kinds[0] {
                ColumnKind::VariableTensor { element, ndim } => {
                    variable_shape_tensor_field(name.clone(), element.clone(), *ndim)
                }
                ColumnKind::FixedTensor { element, shape } => {
                    variable_shape_tensor_field(name.clone(), element.clone(), shape.len())
                }
                _ => unreachable!("filtered to tensor kinds"),
            };
            overrides.insert(name.clone(), FieldOverride::from_field(&proto));
        }
    }

    for name in &all_columns {
        if columns_with_objects.contains(name) {
            let proto = object_field(name.clone());
            overrides.insert(name.clone(), FieldOverride::from_field(&proto));
        }
    }

    for name in &all_columns {
        if !columns_with_structs.contains(name) {
            continue;
        }
        // Recursively unify the per-schema field lists, treating non-struct
        // or absent occurrences as empty structs.
        let struct_schemas: Vec<SchemaRef> = schemas
            .iter()
            .map(|s| match s.fields().find(name) {
                Some((_, field)) => match field.data_type() {
                    DataType::Struct(fields) => Arc::new(Schema::new(fields.clone())),
                    _ => Arc::new(Schema::empty()),
                },
                None => Arc::new(Schema::empty()),
            })
            .collect();

        let unified_struct = unify_schemas(&struct_schemas, promote_types)?;
        overrides.insert(
            name.clone(),
            FieldOverride {
                data_type: DataType::Struct(unified_struct.fields().clone()),
                metadata: HashMap::new(),
            },
        );
    }

    // Opaque null-typed lists take the first concrete type found.
    for name in &cols_with_null_list {
        for schema in schemas {
            if let Some((_, field)) = schema.fields().find(name) {
                if !is_null_list(field.data_type()) {
                    overrides.insert(name.clone(), FieldOverride::from_field(field));
                    break;
                }
            }
        }
    }

    let schemas_to_unify: Vec<SchemaRef> = if overrides.is_empty() {
        schemas.to_vec()
    } else {
        schemas
            .iter()
            .map(|schema| {
                let fields: Vec<Field> = schema
                    .fields()
                    .iter()
                    .map(|field| match overrides.get(field.name()) {
                        Some(over) => over.apply(field),
                        None => Field::clone(field),
                    })
                    .collect();
                Arc::new(Schema::new(fields))
            })
            .collect()
    };

    match merge_schemas(&schemas_to_unify, promote_types) {
        Ok(schema) => Ok(Arc::new(schema)),
        Err(err) => {
            let rendered: Vec<String> = schemas_to_unify.iter().map(|s| format!("{s:?}")).collect();
            let rendered = rendered.join("\n-----\n");
            error!(schemas = %rendered, %err, "failed to unify schemas");
            Err(err)
        }
    }
}

/// Field-wise schema merge: first-seen column order, per-column type
/// reconciliation per `promote_types`.
fn merge_schemas(schemas: &[SchemaRef], promote_types: bool) -> Result<Schema> {
    let mut fields: Vec<Field> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for schema in schemas {
        for field in schema.fields() {
            match index.get(field.name()) {
                None => {
                    index.insert(field.name().clone(), fields.len());
                    fields.push(Field::clone(field));
                }
                Some(&at) => {
                    fields[at] = merge_field(&fields[at], field, promote_types)?;
                }
            }
        }
    }

    Ok(Schema::new(fields))
}

fn merge_field(existing: &Field, incoming: &Field, promote_types: bool) -> Result<Field> {
    let nullable = existing.is_nullable() || incoming.is_nullable();

    if existing.data_type() == incoming.data_type() {
        return Ok(existing.clone().with_nullable(nullable));
    }
    // A null type reconciles with any type; the column just gains nulls.
    if existing.data_type() == &DataType::Null {
        return Ok(incoming.clone().with_nullable(true));
    }
    if incoming.data_type() == &DataType::Null {
        return Ok(existing.clone().with_nullable(true));
    }

    if promote_types {
        if let Some(widened) = promote(existing.data_type(), incoming.data_type()) {
            return Ok(Field::new(existing.name(), widened, nullable));
        }
    }

    Err(CobbleError::schema_conflict(
        existing.name().clone(),
        vec![field_type_label(existing), field_type_label(incoming)],
    ))
}

fn integer_width(data_type: &DataType) -> Option<(u8, bool)> {
    match data_type {
        DataType::Int8 => Some((8, true)),
        DataType::Int16 => Some((16, true)),
        DataType::Int32 => Some((32, true)),
        DataType::Int64 => Some((64, true)),
        DataType::UInt8 => Some((8, false)),
        DataType::UInt16 => Some((16, false)),
        DataType::UInt32 => Some((32, false)),
        DataType::UInt64 => Some((64, false)),
        _ => None,
    }
}

fn signed_of_width(width: u8) -> DataType {
    match width {
        8 => DataType::Int8,
        16 => DataType::Int16,
        32 => DataType::Int32,
        _ => DataType::Int64,
    }
}

fn unsigned_of_width(width: u8) -> DataType {
    match width {
        8 => DataType::UInt8,
        16 => DataType::UInt16,
        32 => DataType::UInt32,
        _ => DataType::UInt64,
    }
}

/// Widening promotion for the permissive merge mode. Returns `None` when the
/// pair has no common widened type.
fn promote(a: &DataType, b: &DataType) -> Option<DataType> {
    use DataType::*;

    // Float beats integer; Float64 beats Float32; a Float32 only survives
    // against integers it can represent exactly.
    let is_float = |t: &DataType| matches!(t, Float32 | Float64);
    if is_float(a) || is_float(b) {
        let (float, other) = if is_float(a) { (a, b) } else { (b, a) };
        return match other {
            Float32 | Float64 => Some(Float64),
            _ => {
                let (width, _) = integer_width(other)?;
                if float == &Float32 && width <= 16 {
                    Some(Float32)
                } else {
                    Some(Float64)
                }
            }
        };
    }

    if let (Some((wa, sa)), Some((wb, sb))) = (integer_width(a), integer_width(b)) {
        return match (sa, sb) {
            (true, true) => Some(signed_of_width(wa.max(wb))),
            (false, false) => Some(unsigned_of_width(wa.max(wb))),
            _ => {
                let (signed_width, unsigned_width) = if sa { (wa, wb) } else { (wb, wa) };
                let needed = signed_width.max(unsigned_width * 2);
                if unsigned_width >= 64 {
                    // No signed integer holds the full u64 range.
                    Some(Float64)
                } else {
                    Some(signed_of_width(needed))
                }
            }
        };
    }

    match (a, b) {
        (Utf8, LargeUtf8) | (LargeUtf8, Utf8) => Some(LargeUtf8),
        (Binary, LargeBinary) | (LargeBinary, Binary) => Some(LargeBinary),
        (List(ia), List(ib)) => {
            let item = merge_field(ia, ib, true).ok()?;
            Some(List(Arc::new(item)))
        }
        (List(ia), LargeList(ib)) | (LargeList(ia), List(ib)) | (LargeList(ia), LargeList(ib)) => {
            let item = merge_field(ia, ib, true).ok()?;
            Some(LargeList(Arc::new(item)))
        }
        _ => None,
    }
}

fn observed_types(schemas: &[SchemaRef], name: &str) -> Vec<String> {
    schemas
        .iter()
        .filter_map(|s| s.fields().find(name))
        .map(|(_, f)| field_type_label(f))
        .collect()
}
