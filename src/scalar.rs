//! Owned scalar values extracted from columns.
//!
//! Used for three things: per-row tuple hashing in the hash partitioner,
//! boundary comparison in the sorted-partition locator, and the payload
//! encoding of opaque-object columns.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use arrow::array::{
    Array, BooleanArray, Date32Array, Date64Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, LargeBinaryArray, LargeStringArray, StringArray,
    Time32MillisecondArray, Time32SecondArray, Time64MicrosecondArray, Time64NanosecondArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};

use crate::error::{CobbleError, Result};

/// A single data value lifted out of a column.
///
/// Temporal kinds are carried by their underlying epoch representation, which
/// hashes and orders identically within a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// Null value of unknown type
    Null,
    /// Boolean value
    Boolean(Option<bool>),
    /// 8-bit signed integer
    Int8(Option<i8>),
    /// 16-bit signed integer
    Int16(Option<i16>),
    /// 32-bit signed integer
    Int32(Option<i32>),
    /// 64-bit signed integer
    Int64(Option<i64>),
    /// 8-bit unsigned integer
    UInt8(Option<u8>),
    /// 16-bit unsigned integer
    UInt16(Option<u16>),
    /// 32-bit unsigned integer
    UInt32(Option<u32>),
    /// 64-bit unsigned integer
    UInt64(Option<u64>),
    /// 32-bit floating point
    Float32(Option<f32>),
    /// 64-bit floating point
    Float64(Option<f64>),
    /// UTF-8 string
    Utf8(Option<String>),
    /// Binary data
    Binary(Option<Vec<u8>>),
}

impl ScalarValue {
    /// Extract the value at `row` from an array.
    ///
    /// Fails for types the engine does not hash or compare (nested and
    /// extension-typed values never reach this path).
    pub fn try_from_array(array: &dyn Array, row: usize) -> Result<Self> {
        if row >= array.len() {
            return Err(CobbleError::invalid_argument(format!(
                "row {row} out of bounds for array of length {}",
                array.len()
            )));
        }

        macro_rules! extract {
            ($array_ty:ty, $variant:ident) => {{
                let typed = array.as_any().downcast_ref::<$array_ty>().unwrap();
                if typed.is_null(row) {
                    Ok(ScalarValue::$variant(None))
                } else {
                    Ok(ScalarValue::$variant(Some(typed.value(row).into())))
                }
            }};
        }

        match array.data_type() {
            DataType::Null => Ok(ScalarValue::Null),
            DataType::Boolean => extract!(BooleanArray, Boolean),
            DataType::Int8 => extract!(Int8Array, Int8),
            DataType::Int16 => extract!(Int16Array, Int16),
            DataType::Int32 => extract!(Int32Array, Int32),
            DataType::Int64 => extract!(Int64Array, Int64),
            DataType::UInt8 => extract!(UInt8Array, UInt8),
            DataType::UInt16 => extract!(UInt16Array, UInt16),
            DataType::UInt32 => extract!(UInt32Array, UInt32),
            DataType::UInt64 => extract!(UInt64Array, UInt64),
            DataType::Float32 => extract!(Float32Array, Float32),
            DataType::Float64 => extract!(Float64Array, Float64),
            DataType::Utf8 => extract!(StringArray, Utf8),
            DataType::LargeUtf8 => extract!(LargeStringArray, Utf8),
            DataType::Binary => {
                let typed = array.as_any().downcast_ref::<arrow::array::BinaryArray>().unwrap();
                if typed.is_null(row) {
                    Ok(ScalarValue::Binary(None))
                } else {
                    Ok(ScalarValue::Binary(Some(typed.value(row).to_vec())))
                }
            }
            DataType::LargeBinary => {
                let typed = array.as_any().downcast_ref::<LargeBinaryArray>().unwrap();
                if typed.is_null(row) {
                    Ok(ScalarValue::Binary(None))
                } else {
                    Ok(ScalarValue::Binary(Some(typed.value(row).to_vec())))
                }
            }
            DataType::Date32 => extract!(Date32Array, Int32),
            DataType::Date64 => extract!(Date64Array, Int64),
            DataType::Time32(TimeUnit::Second) => extract!(Time32SecondArray, Int32),
            DataType::Time32(TimeUnit::Millisecond) => extract!(Time32MillisecondArray, Int32),
            DataType::Time64(TimeUnit::Microsecond) => extract!(Time64MicrosecondArray, Int64),
            DataType::Time64(TimeUnit::Nanosecond) => extract!(Time64NanosecondArray, Int64),
            DataType::Timestamp(TimeUnit::Second, _) => extract!(TimestampSecondArray, Int64),
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                extract!(TimestampMillisecondArray, Int64)
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                extract!(TimestampMicrosecondArray, Int64)
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                extract!(TimestampNanosecondArray, Int64)
            }
            other => Err(CobbleError::invalid_argument(format!(
                "unsupported scalar type: {other}"
            ))),
        }
    }

    /// Whether this value is missing.
    pub fn is_null(&self) -> bool {
        match self {
            ScalarValue::Null => true,
            ScalarValue::Boolean(v) => v.is_none(),
            ScalarValue::Int8(v) => v.is_none(),
            ScalarValue::Int16(v) => v.is_none(),
            ScalarValue::Int32(v) => v.is_none(),
            ScalarValue::Int64(v) => v.is_none(),
            ScalarValue::UInt8(v) => v.is_none(),
            ScalarValue::UInt16(v) => v.is_none(),
            ScalarValue::UInt32(v) => v.is_none(),
            ScalarValue::UInt64(v) => v.is_none(),
            ScalarValue::Float32(v) => v.is_none(),
            ScalarValue::Float64(v) => v.is_none(),
            ScalarValue::Utf8(v) => v.is_none(),
            ScalarValue::Binary(v) => v.is_none(),
        }
    }

    /// Whether this value is missing or not-a-number. Both sort after every
    /// real value, under one shared ordering rank.
    pub fn is_null_or_nan(&self) -> bool {
        match self {
            ScalarValue::Float32(Some(v)) => v.is_nan(),
            ScalarValue::Float64(Some(v)) => v.is_nan(),
            other => other.is_null(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int8(Some(v)) => Some(*v as f64),
            ScalarValue::Int16(Some(v)) => Some(*v as f64),
            ScalarValue::Int32(Some(v)) => Some(*v as f64),
            ScalarValue::Int64(Some(v)) => Some(*v as f64),
            ScalarValue::UInt8(Some(v)) => Some(*v as f64),
            ScalarValue::UInt16(Some(v)) => Some(*v as f64),
            ScalarValue::UInt32(Some(v)) => Some(*v as f64),
            ScalarValue::UInt64(Some(v)) => Some(*v as f64),
            ScalarValue::Float32(Some(v)) => Some(*v as f64),
            ScalarValue::Float64(Some(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Compare two real (non-null, non-NaN) values.
///
/// Same-kind values compare natively; numeric values of different kinds
/// compare through `f64`. Anything else is an argument error.
pub(crate) fn compare_real(a: &ScalarValue, b: &ScalarValue) -> Result<Ordering> {
    use ScalarValue::*;

    let ord = match (a, b) {
        (Boolean(Some(x)), Boolean(Some(y))) => x.cmp(y),
        (Int8(Some(x)), Int8(Some(y))) => x.cmp(y),
        (Int16(Some(x)), Int16(Some(y))) => x.cmp(y),
        (Int32(Some(x)), Int32(Some(y))) => x.cmp(y),
        (Int64(Some(x)), Int64(Some(y))) => x.cmp(y),
        (UInt8(Some(x)), UInt8(Some(y))) => x.cmp(y),
        (UInt16(Some(x)), UInt16(Some(y))) => x.cmp(y),
        (UInt32(Some(x)), UInt32(Some(y))) => x.cmp(y),
        (UInt64(Some(x)), UInt64(Some(y))) => x.cmp(y),
        (Utf8(Some(x)), Utf8(Some(y))) => x.cmp(y),
        (Binary(Some(x)), Binary(Some(y))) => x.cmp(y),
        (x, y) => {
            let (Some(xf), Some(yf)) = (x.as_f64(), y.as_f64()) else {
                return Err(CobbleError::invalid_argument(format!(
                    "cannot compare {x:?} with {y:?}"
                )));
            };
            xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
        }
    };
    Ok(ord)
}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use ScalarValue::*;

        // Tag byte keeps (Int64(None), UInt64(None)) and friends distinct.
        match self {
            Null => state.write_u8(0),
            Boolean(v) => {
                state.write_u8(1);
                v.hash(state);
            }
            Int8(v) => {
                state.write_u8(2);
                v.hash(state);
            }
            Int16(v) => {
                state.write_u8(3);
                v.hash(state);
            }
            Int32(v) => {
                state.write_u8(4);
                v.hash(state);
            }
            Int64(v) => {
                state.write_u8(5);
                v.hash(state);
            }
            UInt8(v) => {
                state.write_u8(6);
                v.hash(state);
            }
            UInt16(v) => {
                state.write_u8(7);
                v.hash(state);
            }
            UInt32(v) => {
                state.write_u8(8);
                v.hash(state);
            }
            UInt64(v) => {
                state.write_u8(9);
                v.hash(state);
            }
            Float32(v) => {
                state.write_u8(10);
                v.map(f32::to_bits).hash(state);
            }
            Float64(v) => {
                state.write_u8(11);
                v.map(f64::to_bits).hash(state);
            }
            Utf8(v) => {
                state.write_u8(12);
                v.hash(state);
            }
            Binary(v) => {
                state.write_u8(13);
                v.hash(state);
            }
        }
    }
}
