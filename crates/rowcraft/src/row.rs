//! Row mapping: a dialect-neutral [`Row`] wrapper and the [`FromRow`]/
//! [`RowExt`] traits used to map it into caller structs.
//!
//! Each driver decodes its native row type into `Row` (an ordered
//! `(column, DynValue)` list) via `codec.rs` before handing it to model
//! deserialization, so `#[derive(FromRow)]` never needs to know which
//! dialect produced the row.

use crate::error::{OrmError, OrmResult};
use crate::param::DynValue;

/// A single fetched row, decoded into dialect-neutral values.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<(String, DynValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, DynValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&DynValue> {
        self.columns.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }
}

/// Convert a database row into a Rust struct. Typically derived with
/// `#[derive(FromRow)]` from `rowcraft-derive`.
///
/// ```ignore
/// use rowcraft::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     username: String,
///     email: Option<String>,
/// }
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> OrmResult<Self>;
}

/// Typed column access, with conversions from the closed `DynValue` set.
pub trait RowExt {
    fn try_get_column<T: FromDynValue>(&self, column: &str) -> OrmResult<T>;
}

impl RowExt for Row {
    fn try_get_column<T: FromDynValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column not present in row"))?;
        T::from_dyn_value(value).ok_or_else(|| OrmError::decode(column, "type mismatch"))
    }
}

/// Narrow a [`DynValue`] into a concrete Rust type. Implemented for the
/// scalar types the type coder produces; `Option<T>` maps `Null` to `None`.
pub trait FromDynValue: Sized {
    fn from_dyn_value(value: &DynValue) -> Option<Self>;
}

impl FromDynValue for bool {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Bool(b) => Some(*b),
            DynValue::I64(n) => Some(*n != 0),
            _ => None,
        }
    }
}

macro_rules! from_dyn_int {
    ($($t:ty),*) => {
        $(impl FromDynValue for $t {
            fn from_dyn_value(value: &DynValue) -> Option<Self> {
                match value {
                    DynValue::I64(n) => (*n).try_into().ok(),
                    _ => None,
                }
            }
        })*
    };
}
from_dyn_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromDynValue for f32 {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::F64(f) => Some(*f as f32),
            _ => None,
        }
    }
}

impl FromDynValue for f64 {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::F64(f) => Some(*f),
            _ => None,
        }
    }
}

impl FromDynValue for String {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromDynValue for Vec<u8> {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromDynValue for serde_json::Value {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Json(j) => Some(j.clone()),
            DynValue::Text(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }
}

impl FromDynValue for uuid::Uuid {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Uuid(u) => Some(*u),
            DynValue::Text(s) => uuid::Uuid::parse_str(s).ok(),
            _ => None,
        }
    }
}

impl FromDynValue for chrono::DateTime<chrono::Utc> {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::DateTime(dt) => Some(*dt),
            DynValue::Text(s) => crate::codec::parse_datetime_text(s).into_datetime(),
            _ => None,
        }
    }
}

impl FromDynValue for chrono::NaiveDate {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

#[cfg(feature = "rust_decimal")]
impl FromDynValue for rust_decimal::Decimal {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Decimal(d) => Some(*d),
            DynValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl<T: FromDynValue> FromDynValue for Option<T> {
    fn from_dyn_value(value: &DynValue) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_dyn_value(value).map(Some)
        }
    }
}

impl DynValue {
    fn into_datetime(self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            DynValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_is_decode_error() {
        let row = Row::new(vec![("id".into(), DynValue::I64(1))]);
        let result: OrmResult<String> = row.try_get_column("missing");
        assert!(result.is_err());
    }

    #[test]
    fn optional_column_maps_null_to_none() {
        let row = Row::new(vec![("email".into(), DynValue::Null)]);
        let value: Option<String> = row.try_get_column("email").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn present_column_decodes() {
        let row = Row::new(vec![("name".into(), DynValue::Text("ada".into()))]);
        let value: String = row.try_get_column("name").unwrap();
        assert_eq!(value, "ada");
    }
}
