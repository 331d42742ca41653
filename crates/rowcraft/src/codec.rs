//! Type Coder (§4.5): per-driver serialization of the dialect-neutral
//! [`DynValue`] into each driver crate's native bind type, and back again
//! when decoding rows.
//!
//! Rules carried from the spec:
//! - Scalars pass through; booleans become `0`/`1` on SQLite (MySQL's
//!   client accepts native booleans).
//! - Arrays pass through natively on PostgreSQL; MySQL/SQLite round-trip
//!   through JSON text.
//! - JSON serializes/deserializes through `serde_json::Value`.
//! - UUID is identity at the language level; the `::uuid` cast is
//!   PostgreSQL-only and lives in the dialect's cast formatter, not here.
//! - A cast/decode failure on a single column produces `null` rather than
//!   propagating — a malformed row must not block the rest of a batch
//!   (§7.4).

use crate::param::DynValue;

/// Encode a `DynValue` array to the JSON-text form MySQL/SQLite use in place
/// of a native array type.
pub fn array_to_json_text(values: &[DynValue]) -> String {
    serde_json::Value::Array(values.iter().map(dyn_value_to_json).collect()).to_string()
}

pub fn dyn_value_to_json(value: &DynValue) -> serde_json::Value {
    match value {
        DynValue::Null => serde_json::Value::Null,
        DynValue::Bool(b) => serde_json::Value::Bool(*b),
        DynValue::I64(n) => serde_json::Value::Number((*n).into()),
        DynValue::F64(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        DynValue::Text(s) => serde_json::Value::String(s.clone()),
        DynValue::Bytes(b) => serde_json::Value::String(hex_encode(b)),
        DynValue::Json(j) => j.clone(),
        DynValue::Uuid(u) => serde_json::Value::String(u.to_string()),
        DynValue::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        DynValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        #[cfg(feature = "rust_decimal")]
        DynValue::Decimal(d) => serde_json::Value::String(d.to_string()),
        DynValue::Array(items) => serde_json::Value::Array(items.iter().map(dyn_value_to_json).collect()),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// ISO-8601 serialization used for SQLite date/time columns, which have no
/// native temporal type.
pub fn datetime_to_sqlite_text(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a SQLite/MySQL-stored ISO-8601 timestamp back to a `DynValue`,
/// returning `DynValue::Null` (not an error) on malformed input per the
/// type-coder's never-propagate-decode-failures rule.
pub fn parse_datetime_text(text: &str) -> DynValue {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| DynValue::DateTime(dt.with_timezone(&chrono::Utc)))
        .unwrap_or(DynValue::Null)
}

/// Encode a boolean the way SQLite/MySQL's text protocol expects it: `0`/`1`
/// rather than a native boolean literal.
pub fn bool_to_int(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

#[cfg(feature = "postgres")]
pub mod postgres {
    use super::*;
    use tokio_postgres::types::{ToSql, Type};

    /// Render a `DynValue` as a boxed `ToSql` for `tokio_postgres`. Arrays
    /// pass through as native Postgres arrays (the driver matches element
    /// type at bind time via the target column's type, so no element
    /// coercion happens here beyond recursing into the element encoder).
    pub fn to_sql(value: &DynValue) -> Box<dyn ToSql + Sync + Send> {
        match value {
            DynValue::Null => Box::new(Option::<i32>::None),
            DynValue::Bool(b) => Box::new(*b),
            DynValue::I64(n) => Box::new(*n),
            DynValue::F64(f) => Box::new(*f),
            DynValue::Text(s) => Box::new(s.clone()),
            DynValue::Bytes(b) => Box::new(b.clone()),
            DynValue::Json(j) => Box::new(j.clone()),
            DynValue::Uuid(u) => Box::new(*u),
            DynValue::DateTime(dt) => Box::new(*dt),
            DynValue::Date(d) => Box::new(*d),
            #[cfg(feature = "rust_decimal")]
            DynValue::Decimal(d) => Box::new(*d),
            DynValue::Array(items) => Box::new(array_to_typed_vec(items)),
        }
    }

    /// Arrays are boxed as `Vec<DynValue>`-derived homogeneous Rust vectors.
    /// Since `ToSql` requires a concrete element type, we route the common
    /// cases explicitly and fall back to text for anything else (mirroring
    /// the type coder's "pass through scalars" rule applied element-wise).
    fn array_to_typed_vec(items: &[DynValue]) -> Vec<String> {
        items
            .iter()
            .map(|v| match v {
                DynValue::Text(s) => s.clone(),
                other => dyn_value_to_json(other).to_string(),
            })
            .collect()
    }

    /// Best-effort decode of a Postgres column into a `DynValue`, given the
    /// driver's reported `Type`. Unsupported or malformed columns decode to
    /// `Null` rather than erroring (§7.4).
    pub fn from_row_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> DynValue {
        use tokio_postgres::types::Type as T;
        match *ty {
            T::BOOL => row.try_get::<_, Option<bool>>(idx).ok().flatten().map(DynValue::Bool),
            T::INT2 | T::INT4 => row.try_get::<_, Option<i32>>(idx).ok().flatten().map(|v| DynValue::I64(v as i64)),
            T::INT8 => row.try_get::<_, Option<i64>>(idx).ok().flatten().map(DynValue::I64),
            T::FLOAT4 => row.try_get::<_, Option<f32>>(idx).ok().flatten().map(|v| DynValue::F64(v as f64)),
            T::FLOAT8 => row.try_get::<_, Option<f64>>(idx).ok().flatten().map(DynValue::F64),
            T::TEXT | T::VARCHAR | T::BPCHAR => {
                row.try_get::<_, Option<String>>(idx).ok().flatten().map(DynValue::Text)
            }
            T::JSON | T::JSONB => row
                .try_get::<_, Option<serde_json::Value>>(idx)
                .ok()
                .flatten()
                .map(DynValue::Json),
            T::UUID => row.try_get::<_, Option<uuid::Uuid>>(idx).ok().flatten().map(DynValue::Uuid),
            T::TIMESTAMPTZ => row
                .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                .ok()
                .flatten()
                .map(DynValue::DateTime),
            T::DATE => row.try_get::<_, Option<chrono::NaiveDate>>(idx).ok().flatten().map(DynValue::Date),
            _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(DynValue::Text),
        }
        .unwrap_or(DynValue::Null)
    }
}

#[cfg(feature = "mysql")]
pub mod mysql {
    use super::*;
    use mysql_async::Value as MyValue;

    pub fn to_value(value: &DynValue) -> MyValue {
        match value {
            DynValue::Null => MyValue::NULL,
            DynValue::Bool(b) => MyValue::Int(bool_to_int(*b)),
            DynValue::I64(n) => MyValue::Int(*n),
            DynValue::F64(f) => MyValue::Double(*f),
            DynValue::Text(s) => MyValue::Bytes(s.clone().into_bytes()),
            DynValue::Bytes(b) => MyValue::Bytes(b.clone()),
            DynValue::Json(j) => MyValue::Bytes(j.to_string().into_bytes()),
            DynValue::Uuid(u) => MyValue::Bytes(u.to_string().into_bytes()),
            DynValue::DateTime(dt) => MyValue::Bytes(dt.to_rfc3339().into_bytes()),
            DynValue::Date(d) => MyValue::Bytes(d.format("%Y-%m-%d").to_string().into_bytes()),
            #[cfg(feature = "rust_decimal")]
            DynValue::Decimal(d) => MyValue::Bytes(d.to_string().into_bytes()),
            DynValue::Array(items) => MyValue::Bytes(array_to_json_text(items).into_bytes()),
        }
    }

    pub fn from_value(value: MyValue) -> DynValue {
        match value {
            MyValue::NULL => DynValue::Null,
            MyValue::Int(n) => DynValue::I64(n),
            MyValue::UInt(n) => DynValue::I64(n as i64),
            MyValue::Float(f) => DynValue::F64(f as f64),
            MyValue::Double(f) => DynValue::F64(f),
            MyValue::Bytes(b) => String::from_utf8(b)
                .map(DynValue::Text)
                .unwrap_or(DynValue::Null),
            MyValue::Date(y, mo, d, h, mi, s, micro) => DynValue::Text(format!(
                "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{micro:06}"
            )),
            MyValue::Time(neg, d, h, mi, s, micro) => DynValue::Text(format!(
                "{}{d}d {h:02}:{mi:02}:{s:02}.{micro:06}",
                if neg { "-" } else { "" }
            )),
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    use super::*;
    use rusqlite::types::{Value as SqValue, ValueRef};

    pub fn to_value(value: &DynValue) -> SqValue {
        match value {
            DynValue::Null => SqValue::Null,
            DynValue::Bool(b) => SqValue::Integer(bool_to_int(*b)),
            DynValue::I64(n) => SqValue::Integer(*n),
            DynValue::F64(f) => SqValue::Real(*f),
            DynValue::Text(s) => SqValue::Text(s.clone()),
            DynValue::Bytes(b) => SqValue::Blob(b.clone()),
            DynValue::Json(j) => SqValue::Text(j.to_string()),
            DynValue::Uuid(u) => SqValue::Text(u.to_string()),
            DynValue::DateTime(dt) => SqValue::Text(datetime_to_sqlite_text(dt)),
            DynValue::Date(d) => SqValue::Text(d.format("%Y-%m-%d").to_string()),
            #[cfg(feature = "rust_decimal")]
            DynValue::Decimal(d) => SqValue::Text(d.to_string()),
            DynValue::Array(items) => SqValue::Text(array_to_json_text(items)),
        }
    }

    pub fn from_value_ref(value: ValueRef<'_>) -> DynValue {
        match value {
            ValueRef::Null => DynValue::Null,
            ValueRef::Integer(n) => DynValue::I64(n),
            ValueRef::Real(f) => DynValue::F64(f),
            ValueRef::Text(t) => String::from_utf8(t.to_vec())
                .map(DynValue::Text)
                .unwrap_or(DynValue::Null),
            ValueRef::Blob(b) => DynValue::Bytes(b.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_json_round_trip_shape() {
        let json = array_to_json_text(&[DynValue::I64(1), DynValue::I64(2)]);
        assert_eq!(json, "[1,2]");
    }

    #[test]
    fn bool_to_int_matches_sqlite_mysql_encoding() {
        assert_eq!(bool_to_int(true), 1);
        assert_eq!(bool_to_int(false), 0);
    }

    #[test]
    fn malformed_datetime_decodes_to_null_not_error() {
        assert!(matches!(parse_datetime_text("not-a-date"), DynValue::Null));
    }
}
