//! Dialect-neutral bound parameter storage.
//!
//! SQL text built by the value/condition/dialect layers never binds directly
//! to a driver type. Instead every literal is boxed as a [`DynValue`] and
//! collected into a [`ParamList`]; the placeholder text `push` returns
//! already matches the owning dialect's style (`$1`, `$2`, ... for
//! PostgreSQL, `?` repeated for MySQL/SQLite), so builders never renumber by
//! hand. The codec module converts a `ParamList` into the concrete
//! parameter slice each driver crate expects at execute time.

use crate::dialect::PlaceholderStyle;

/// A single dynamically-typed bound value.
///
/// This is intentionally a closed, flat enum (§4.9 "polymorphic value nodes"
/// design note) rather than a boxed `dyn ToSql`: every dialect's codec can
/// match it exhaustively, and it is cheap to clone across batch-context
/// relation queries.
#[derive(Debug, Clone, PartialEq)]
pub enum DynValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    #[cfg(feature = "rust_decimal")]
    Decimal(rust_decimal::Decimal),
    /// A homogeneous array, passed through natively on PostgreSQL and
    /// serialized to JSON text on MySQL/SQLite by the type coder (§4.5).
    Array(Vec<DynValue>),
}

impl DynValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DynValue::Null)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for DynValue {
            fn from(v: $t) -> Self { DynValue::I64(v as i64) }
        })*
    };
}
from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for DynValue {
    fn from(v: bool) -> Self {
        DynValue::Bool(v)
    }
}

impl From<f32> for DynValue {
    fn from(v: f32) -> Self {
        DynValue::F64(v as f64)
    }
}

impl From<f64> for DynValue {
    fn from(v: f64) -> Self {
        DynValue::F64(v)
    }
}

impl From<String> for DynValue {
    fn from(v: String) -> Self {
        DynValue::Text(v)
    }
}

impl From<&str> for DynValue {
    fn from(v: &str) -> Self {
        DynValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for DynValue {
    fn from(v: Vec<u8>) -> Self {
        DynValue::Bytes(v)
    }
}

impl From<serde_json::Value> for DynValue {
    fn from(v: serde_json::Value) -> Self {
        DynValue::Json(v)
    }
}

impl From<uuid::Uuid> for DynValue {
    fn from(v: uuid::Uuid) -> Self {
        DynValue::Uuid(v)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DynValue {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        DynValue::DateTime(v)
    }
}

impl From<chrono::NaiveDate> for DynValue {
    fn from(v: chrono::NaiveDate) -> Self {
        DynValue::Date(v)
    }
}

#[cfg(feature = "rust_decimal")]
impl From<rust_decimal::Decimal> for DynValue {
    fn from(v: rust_decimal::Decimal) -> Self {
        DynValue::Decimal(v)
    }
}

impl<T: Into<DynValue>> From<Option<T>> for DynValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => DynValue::Null,
        }
    }
}

impl<T: Into<DynValue>> From<Vec<T>> for DynValue {
    fn from(v: Vec<T>) -> Self {
        DynValue::Array(v.into_iter().map(Into::into).collect())
    }
}

/// A single bound parameter node, as used by the `Value::Param` variant.
/// Thin wrapper so the value AST can carry a parameter without committing to
/// its position in a `ParamList` yet.
#[derive(Debug, Clone)]
pub struct Param(DynValue);

impl Param {
    pub fn new(value: impl Into<DynValue>) -> Self {
        Param(value.into())
    }

    pub fn into_inner(self) -> DynValue {
        self.0
    }
}

/// An ordered collection of bound parameters, accumulated while compiling a
/// `Value`/`Condition` tree. `push` returns the placeholder text to splice
/// into the SQL fragment at the call site — callers never compute `$N`
/// indices themselves.
#[derive(Debug, Clone)]
pub struct ParamList {
    values: Vec<DynValue>,
    style: PlaceholderStyle,
}

impl Default for ParamList {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamList {
    /// A param list with PostgreSQL's `$N` placeholder style. Most dialect
    /// builders construct their own list with the correct style; this
    /// constructor exists for call sites (and tests) that only need a
    /// generic accumulator.
    pub fn new() -> Self {
        Self::with_style(PlaceholderStyle::DollarNumber)
    }

    pub fn with_style(style: PlaceholderStyle) -> Self {
        Self {
            values: Vec::new(),
            style,
        }
    }

    /// Append a value, returning the placeholder text for this position.
    pub fn push(&mut self, value: DynValue) -> String {
        self.values.push(value);
        match self.style {
            PlaceholderStyle::DollarNumber => format!("${}", self.values.len()),
            PlaceholderStyle::QuestionMark => "?".to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[DynValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<DynValue> {
        self.values
    }

    pub fn extend(&mut self, other: ParamList) {
        self.values.extend(other.values);
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }
}
