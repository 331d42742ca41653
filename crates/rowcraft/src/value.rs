//! Value AST: the tagged node tree that compiles a single positional value,
//! array, cast, or correlated fragment into SQL text plus bound parameters.
//!
//! Every variant appends zero or more parameters to the `ParamList` it is
//! given and returns the SQL fragment that should appear at the node's
//! position. Compilation is key-aware: the caller passes the column name
//! the value is being compared against (when there is one), and a node
//! decides for itself whether that key belongs on the left-hand side of the
//! fragment it emits (`Param` does; `Dynamic` and `Raw` do not).

use crate::dialect::{CastFormatter, Dialect};
use crate::param::{DynValue, Param, ParamList};

/// Sentinel that removes the entry it appears in from a condition or update
/// value list. See the `SKIP idempotence` property: `(col, SKIP)` compiles
/// identically to omitting the entry outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skip;

/// A single bound SQL type annotation, used by `Cast`/`CastArray` to select
/// the dialect cast suffix (`::int`, `::text[]`, ...). PostgreSQL is the only
/// dialect whose cast formatter is non-identity, but the type name is kept
/// dialect-neutral here; each `Dialect::cast_formatter` decides what (if
/// anything) to do with it.
pub type SqlType = &'static str;

/// Gives a Rust type its PostgreSQL array element cast (`int4`, `my_enum`,
/// `my_composite`, ...), so batch `INSERT ... FROM UNNEST(...)` and batch
/// `UPDATE ... FROM UNNEST(...)` can render `$N::<elem>[]` for columns whose
/// element type isn't one of the built-in scalars. `#[derive(PgEnum)]` and
/// `#[derive(PgComposite)]` implement this automatically; built-in scalar
/// types get a blanket impl below.
pub trait PgType {
    /// The PostgreSQL array type name for `Vec<Self>`, e.g. `"int4[]"`.
    fn pg_array_type() -> &'static str;
}

macro_rules! impl_pg_type_scalar {
    ($($ty:ty => $arr:literal),* $(,)?) => {
        $(
            impl PgType for $ty {
                fn pg_array_type() -> &'static str {
                    $arr
                }
            }
        )*
    };
}

impl_pg_type_scalar! {
    i16 => "int2[]",
    i32 => "int4[]",
    i64 => "int8[]",
    f32 => "float4[]",
    f64 => "float8[]",
    bool => "bool[]",
    String => "text[]",
    Vec<u8> => "bytea[]",
    uuid::Uuid => "uuid[]",
    chrono::NaiveDate => "date[]",
    chrono::NaiveDateTime => "timestamp[]",
    chrono::DateTime<chrono::Utc> => "timestamptz[]",
    serde_json::Value => "jsonb[]",
}

impl<T: PgType> PgType for Option<T> {
    fn pg_array_type() -> &'static str {
        T::pg_array_type()
    }
}

/// Either a single value or a skip marker, used anywhere the spec allows a
/// slot to be silently dropped (update value lists, positional condition
/// values).
#[derive(Debug, Clone)]
pub enum Skippable<T> {
    Value(T),
    Skip,
}

impl<T> Skippable<T> {
    pub fn is_skip(&self) -> bool {
        matches!(self, Skippable::Skip)
    }
}

impl<T> From<T> for Skippable<T> {
    fn from(v: T) -> Self {
        Skippable::Value(v)
    }
}

/// The tagged value/token tree described in §4.1.
#[derive(Debug, Clone)]
pub enum Value {
    /// A single bound parameter. Renders as the key-qualified comparison
    /// (`key = ?`) when a key is present, otherwise a bare `?`.
    Param(Param),

    /// A literal SQL fragment that is itself a complete scalar expression
    /// (e.g. `DEFAULT`, `now()`). No parameter is appended.
    Immediate(String),

    /// An arbitrary raw SQL fragment, rendered byte-for-byte with no bound
    /// parameter. Unlike `Immediate` this may be any fragment, not just a
    /// scalar.
    Raw(String),

    /// `key IS NULL`.
    Null,

    /// `key IS NOT NULL`.
    NotNull,

    /// `key = ?` with a bound boolean, rendered through the dialect's
    /// boolean encoding (native bool for Postgres, 0/1 elsewhere is handled
    /// by the type coder before this point — this variant simply carries a
    /// `bool` parameter and lets `Param` compile it).
    Bool(bool),

    /// An IN-list. Empty compiles to `1 = 0` (or bare `1 = 0` with no key)
    /// and appends no parameters — the stable falsy form for empty IN.
    Array(Vec<DynValue>),

    /// Same as `Array` but each element is cast with `sql_type` via the
    /// dialect cast formatter, and the whole list form uses `IN (...)`.
    CastArray(Vec<DynValue>, SqlType),

    /// `<key> <op> fmt("?", t)`: a single cast value.
    Cast(DynValue, SqlType),

    /// `(c1, c2, ...) IN ((?, ?, ...), ...)`. Empty tuple list compiles to
    /// `1 = 0`.
    TupleIn(Vec<String>, Vec<Vec<DynValue>>),

    /// A pre-rendered fragment with its own embedded placeholders, plus the
    /// values to bind to them in order. Used for expressions the value AST
    /// has no dedicated variant for (function calls, dialect-specific
    /// operators). `<key> <op> f` is NOT implied: the fragment is emitted
    /// verbatim after appending `values`.
    Dynamic(String, Vec<DynValue>),

    /// `<table>.<column>`, no parameter — enables correlated subqueries to
    /// reference the outer query's row.
    ParentRef { table: String, column: String },

    /// `([pcols]) <IN|NOT IN> (SELECT <scols> FROM <target>[ WHERE <cond>])`.
    Subquery {
        parent_columns: Vec<String>,
        target_table: String,
        select_columns: Vec<String>,
        condition_sql: Option<String>,
        condition_params: Vec<DynValue>,
        negated: bool,
    },

    /// `[NOT ]EXISTS (SELECT 1 FROM <table>[ WHERE <cond>])`.
    Exists {
        table: String,
        condition_sql: Option<String>,
        condition_params: Vec<DynValue>,
        negated: bool,
    },

    /// A value that must pass through to the driver without type coding
    /// (e.g. a database-native token already encoded by the caller).
    DBToken(DynValue),
}

impl Value {
    pub fn param(v: impl Into<DynValue>) -> Self {
        Value::Param(Param::new(v.into()))
    }

    pub fn array(values: impl IntoIterator<Item = impl Into<DynValue>>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }

    /// Compile this node, appending parameters to `params` and returning the
    /// SQL fragment. `key` is the column name this value is compared
    /// against, when the surrounding condition entry has one (a positional
    /// `(Column, Value)` entry); it is `None` for value-only contexts such
    /// as update SET lists where the column has already been rendered by
    /// the caller, or for positional condition slots with no column.
    pub fn compile(&self, params: &mut ParamList, key: Option<&str>, dialect: &dyn Dialect) -> String {
        let op_key = |op: &str| match key {
            Some(k) => format!("{} {op} ", dialect.quote_identifier(k)),
            None => String::new(),
        };

        match self {
            Value::Param(p) => {
                let ph = params.push(p.clone().into_inner());
                format!("{}{}", op_key("="), ph)
            }
            Value::Immediate(sql) | Value::Raw(sql) => sql.clone(),
            Value::Null => format!("{}IS NULL", op_key("")).trim_end().to_string(),
            Value::NotNull => format!("{}IS NOT NULL", op_key("")).trim_end().to_string(),
            Value::Bool(b) => {
                let ph = params.push(DynValue::Bool(*b));
                format!("{}{}", op_key("="), ph)
            }
            Value::Array(values) => {
                if values.is_empty() {
                    return "1 = 0".to_string();
                }
                let placeholders: Vec<String> =
                    values.iter().cloned().map(|v| params.push(v)).collect();
                match key {
                    Some(k) => format!(
                        "{} IN ({})",
                        dialect.quote_identifier(k),
                        placeholders.join(", ")
                    ),
                    None => format!("({})", placeholders.join(", ")),
                }
            }
            Value::CastArray(values, ty) => {
                if values.is_empty() {
                    return "1 = 0".to_string();
                }
                let fmt: CastFormatter = dialect.cast_formatter();
                let placeholders: Vec<String> = values
                    .iter()
                    .cloned()
                    .map(|v| {
                        let ph = params.push(v);
                        fmt(&ph, ty)
                    })
                    .collect();
                match key {
                    Some(k) => format!(
                        "{} IN ({})",
                        dialect.quote_identifier(k),
                        placeholders.join(", ")
                    ),
                    None => format!("({})", placeholders.join(", ")),
                }
            }
            Value::Cast(v, ty) => {
                let ph = params.push(v.clone());
                let fmt = dialect.cast_formatter();
                format!("{}{}", op_key("="), fmt(&ph, ty))
            }
            Value::TupleIn(cols, tuples) => {
                if tuples.is_empty() {
                    return "1 = 0".to_string();
                }
                let lhs = cols
                    .iter()
                    .map(|c| dialect.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                let rows: Vec<String> = tuples
                    .iter()
                    .map(|tuple| {
                        let ph: Vec<String> =
                            tuple.iter().cloned().map(|v| params.push(v)).collect();
                        format!("({})", ph.join(", "))
                    })
                    .collect();
                format!("({lhs}) IN ({})", rows.join(", "))
            }
            Value::Dynamic(fragment, values) => {
                for v in values {
                    params.push(v.clone());
                }
                fragment.clone()
            }
            Value::ParentRef { table, column } => format!(
                "{}.{}",
                dialect.quote_identifier(table),
                dialect.quote_identifier(column)
            ),
            Value::Subquery {
                parent_columns,
                target_table,
                select_columns,
                condition_sql,
                condition_params,
                negated,
            } => {
                for v in condition_params {
                    params.push(v.clone());
                }
                let lhs = if parent_columns.len() == 1 {
                    dialect.quote_identifier(&parent_columns[0])
                } else {
                    format!(
                        "({})",
                        parent_columns
                            .iter()
                            .map(|c| dialect.quote_identifier(c))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
                let op = if *negated { "NOT IN" } else { "IN" };
                let select = select_columns
                    .iter()
                    .map(|c| dialect.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                let where_clause = condition_sql
                    .as_ref()
                    .map(|w| format!(" WHERE {w}"))
                    .unwrap_or_default();
                format!(
                    "{lhs} {op} (SELECT {select} FROM {}{where_clause})",
                    dialect.quote_identifier(target_table)
                )
            }
            Value::Exists {
                table,
                condition_sql,
                condition_params,
                negated,
            } => {
                for v in condition_params {
                    params.push(v.clone());
                }
                let kw = if *negated { "NOT EXISTS" } else { "EXISTS" };
                let where_clause = condition_sql
                    .as_ref()
                    .map(|w| format!(" WHERE {w}"))
                    .unwrap_or_default();
                format!(
                    "{kw} (SELECT 1 FROM {}{where_clause})",
                    dialect.quote_identifier(table)
                )
            }
            Value::DBToken(v) => {
                let ph = params.push(v.clone());
                format!("{}{}", op_key("="), ph)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::postgres::Postgres;

    fn params() -> ParamList {
        ParamList::new()
    }

    #[test]
    fn empty_array_is_stable_falsy() {
        let mut p = params();
        let sql = Value::array(Vec::<i64>::new()).compile(&mut p, Some("id"), &Postgres);
        assert_eq!(sql, "1 = 0");
        assert_eq!(p.len(), 0);
    }

    #[test]
    fn array_renders_in_list_with_key() {
        let mut p = params();
        let sql = Value::array([1i64, 2, 3]).compile(&mut p, Some("id"), &Postgres);
        assert_eq!(sql, "\"id\" IN ($1, $2, $3)");
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn null_and_not_null() {
        let mut p = params();
        assert_eq!(Value::Null.compile(&mut p, Some("deleted_at"), &Postgres), "\"deleted_at\" IS NULL");
        assert_eq!(
            Value::NotNull.compile(&mut p, Some("deleted_at"), &Postgres),
            "\"deleted_at\" IS NOT NULL"
        );
    }

    #[test]
    fn parent_ref_has_no_param() {
        let mut p = params();
        let sql = Value::ParentRef {
            table: "posts".into(),
            column: "user_id".into(),
        }
        .compile(&mut p, None, &Postgres);
        assert_eq!(sql, "\"posts\".\"user_id\"");
        assert_eq!(p.len(), 0);
    }

    #[test]
    fn tuple_in_empty_is_falsy() {
        let mut p = params();
        let sql = Value::TupleIn(vec!["a".into(), "b".into()], vec![]).compile(&mut p, None, &Postgres);
        assert_eq!(sql, "1 = 0");
    }
}
