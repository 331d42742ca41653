//! Model Descriptor contract (§4.3).
//!
//! The core never inspects language-level struct metadata; it consults only
//! the descriptor a model hands it. Descriptors are created once (typically
//! by the `#[derive(Model)]` macro, see `rowcraft-derive`) and are treated as
//! immutable after the model's first use — mutating one afterwards is
//! explicitly undefined behavior per the spec, so `ModelDescriptor` exposes
//! no setters once built.

use crate::condition::Condition;
use crate::dialect::ColumnType;
use crate::param::DynValue;

/// Sort direction for an `OrderSpec` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// `NULLS FIRST`/`NULLS LAST` placement for an `OrderSpec` entry (§3
/// `OrderSpec`). `Unspecified` emits no `NULLS` clause, leaving the
/// dialect's own default in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nulls {
    First,
    Last,
    #[default]
    Unspecified,
}

/// One entry of an `OrderSpec`: either a `(column, direction, nulls)` triple
/// or a raw fragment emitted verbatim (§3 "or a raw string fragment").
#[derive(Debug, Clone)]
enum OrderEntry {
    Column {
        column: String,
        direction: Direction,
        nulls: Nulls,
    },
    Raw(String),
}

/// An ORDER BY specification: an ordered list of entries, each either a
/// `(column, direction, nulls)` triple or a raw fragment.
#[derive(Debug, Clone, Default)]
pub struct OrderSpec(Vec<OrderEntry>);

impl OrderSpec {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn asc(self, column: impl Into<String>) -> Self {
        self.asc_nulls(column, Nulls::Unspecified)
    }

    pub fn desc(self, column: impl Into<String>) -> Self {
        self.desc_nulls(column, Nulls::Unspecified)
    }

    pub fn asc_nulls(mut self, column: impl Into<String>, nulls: Nulls) -> Self {
        self.0.push(OrderEntry::Column {
            column: column.into(),
            direction: Direction::Asc,
            nulls,
        });
        self
    }

    pub fn desc_nulls(mut self, column: impl Into<String>, nulls: Nulls) -> Self {
        self.0.push(OrderEntry::Column {
            column: column.into(),
            direction: Direction::Desc,
            nulls,
        });
        self
    }

    /// A raw ORDER BY fragment (e.g. a dialect-specific expression),
    /// emitted verbatim alongside any column entries already added.
    pub fn raw(mut self, fragment: impl Into<String>) -> Self {
        self.0.push(OrderEntry::Raw(fragment.into()));
        self
    }

    /// An `OrderSpec` consisting of a single raw fragment, standing in for
    /// the column-list form entirely.
    pub fn from_raw(fragment: impl Into<String>) -> Self {
        Self(vec![OrderEntry::Raw(fragment.into())])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn compile(&self, quote: impl Fn(&str) -> String) -> String {
        self.0
            .iter()
            .map(|entry| match entry {
                OrderEntry::Column { column, direction, nulls } => {
                    let dir = match direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    let nulls_sql = match nulls {
                        Nulls::First => " NULLS FIRST",
                        Nulls::Last => " NULLS LAST",
                        Nulls::Unspecified => "",
                    };
                    format!("{} {dir}{nulls_sql}", quote(column))
                }
                OrderEntry::Raw(fragment) => fragment.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A single column definition as seen by the core.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub sql_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// The descriptor a model hands to the query engine. Produced once (by
/// `#[derive(Model)]` or by hand for a query-based model) and never mutated
/// after the model's first use.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    /// Table read from (or CTE alias, if `ctesql` is set).
    pub table_name: String,
    /// Table written to by `update`/`updateMany`/`delete`. Equal to
    /// `table_name` unless the model targets a view with an underlying base
    /// table.
    pub update_table_name: String,
    /// Columns in declaration order — this order drives `SELECT *`-style
    /// column lists and batch UNNEST/VALUES-ROW column ordering.
    pub columns: Vec<Column>,
    /// Primary key column names, in order. Composite keys list more than
    /// one.
    pub pkey_columns: Vec<String>,
    /// If set, this model is query-based (§ Glossary "Query-based model"):
    /// `table_name` is used as the CTE alias and only read operations are
    /// permitted.
    pub ctesql: Option<String>,
    /// Parameters bound to `?` placeholders inside `ctesql`, prepended to
    /// every query's parameter list ahead of the caller's own condition
    /// parameters.
    pub cte_prebind_params: Vec<DynValue>,
    pub default_filter: Option<Condition>,
    pub default_order: Option<OrderSpec>,
    pub default_group: Option<Vec<String>>,
    pub default_select: Option<Vec<String>>,
}

impl ModelDescriptor {
    pub fn new(table_name: impl Into<String>, columns: Vec<Column>, pkey_columns: Vec<String>) -> Self {
        let table_name = table_name.into();
        Self {
            update_table_name: table_name.clone(),
            table_name,
            columns,
            pkey_columns,
            ctesql: None,
            cte_prebind_params: Vec::new(),
            default_filter: None,
            default_order: None,
            default_group: None,
            default_select: None,
        }
    }

    pub fn is_query_based(&self) -> bool {
        self.ctesql.is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.sql_type).collect()
    }

    pub fn pkey_types(&self) -> Vec<ColumnType> {
        self.pkey_columns
            .iter()
            .filter_map(|pk| self.columns.iter().find(|c| &c.name == pk).map(|c| c.sql_type))
            .collect()
    }

    /// Build a read-only, query-based descriptor derived from this one:
    /// `table_name` is preserved as the CTE alias, `ctesql`/
    /// `cte_prebind_params` are replaced, and additional `find()` params are
    /// appended after the pre-bound ones by the query engine (§4.6
    /// `withQuery`).
    pub fn with_query(&self, sql: impl Into<String>, params: Vec<DynValue>) -> Self {
        Self {
            ctesql: Some(sql.into()),
            cte_prebind_params: params,
            ..self.clone()
        }
    }
}

/// A model's registration with the global, process-wide registry. Populated
/// via `inventory::submit!` by `#[derive(Model)]`; relations may reference a
/// model from any database base since the registry is shared across bases
/// (§4.3 "the registry ... is global").
pub struct ModelRegistration {
    pub type_name: &'static str,
    pub table_name: &'static str,
}

inventory::collect!(ModelRegistration);

/// Iterate every model registered via `#[derive(Model)]` across the whole
/// process.
pub fn registered_models() -> impl Iterator<Item = &'static ModelRegistration> {
    inventory::iter::<ModelRegistration>.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_spec_compiles_columns_quoted() {
        let order = OrderSpec::new().asc("created_at").desc("id");
        let sql = order.compile(|c| format!("\"{c}\""));
        assert_eq!(sql, "\"created_at\" ASC, \"id\" DESC");
    }

    #[test]
    fn order_spec_emits_nulls_placement() {
        let order = OrderSpec::new().desc_nulls("updated_at", Nulls::Last);
        let sql = order.compile(|c| format!("\"{c}\""));
        assert_eq!(sql, "\"updated_at\" DESC NULLS LAST");
    }

    #[test]
    fn order_spec_raw_fragment_mixes_with_columns() {
        let order = OrderSpec::new().asc("id").raw("RANDOM()");
        let sql = order.compile(|c| format!("\"{c}\""));
        assert_eq!(sql, "\"id\" ASC, RANDOM()");
    }

    #[test]
    fn order_spec_from_raw_stands_in_for_column_list() {
        let order = OrderSpec::from_raw("similarity DESC");
        let sql = order.compile(|c| format!("\"{c}\""));
        assert_eq!(sql, "similarity DESC");
    }

    #[test]
    fn with_query_preserves_table_name_as_cte_alias() {
        let base = ModelDescriptor::new(
            "active_users",
            vec![Column::new("id", "int4")],
            vec!["id".to_string()],
        );
        let derived = base.with_query("SELECT * FROM users WHERE active", vec![]);
        assert_eq!(derived.table_name, "active_users");
        assert!(derived.is_query_based());
    }
}
