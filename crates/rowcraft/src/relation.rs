//! Relation Loader (§4.7): declarative `belongsTo`/`hasOne`/`hasMany` specs
//! resolved in batches. A `BatchContext` groups the instances produced by a
//! single `find`, memoizing each relation's result the first time it is
//! requested so that K instances sharing a relation trigger exactly one
//! query (§8 "Batch coalescing").
//!
//! Relation queries call only the driver's `execute`/`query` path — they
//! never go through method-level middleware hooks (§4.7 "bypass method-level
//! middleware"), since a hook that rewrites conditions for `find` would
//! double-apply model-level scoping meant for a different model class.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::condition::Condition;
use crate::descriptor::{ModelDescriptor, OrderSpec};
use crate::dialect::{DialectKind, SqlBuilder};
use crate::driver::Connection;
use crate::error::{OrmError, OrmResult};
use crate::guards::LimitPlan;
use crate::param::DynValue;
use crate::row::FromRow;

/// Which relationship shape a spec represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// Override for a relation's hard limit: inherit the base's
/// `hasManyHardLimit`, disable enforcement for this relation, or set an
/// explicit value (§4.10 "Per-relation `hardLimit` overrides the global;
/// `hardLimit: null` disables").
#[derive(Debug, Clone, Copy, Default)]
pub enum HardLimitOverride {
    #[default]
    Inherit,
    Disabled,
    Override(u64),
}

impl HardLimitOverride {
    fn resolve(self, base_default: Option<u64>) -> Option<u64> {
        match self {
            HardLimitOverride::Inherit => base_default,
            HardLimitOverride::Disabled => None,
            HardLimitOverride::Override(n) => Some(n),
        }
    }
}

/// A declarative relation: a key-pair list `[(ownerCol, targetCol), ...]`
/// plus options. The first element of each pair names a column on the
/// owner model; the second names a column on the target.
#[derive(Clone)]
pub struct RelationSpec {
    pub kind: RelationKind,
    pub key_pairs: Vec<(String, String)>,
    pub where_: Condition,
    pub order: Option<OrderSpec>,
    pub limit: Option<u64>,
    pub hard_limit: HardLimitOverride,
}

impl RelationSpec {
    fn new(kind: RelationKind, key_pairs: Vec<(impl Into<String>, impl Into<String>)>) -> Self {
        Self {
            kind,
            key_pairs: key_pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
            where_: Condition::new(),
            order: None,
            limit: None,
            hard_limit: HardLimitOverride::default(),
        }
    }

    pub fn belongs_to(key_pairs: Vec<(impl Into<String>, impl Into<String>)>) -> Self {
        Self::new(RelationKind::BelongsTo, key_pairs)
    }

    pub fn has_one(key_pairs: Vec<(impl Into<String>, impl Into<String>)>) -> Self {
        Self::new(RelationKind::HasOne, key_pairs)
    }

    pub fn has_many(key_pairs: Vec<(impl Into<String>, impl Into<String>)>) -> Self {
        Self::new(RelationKind::HasMany, key_pairs)
    }

    pub fn where_(mut self, cond: Condition) -> Self {
        self.where_ = cond;
        self
    }

    pub fn order(mut self, order: OrderSpec) -> Self {
        self.order = Some(order);
        self
    }

    /// Per-parent row cap for `hasMany` (§4.7 "LATERAL"/"ROW_NUMBER" paths).
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn hard_limit(mut self, v: HardLimitOverride) -> Self {
        self.hard_limit = v;
        self
    }

    fn owner_columns(&self) -> Vec<String> {
        self.key_pairs.iter().map(|(o, _)| o.clone()).collect()
    }

    fn target_columns(&self) -> Vec<String> {
        self.key_pairs.iter().map(|(_, t)| t.clone()).collect()
    }
}

/// A string rendering of a key tuple stable enough to use as a hash key.
/// `DynValue` isn't `Hash`/`Eq` (floats), so key tuples are compared by this
/// canonical textual form instead — adequate for the integer/UUID/text keys
/// relations are keyed on in practice.
fn cache_key(values: &[DynValue]) -> Vec<String> {
    values.iter().map(render_key_component).collect()
}

/// Public form of `cache_key`: renders an owner's key tuple the same way
/// `load_has_many`'s returned map is keyed, so callers can look up a
/// specific owner's bucket without reimplementing the encoding.
pub fn relation_key(values: &[DynValue]) -> Vec<String> {
    cache_key(values)
}

fn render_key_component(v: &DynValue) -> String {
    match v {
        DynValue::Null => "\0null".to_string(),
        DynValue::Bool(b) => format!("b:{b}"),
        DynValue::I64(i) => format!("i:{i}"),
        DynValue::F64(f) => format!("f:{f}"),
        DynValue::Text(s) => format!("s:{s}"),
        DynValue::Bytes(b) => format!("x:{}", crate::codec::hex_encode(b)),
        DynValue::Json(j) => format!("j:{j}"),
        DynValue::Uuid(u) => format!("u:{u}"),
        DynValue::DateTime(d) => format!("t:{}", d.to_rfc3339()),
        DynValue::Date(d) => format!("d:{d}"),
        #[cfg(feature = "rust_decimal")]
        DynValue::Decimal(d) => format!("n:{d}"),
        DynValue::Array(items) => format!("a:[{}]", cache_key(items).join(",")),
    }
}

/// Deduplicate owner key tuples, dropping any tuple with a null component
/// (§4.7 "removing duplicates and any tuple containing a null component").
fn dedup_key_tuples(tuples: Vec<Vec<DynValue>>) -> Vec<Vec<DynValue>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tuple in tuples {
        if tuple.iter().any(|v| matches!(v, DynValue::Null)) {
            continue;
        }
        let key = cache_key(&tuple);
        if seen.insert(key) {
            out.push(tuple);
        }
    }
    out
}

/// Renumber `$N` placeholders compiled against a fresh `ParamList` so they
/// continue after `offset` params already emitted ahead of them. A no-op
/// for `?`-style dialects, where position (not numbering) carries meaning.
fn renumber_dollar(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|d| d.is_ascii_digit()) {
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let n: usize = digits.parse().unwrap_or(0);
            out.push('$');
            out.push_str(&(n + offset).to_string());
        } else {
            out.push(c);
        }
    }
    out
}

/// Build the base `(sql, params)` matching `target`'s key columns against
/// the collected key tuples, with the relation's own `where_` appended.
/// Reuses `SqlBuilder::build_find_by_pkeys`, which already expresses "match
/// a table's key columns against a batch of values" for any dialect — the
/// relation loader's un-limited case is exactly that shape.
fn build_match_query(
    dialect: &dyn SqlBuilder,
    target: &ModelDescriptor,
    target_columns: &[String],
    key_tuples: &[Vec<DynValue>],
    extra_where: &Condition,
) -> (String, Vec<DynValue>) {
    let column_types: Vec<_> = target_columns
        .iter()
        .map(|c| {
            target
                .columns
                .iter()
                .find(|col| &col.name == c)
                .map(|col| col.sql_type)
                .unwrap_or("text")
        })
        .collect();

    let built = dialect.build_find_by_pkeys(
        &target.table_name,
        target_columns,
        &column_types,
        key_tuples,
        &target.column_names(),
    );
    let mut sql = built.sql;
    let mut params = built.params;

    if !extra_where.is_empty() {
        let (where_sql, where_params) = extra_where.compile(dialect);
        let offset = params.len();
        let where_sql = renumber_dollar(&where_sql, offset);
        sql.push_str(&format!(" AND ({where_sql})"));
        params.extend(where_params.into_values());
    }
    (sql, params)
}

/// Resolve one relation for a set of owner key tuples (already deduped,
/// non-null). Handles the per-parent `LIMIT n` path for `hasMany` via
/// PostgreSQL `LATERAL` or MySQL/SQLite `ROW_NUMBER() OVER (PARTITION BY
/// ...)`, and the plain batched-match path otherwise.
async fn run_relation_query<C>(
    conn: &C,
    dialect: &dyn SqlBuilder,
    target: &ModelDescriptor,
    spec: &RelationSpec,
    key_tuples: &[Vec<DynValue>],
    effective_hard_limit: Option<u64>,
) -> OrmResult<Vec<crate::row::Row>>
where
    C: Connection,
{
    if key_tuples.is_empty() {
        return Ok(Vec::new());
    }

    let target_columns = spec.target_columns();

    if spec.kind == RelationKind::HasMany && spec.limit.is_some() {
        let per_parent = spec.limit.unwrap();
        let plan = LimitPlan::new(None, effective_hard_limit);
        let (sql, params) = build_per_parent_limited_query(
            dialect,
            target,
            &target_columns,
            key_tuples,
            &spec.where_,
            spec.order.as_ref(),
            per_parent,
            plan.sql_limit(),
        );
        let rows = conn.query(&sql, &params).await?;
        return plan.finish(rows);
    }

    let (mut sql, params) =
        build_match_query(dialect, target, &target_columns, key_tuples, &spec.where_);

    if let Some(order) = &spec.order {
        let order_sql = order.compile(|c| dialect.quote_identifier(c));
        if !order_sql.is_empty() {
            sql.push_str(&format!(" ORDER BY {order_sql}"));
        }
    }

    let hard_limit_for_plan = if spec.kind == RelationKind::HasMany {
        effective_hard_limit
    } else {
        None
    };
    let plan = LimitPlan::new(None, hard_limit_for_plan);
    if let Some(limit) = plan.sql_limit() {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let rows = conn.query(&sql, &params).await?;
    plan.finish(rows)
}

#[allow(clippy::too_many_arguments)]
fn build_per_parent_limited_query(
    dialect: &dyn SqlBuilder,
    target: &ModelDescriptor,
    target_columns: &[String],
    key_tuples: &[Vec<DynValue>],
    extra_where: &Condition,
    order: Option<&OrderSpec>,
    per_parent_limit: u64,
    outer_limit: Option<u64>,
) -> (String, Vec<DynValue>) {
    let quoted_table = dialect.quote_identifier(&target.table_name);
    let quoted_target_cols: Vec<String> = target_columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect();
    let select_cols = target
        .column_names()
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let order_sql = order
        .map(|o| o.compile(|c| dialect.quote_identifier(c)))
        .filter(|s| !s.is_empty());

    match dialect.kind() {
        DialectKind::Postgres => {
            let mut params = Vec::new();
            let column_types: Vec<_> = target_columns
                .iter()
                .map(|c| {
                    target
                        .columns
                        .iter()
                        .find(|col| &col.name == c)
                        .map(|col| col.sql_type)
                        .unwrap_or("text")
                })
                .collect();
            let array_placeholders: Vec<String> = column_types
                .iter()
                .enumerate()
                .map(|(i, ty)| {
                    let values: Vec<DynValue> =
                        key_tuples.iter().map(|row| row[i].clone()).collect();
                    params.push(DynValue::Array(values));
                    format!("${}::{ty}[]", params.len())
                })
                .collect();
            let keys_cols = target_columns
                .iter()
                .map(|c| dialect.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            let join_cond = target_columns
                .iter()
                .map(|c| {
                    let q = dialect.quote_identifier(c);
                    format!("t.{q} = keys.{q}")
                })
                .collect::<Vec<_>>()
                .join(" AND ");

            let mut inner = format!("SELECT {select_cols} FROM {quoted_table} t WHERE {join_cond}");
            if !extra_where.is_empty() {
                let (where_sql, where_params) = extra_where.compile(dialect);
                let offset = params.len();
                inner.push_str(&format!(" AND ({})", renumber_dollar(&where_sql, offset)));
                params.extend(where_params.into_values());
            }
            if let Some(order_sql) = &order_sql {
                inner.push_str(&format!(" ORDER BY {order_sql}"));
            }
            inner.push_str(&format!(" LIMIT {per_parent_limit}"));

            let mut sql = format!(
                "SELECT _batch.* FROM (SELECT t.* FROM UNNEST({}) AS keys({keys_cols}) JOIN LATERAL ({inner}) t ON true) _batch",
                array_placeholders.join(", ")
            );
            if let Some(outer_limit) = outer_limit {
                sql.push_str(&format!(" LIMIT {outer_limit}"));
            }
            (sql, params)
        }
        DialectKind::MySql | DialectKind::Sqlite => {
            let mut params = Vec::new();
            let tuple_cond = key_tuples
                .iter()
                .map(|row| {
                    let ph: Vec<&str> = row.iter().map(|_| "?").collect();
                    params.extend(row.iter().cloned());
                    format!("({})", ph.join(", "))
                })
                .collect::<Vec<_>>()
                .join(", ");
            let key_cols_list = quoted_target_cols.join(", ");

            let partition_by = quoted_target_cols
                .iter()
                .map(|c| format!("t.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let order_clause = order_sql
                .clone()
                .unwrap_or_else(|| partition_by.clone());

            let mut inner = format!(
                "SELECT t.*, ROW_NUMBER() OVER (PARTITION BY {partition_by} ORDER BY {order_clause}) AS __rc_rn FROM {quoted_table} t WHERE ({key_cols_list}) IN ({tuple_cond})"
            );
            if !extra_where.is_empty() {
                let (where_sql, where_params) = extra_where.compile(dialect);
                inner.push_str(&format!(" AND ({where_sql})"));
                params.extend(where_params.into_values());
            }

            let mut sql = format!(
                "SELECT {select_cols} FROM ({inner}) ranked WHERE __rc_rn <= {per_parent_limit}"
            );
            if let Some(outer_limit) = outer_limit {
                sql.push_str(&format!(" LIMIT {outer_limit}"));
            }
            (sql, params)
        }
    }
}

/// A set of model instances produced by one `find` call, together with
/// memoized relation results. Coalesces concurrent accesses to the same
/// relation into a single query (§5 "the first awaiter initiates the query,
/// the rest await its completion"); the current implementation serializes
/// on one lock for the whole batch rather than per-relation, which is
/// correct but gives up cross-relation parallelism within a batch.
pub struct BatchContext<T> {
    owners: Vec<T>,
    cache: Mutex<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl<T> BatchContext<T> {
    pub fn new(owners: Vec<T>) -> Self {
        Self {
            owners,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn owners(&self) -> &[T] {
        &self.owners
    }

    /// Resolve (or return the memoized result of) a `hasMany` relation
    /// keyed by `name`. Returns a map from owner key tuple (as rendered by
    /// `cache_key`) to the target rows for that owner.
    pub async fn load_has_many<C, R>(
        &self,
        name: &'static str,
        conn: &C,
        dialect: &dyn SqlBuilder,
        target: &ModelDescriptor,
        spec: &RelationSpec,
        owner_key: impl Fn(&T) -> Vec<DynValue>,
        hard_limit_default: Option<u64>,
    ) -> OrmResult<Arc<HashMap<Vec<String>, Vec<R>>>>
    where
        C: Connection,
        R: FromRow + Send + Sync + 'static,
    {
        let mut guard = self.cache.lock().await;
        if let Some(existing) = guard.get(name) {
            return existing
                .clone()
                .downcast::<HashMap<Vec<String>, Vec<R>>>()
                .map_err(|_| {
                    OrmError::Other(format!("relation '{name}' requested with a different row type"))
                });
        }

        let tuples: Vec<Vec<DynValue>> = self.owners.iter().map(&owner_key).collect();
        let deduped = dedup_key_tuples(tuples);
        let effective_hard_limit = spec.hard_limit.resolve(hard_limit_default);
        let rows =
            run_relation_query(conn, dialect, target, spec, &deduped, effective_hard_limit).await?;

        let target_columns = spec.target_columns();
        let mut grouped: HashMap<Vec<String>, Vec<R>> = HashMap::new();
        for row in &rows {
            let key = row_key(row, &target_columns);
            grouped.entry(key).or_default().push(R::from_row(row)?);
        }
        let result = Arc::new(grouped);
        guard.insert(name, result.clone());
        Ok(result)
    }
}

/// The target row's own values for `target_columns` (its FK/PK bucketing
/// key), rendered the same way `cache_key` renders an owner's key tuple so
/// the two sides compare equal regardless of the underlying `DynValue`
/// variant. Read from the decoded `Row` rather than `R` since `FromRow`
/// erases which struct fields came from which column.
fn row_key(row: &crate::row::Row, target_columns: &[String]) -> Vec<String> {
    target_columns
        .iter()
        .map(|c| row.get(c).map(render_key_component).unwrap_or_else(|| "\0null".to_string()))
        .collect()
}

/// Resolve a single-instance relation (`belongsTo`/`hasOne`) outside any
/// batch context — used for a `findOne` result, which never establishes a
/// batch (§4.7 "not part of a batch context... run the same query but with
/// only I's key tuple").
pub async fn load_single<C, R>(
    conn: &C,
    dialect: &dyn SqlBuilder,
    target: &ModelDescriptor,
    spec: &RelationSpec,
    owner_key: Vec<DynValue>,
    hard_limit_default: Option<u64>,
) -> OrmResult<Option<R>>
where
    C: Connection,
    R: FromRow,
{
    let deduped = dedup_key_tuples(vec![owner_key]);
    if deduped.is_empty() {
        return Ok(None);
    }
    let effective_hard_limit = spec.hard_limit.resolve(hard_limit_default);
    let rows =
        run_relation_query(conn, dialect, target, spec, &deduped, effective_hard_limit).await?;

    if spec.kind == RelationKind::HasOne && rows.len() > 1 {
        return Err(OrmError::Other(
            "hasOne relation matched more than one row".to_string(),
        ));
    }
    rows.first().map(R::from_row).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_drops_null_and_duplicate_tuples() {
        let tuples = vec![
            vec![DynValue::I64(1)],
            vec![DynValue::I64(1)],
            vec![DynValue::Null],
            vec![DynValue::I64(2)],
        ];
        let deduped = dedup_key_tuples(tuples);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn hard_limit_override_inherits_by_default() {
        let spec = RelationSpec::has_many(vec![("id", "parent_id")]);
        assert_eq!(spec.hard_limit.resolve(Some(50)), Some(50));
    }

    use crate::descriptor::Column;
    use crate::dialect::postgres::Postgres;
    use crate::driver::ExecResult;
    use crate::row::Row;

    struct FakeConn(Vec<Row>);

    impl Connection for FakeConn {
        async fn query(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<Vec<Row>> {
            Ok(self.0.clone())
        }
        async fn execute(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<ExecResult> {
            Ok(ExecResult::default())
        }
    }

    struct Comment {
        id: i64,
        post_id: i64,
    }

    impl FromRow for Comment {
        fn from_row(row: &Row) -> OrmResult<Self> {
            use crate::row::RowExt;
            Ok(Comment {
                id: row.try_get_column("id")?,
                post_id: row.try_get_column("post_id")?,
            })
        }
    }

    /// `load_has_many` must bucket rows under the owner key tuple the row
    /// actually belongs to, not a single shared bucket (the `row_key`
    /// function previously always returned empty-string keys regardless of
    /// row content).
    #[tokio::test]
    async fn load_has_many_buckets_rows_by_target_key() {
        let rows = vec![
            Row::new(vec![
                ("id".into(), DynValue::I64(1)),
                ("post_id".into(), DynValue::I64(10)),
            ]),
            Row::new(vec![
                ("id".into(), DynValue::I64(2)),
                ("post_id".into(), DynValue::I64(10)),
            ]),
            Row::new(vec![
                ("id".into(), DynValue::I64(3)),
                ("post_id".into(), DynValue::I64(20)),
            ]),
        ];
        let conn = FakeConn(rows);
        let dialect = Postgres;
        let target = ModelDescriptor::new(
            "comments",
            vec![Column::new("id", "int8"), Column::new("post_id", "int8")],
            vec!["id".to_string()],
        );
        let spec = RelationSpec::has_many(vec![("id", "post_id")]);
        let ctx = BatchContext::new(vec![10_i64, 20_i64]);

        let grouped = ctx
            .load_has_many::<FakeConn, Comment>(
                "comments",
                &conn,
                &dialect,
                &target,
                &spec,
                |owner_id| vec![DynValue::I64(*owner_id)],
                None,
            )
            .await
            .unwrap();

        let bucket_10 = &grouped[&cache_key(&[DynValue::I64(10)])];
        let bucket_20 = &grouped[&cache_key(&[DynValue::I64(20)])];
        assert_eq!(bucket_10.len(), 2);
        assert_eq!(bucket_10.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(bucket_20.len(), 1);
        assert_eq!(bucket_20[0].post_id, 20);
    }

    #[test]
    fn hard_limit_override_disables() {
        let spec = RelationSpec::has_many(vec![("id", "parent_id")])
            .hard_limit(HardLimitOverride::Disabled);
        assert_eq!(spec.hard_limit.resolve(Some(50)), None);
    }

    #[test]
    fn hard_limit_override_explicit_value() {
        let spec = RelationSpec::has_many(vec![("id", "parent_id")])
            .hard_limit(HardLimitOverride::Override(5));
        assert_eq!(spec.hard_limit.resolve(Some(50)), Some(5));
    }

    #[test]
    fn renumber_dollar_shifts_placeholders() {
        assert_eq!(renumber_dollar("$1 AND $2", 2), "$3 AND $4");
        assert_eq!(renumber_dollar("$1", 0), "$1");
    }

    #[test]
    fn postgres_per_parent_limit_uses_lateral() {
        use crate::descriptor::{Column, ModelDescriptor};
        use crate::dialect::postgres::Postgres;

        let target = ModelDescriptor::new(
            "comments",
            vec![
                Column::new("id", "int4"),
                Column::new("post_id", "int4"),
                Column::new("body", "text"),
            ],
            vec!["id".to_string()],
        );
        let (sql, params) = build_per_parent_limited_query(
            &Postgres,
            &target,
            &["post_id".to_string()],
            &[vec![DynValue::I64(1)], vec![DynValue::I64(2)]],
            &Condition::new(),
            None,
            5,
            Some(11),
        );
        assert!(sql.contains("JOIN LATERAL"));
        assert!(sql.contains("LIMIT 5"));
        assert!(sql.ends_with("LIMIT 11"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn mysql_per_parent_limit_uses_row_number() {
        use crate::descriptor::{Column, ModelDescriptor};
        use crate::dialect::mysql::MySql;

        let target = ModelDescriptor::new(
            "comments",
            vec![Column::new("id", "int"), Column::new("post_id", "int")],
            vec!["id".to_string()],
        );
        let (sql, _params) = build_per_parent_limited_query(
            &MySql,
            &target,
            &["post_id".to_string()],
            &[vec![DynValue::I64(1)]],
            &Condition::new(),
            None,
            3,
            None,
        );
        assert!(sql.contains("ROW_NUMBER() OVER (PARTITION BY"));
        assert!(sql.contains("__rc_rn <= 3"));
    }
}
