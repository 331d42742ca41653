//! Query Engine (§4.6): the public `find`/`findOne`/`findById`/`count`/
//! `create`/`update`/`delete`/`query`/`withQuery` operations every model
//! exposes, generalized over a `Driver` + `SqlBuilder` pair.
//!
//! A `Query<D>` borrows a `ModelDescriptor` and a connection already routed
//! by `router.rs` (readers for `find`/`count`, the active transaction
//! connection for writes) and drives it through one dialect's builder.
//! `db.rs` is what assembles a model's `Query` handle from a `DbBase`.

use crate::condition::Condition;
use crate::descriptor::{ModelDescriptor, OrderSpec};
use crate::dialect::{BuiltQuery, OnConflict, PkeyResult, SqlBuilder};
use crate::driver::Connection;
use crate::error::{OrmError, OrmResult};
use crate::guards::LimitPlan;
use crate::middleware::{MethodOp, MethodPipeline};
use crate::param::DynValue;
use crate::row::{FromRow, Row};
use crate::value::{Skippable, Value};

/// Options accepted by `find`/`count` (§4.6). Each defaults to the
/// descriptor's own `default_*`; an explicit `Some` here overrides it.
#[derive(Default, Clone)]
pub struct FindOptions {
    pub order: Option<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub group: Option<Vec<String>>,
    pub select: Option<Vec<String>>,
}

/// Options accepted by `create`/`createMany`/`update`/`updateMany`/`delete`.
#[derive(Default, Clone)]
pub struct WriteOptions {
    pub returning: bool,
    pub on_conflict: OnConflict,
}

impl Default for OnConflict {
    fn default() -> Self {
        OnConflict::None
    }
}

/// One database base's query engine for a single model, generic over the
/// dialect builder and the already-routed connection it executes against.
pub struct Query<'a, C: Connection> {
    descriptor: &'a ModelDescriptor,
    dialect: &'a dyn SqlBuilder,
    conn: &'a C,
    find_hard_limit: Option<u64>,
}

impl<'a, C: Connection> Query<'a, C> {
    pub fn new(descriptor: &'a ModelDescriptor, dialect: &'a dyn SqlBuilder, conn: &'a C, find_hard_limit: Option<u64>) -> Self {
        Self {
            descriptor,
            dialect,
            conn,
            find_hard_limit,
        }
    }

    fn effective_filter(&self, conds: Condition) -> Condition {
        match &self.descriptor.default_filter {
            Some(default) if !default.is_empty() => default.clone().append(conds),
            _ => conds,
        }
    }

    fn effective_order(&self, order: Option<OrderSpec>) -> Option<OrderSpec> {
        order.or_else(|| self.descriptor.default_order.clone())
    }

    fn effective_group(&self, group: Option<Vec<String>>) -> Option<Vec<String>> {
        group.or_else(|| self.descriptor.default_group.clone())
    }

    fn effective_select(&self, select: Option<Vec<String>>) -> Vec<String> {
        select
            .or_else(|| self.descriptor.default_select.clone())
            .unwrap_or_else(|| self.descriptor.column_names())
    }

    /// Build the `SELECT ... FROM <from>` prefix, substituting the CTE form
    /// when the descriptor is query-based (§4.6 `ctesql`).
    fn select_from(&self, select_list: &str) -> (String, Vec<DynValue>) {
        let quote = |s: &str| self.dialect.quote_identifier(s);
        match &self.descriptor.ctesql {
            Some(cte) => {
                let sql = format!(
                    "WITH {} AS ({cte}) SELECT {select_list} FROM {}",
                    quote(&self.descriptor.table_name),
                    quote(&self.descriptor.table_name)
                );
                (sql, self.descriptor.cte_prebind_params.clone())
            }
            None => (
                format!("SELECT {select_list} FROM {}", quote(&self.descriptor.table_name)),
                Vec::new(),
            ),
        }
    }

    fn build_find_sql(
        &self,
        select_list: &str,
        conds: Condition,
        opts: &FindOptions,
        hard_limit: Option<u64>,
    ) -> (String, Vec<DynValue>, LimitPlan) {
        let conds = self.effective_filter(conds);
        let order = self.effective_order(opts.order.clone());
        let group = self.effective_group(opts.group.clone());

        let (mut sql, mut params) = self.select_from(select_list);
        let (where_sql, where_params) = conds.compile(self.dialect);
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        params.extend(where_params.into_values());

        if let Some(group) = &group {
            if !group.is_empty() {
                let cols = group
                    .iter()
                    .map(|c| self.dialect.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(" GROUP BY ");
                sql.push_str(&cols);
            }
        }

        if let Some(order) = &order {
            if !order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&order.compile(|c| self.dialect.quote_identifier(c)));
            }
        }

        let plan = LimitPlan::new(opts.limit, hard_limit);
        if let Some(n) = plan.sql_limit() {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(offset) = opts.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, params, plan)
    }

    /// `find(conds, opts)` (§4.6). All returned instances are considered
    /// part of one batch context by the relation loader (`relation.rs`
    /// establishes that context around the returned `Vec`).
    ///
    /// Runs through the method-level middleware pipeline (§4.9): registered
    /// hooks may rewrite `conds`/`opts` before the query builds, and observe
    /// the row count (or error) after it runs.
    pub async fn find<T: FromRow>(&self, conds: Condition, opts: FindOptions) -> OrmResult<Vec<T>> {
        let pipeline = MethodPipeline::current();
        pipeline
            .run_find(&self.descriptor.table_name, MethodOp::Find, conds, opts, |conds, opts| {
                self.find_uninstrumented(conds, opts)
            })
            .await
    }

    async fn find_uninstrumented<T: FromRow>(&self, conds: Condition, opts: FindOptions) -> OrmResult<Vec<T>> {
        let select_list = self
            .effective_select(opts.select.clone())
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let (sql, params, plan) = self.build_find_sql(&select_list, conds, &opts, self.find_hard_limit);
        let rows = self.conn.query(&sql, &params).await?;
        let rows = plan.finish(rows)?;
        rows.iter().map(T::from_row).collect()
    }

    /// `findOne(conds, opts)`: same as `find` with `LIMIT 1`.
    pub async fn find_one<T: FromRow>(&self, conds: Condition, mut opts: FindOptions) -> OrmResult<Option<T>> {
        opts.limit = Some(1);
        let pipeline = MethodPipeline::current();
        pipeline
            .run_find_one(&self.descriptor.table_name, conds, opts, |conds, opts| async move {
                let rows: Vec<T> = self.find_uninstrumented(conds, opts).await?;
                Ok(rows.into_iter().next())
            })
            .await
    }

    /// `findById(pkey values)` via `buildFindByPkeys`. Row order is
    /// unspecified.
    pub async fn find_by_id<T: FromRow>(&self, pkey_values: Vec<Vec<DynValue>>) -> OrmResult<Vec<T>> {
        let select = self.effective_select(None);
        let built = self.dialect.build_find_by_pkeys(
            &self.descriptor.update_table_name,
            &self.descriptor.pkey_columns,
            &self.descriptor.pkey_types(),
            &pkey_values,
            &select,
        );
        let rows = self.conn.query(&built.sql, &built.params).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// `count(conds)`: replaces the select list with `COUNT(*)`.
    pub async fn count(&self, conds: Condition) -> OrmResult<i64> {
        let opts = FindOptions::default();
        let (sql, params, _) = self.build_find_sql("COUNT(*)", conds, &opts, None);
        let row = self.conn.query_one(&sql, &params).await?;
        row.column_names()
            .next()
            .and_then(|c| row.get(c))
            .and_then(|v| match v {
                DynValue::I64(n) => Some(*n),
                _ => None,
            })
            .ok_or_else(|| OrmError::decode("count", "expected a single integer column"))
    }

    fn require_writable(&self) -> OrmResult<()> {
        if self.descriptor.is_query_based() {
            return Err(OrmError::validation("cannot write to a query-based model"));
        }
        Ok(())
    }

    /// `create(values, opts)`. The router (§4.8) is responsible for
    /// rejecting this call outside a write context before a `Query` is even
    /// handed a connection; this layer only rejects query-based
    /// descriptors.
    pub async fn create(&self, values: Vec<(String, DynValue)>, opts: &WriteOptions) -> OrmResult<Option<PkeyResult>> {
        self.create_many(vec![values], opts).await
    }

    /// `createMany(rows, opts)`.
    pub async fn create_many(
        &self,
        rows: Vec<Vec<(String, DynValue)>>,
        opts: &WriteOptions,
    ) -> OrmResult<Option<PkeyResult>> {
        self.require_writable()?;
        if rows.is_empty() {
            return Ok(None);
        }
        let columns: Vec<String> = rows[0].iter().map(|(c, _)| c.clone()).collect();
        let column_types: Vec<_> = columns
            .iter()
            .filter_map(|c| self.descriptor.columns.iter().find(|col| &col.name == c).map(|col| col.sql_type))
            .collect();
        let row_values: Vec<Vec<DynValue>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(_, v)| v).collect())
            .collect();

        let returning = if opts.returning {
            Some(self.descriptor.pkey_columns.as_slice())
        } else {
            None
        };

        let built = self.dialect.build_insert(
            &self.descriptor.update_table_name,
            &columns,
            &column_types,
            &row_values,
            &opts.on_conflict,
            returning,
        )?;

        self.run_insert_returning(built, opts.returning).await
    }

    /// `update(conds, values, opts)`. Errors if the descriptor is
    /// query-based. An all-SKIP value list is a no-op: no SQL is executed
    /// (SKIP idempotence corollary, §8). Runs through the method-level
    /// middleware pipeline (§4.9): hooks may rewrite `conds`/`values`/`opts`
    /// before the statement builds.
    pub async fn update(
        &self,
        conds: Condition,
        values: Vec<(String, Skippable<DynValue>)>,
        opts: WriteOptions,
    ) -> OrmResult<Option<PkeyResult>> {
        self.require_writable()?;
        let pipeline = MethodPipeline::current();
        pipeline
            .run_write(
                &self.descriptor.table_name,
                MethodOp::Update,
                Some(conds),
                values,
                opts,
                |conds, values, opts| self.update_uninstrumented(conds.unwrap_or_default(), values, opts),
            )
            .await
    }

    async fn update_uninstrumented(
        &self,
        conds: Condition,
        values: Vec<(String, Skippable<DynValue>)>,
        opts: WriteOptions,
    ) -> OrmResult<Option<PkeyResult>> {
        let set_columns: Vec<(String, DynValue)> = values
            .into_iter()
            .filter_map(|(c, v)| match v {
                Skippable::Value(v) => Some((c, v)),
                Skippable::Skip => None,
            })
            .collect();

        if set_columns.is_empty() {
            return Ok(None);
        }

        let conds = self.effective_filter(conds);
        let (where_sql, where_params) = conds.compile(self.dialect);
        let where_params = where_params.into_values();
        let returning = if opts.returning {
            Some(self.descriptor.pkey_columns.as_slice())
        } else {
            None
        };

        let built = self.dialect.build_update(
            &self.descriptor.update_table_name,
            &set_columns,
            &where_sql,
            where_params.clone(),
            returning,
        )?;

        self.run_mutate_returning(built, &where_sql, where_params, opts.returning).await
    }

    /// `updateMany(keyColumns, updateColumns, rows, opts)`: batch update
    /// keyed by `keyColumns`, each row carrying `Option<DynValue>` per
    /// `updateColumns` (`None` = SKIP, preserving the existing value).
    pub async fn update_many(
        &self,
        key_columns: Vec<String>,
        update_columns: Vec<String>,
        rows: Vec<(Vec<DynValue>, Vec<Option<DynValue>>)>,
        opts: &WriteOptions,
    ) -> OrmResult<Option<PkeyResult>> {
        self.require_writable()?;
        if rows.is_empty() {
            return Ok(None);
        }
        let all_columns: Vec<String> = key_columns.iter().chain(update_columns.iter()).cloned().collect();
        let column_types: Vec<_> = all_columns
            .iter()
            .filter_map(|c| self.descriptor.columns.iter().find(|col| &col.name == c).map(|col| col.sql_type))
            .collect();

        let returning = if opts.returning {
            Some(self.descriptor.pkey_columns.as_slice())
        } else {
            None
        };

        let built = self.dialect.build_update_many(
            &self.descriptor.update_table_name,
            &key_columns,
            &update_columns,
            &column_types,
            &rows,
            returning,
        )?;

        if !opts.returning {
            self.conn.execute(&built.sql, &built.params).await?;
            return Ok(None);
        }

        let mut match_params = self.dialect.new_params();
        let tuples: Vec<Vec<DynValue>> = rows.iter().map(|(keys, _)| keys.clone()).collect();
        let where_sql = Value::TupleIn(key_columns, tuples).compile(&mut match_params, None, self.dialect);
        let where_params = match_params.into_values();

        self.run_mutate_returning(built, &where_sql, where_params, true).await
    }

    /// `delete(conds, opts)`. Runs through the method-level middleware
    /// pipeline (§4.9); `delete` has no value list, so hooks only see
    /// `conds`.
    pub async fn delete(&self, conds: Condition, opts: WriteOptions) -> OrmResult<Option<PkeyResult>> {
        self.require_writable()?;
        let pipeline = MethodPipeline::current();
        pipeline
            .run_write(&self.descriptor.table_name, MethodOp::Delete, Some(conds), Vec::new(), opts, |conds, _values, opts| {
                self.delete_uninstrumented(conds.unwrap_or_default(), opts)
            })
            .await
    }

    async fn delete_uninstrumented(&self, conds: Condition, opts: WriteOptions) -> OrmResult<Option<PkeyResult>> {
        let conds = self.effective_filter(conds);
        let (where_sql, where_params) = conds.compile(self.dialect);
        let where_params = where_params.into_values();
        let returning = if opts.returning {
            Some(self.descriptor.pkey_columns.as_slice())
        } else {
            None
        };
        let built = self.dialect.build_delete(
            &self.descriptor.update_table_name,
            &where_sql,
            where_params.clone(),
            returning,
        )?;
        self.run_mutate_returning(built, &where_sql, where_params, opts.returning).await
    }

    fn pkeys_from_rows(&self, rows: &[Row]) -> PkeyResult {
        let key = self.descriptor.pkey_columns.clone();
        let values = rows
            .iter()
            .map(|row| key.iter().filter_map(|c| row.get(c).cloned()).collect())
            .collect();
        PkeyResult { key, values }
    }

    /// Execute a write that already produced its own `RETURNING` rows (native
    /// `RETURNING` dialects only — PostgreSQL, SQLite).
    async fn run_write_returning(&self, built: BuiltQuery, returning: bool) -> OrmResult<Option<PkeyResult>> {
        if !returning {
            self.conn.execute(&built.sql, &built.params).await?;
            return Ok(None);
        }
        let rows = self.conn.query(&built.sql, &built.params).await?;
        Ok(Some(self.pkeys_from_rows(&rows)))
    }

    /// Execute an `UPDATE`/`DELETE` write, materializing a `PkeyResult` when
    /// `returning` was requested. Dialects with native `RETURNING` run the
    /// statement once and decode its own result rows. MySQL has none, so
    /// §4.4.3 emulates it with a pre-`SELECT` of the matching pkeys run
    /// ahead of the write — a post-write `SELECT` would see an empty set
    /// after a `DELETE` and the wrong rows after an `UPDATE` that touches
    /// the key columns themselves.
    async fn run_mutate_returning(
        &self,
        built: BuiltQuery,
        where_sql: &str,
        where_params: Vec<DynValue>,
        returning: bool,
    ) -> OrmResult<Option<PkeyResult>> {
        if !returning {
            self.conn.execute(&built.sql, &built.params).await?;
            return Ok(None);
        }
        if self.dialect.supports_returning() {
            return self.run_write_returning(built, true).await;
        }

        let select = self
            .dialect
            .build_select_pkeys(&self.descriptor.update_table_name, &self.descriptor.pkey_columns, where_sql, where_params);
        let rows = self.conn.query(&select.sql, &select.params).await?;
        let result = self.pkeys_from_rows(&rows);
        self.conn.execute(&built.sql, &built.params).await?;
        Ok(Some(result))
    }

    /// Execute an `INSERT`, materializing a `PkeyResult` when `returning` was
    /// requested. Dialects with native `RETURNING` decode it directly off the
    /// insert statement. MySQL emulates it per §4.4.3: `rows_affected` and
    /// `last_insert_id` from the `ExecResult` bound the contiguous
    /// auto-increment range the batch claimed (MySQL hands out
    /// `AUTO_INCREMENT` values to a multi-row `INSERT` as one consecutive
    /// block), which is then re-selected by pkey.
    async fn run_insert_returning(&self, built: BuiltQuery, returning: bool) -> OrmResult<Option<PkeyResult>> {
        if !returning {
            self.conn.execute(&built.sql, &built.params).await?;
            return Ok(None);
        }
        if self.dialect.supports_returning() {
            return self.run_write_returning(built, true).await;
        }

        let pkey_columns = &self.descriptor.pkey_columns;
        let pkey = match pkey_columns.as_slice() {
            [single] => single.clone(),
            _ => {
                return Err(OrmError::validation(
                    "MySQL RETURNING emulation for createMany requires a single-column primary key",
                ));
            }
        };

        let exec = self.conn.execute(&built.sql, &built.params).await?;
        if exec.rows_affected == 0 {
            return Ok(Some(PkeyResult {
                key: pkey_columns.clone(),
                values: Vec::new(),
            }));
        }
        let first_id = exec.last_insert_id.ok_or_else(|| {
            OrmError::validation("MySQL RETURNING emulation for createMany requires the driver to report last_insert_id")
        })?;
        let last_id = first_id + exec.rows_affected as i64 - 1;

        let mut params = self.dialect.new_params();
        let quoted_pkey = self.dialect.quote_identifier(&pkey);
        let lo = params.push(DynValue::I64(first_id));
        let hi = params.push(DynValue::I64(last_id));
        let where_sql = format!("{quoted_pkey} BETWEEN {lo} AND {hi}");

        let mut select = self
            .dialect
            .build_select_pkeys(&self.descriptor.update_table_name, pkey_columns, &where_sql, params.into_values());
        select.sql.push_str(&format!(" ORDER BY {quoted_pkey}"));

        let rows = self.conn.query(&select.sql, &select.params).await?;
        Ok(Some(self.pkeys_from_rows(&rows)))
    }

    /// `query(sql, params)`: execute raw SQL via the driver, deserializing
    /// rows into instances. Runs through the `query` method-level hook
    /// (§4.9); the execute-level hook fires underneath it regardless.
    pub async fn query_raw<T: FromRow>(&self, sql: &str, params: &[DynValue]) -> OrmResult<Vec<T>> {
        let pipeline = MethodPipeline::current();
        pipeline
            .run_query(sql.to_string(), params.to_vec(), |sql, params| async move {
                let rows = self.conn.query(&sql, &params).await?;
                rows.iter().map(T::from_row).collect()
            })
            .await
    }

    /// `withQuery({sql, params})`: a derived, read-only descriptor whose
    /// `ctesql`/`cte_prebind_params` are replaced, preserving `table_name`
    /// as the CTE alias. Additional `find()` params are appended after the
    /// pre-bound ones by `select_from`/`build_find_sql` above.
    pub fn with_query(descriptor: &ModelDescriptor, sql: impl Into<String>, params: Vec<DynValue>) -> ModelDescriptor {
        descriptor.with_query(sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Column;
    use crate::dialect::postgres::Postgres;
    use crate::row::Row;

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new(
            "users",
            vec![Column::new("id", "int4"), Column::new("email", "text")],
            vec!["id".to_string()],
        )
    }

    struct FakeConn(std::sync::Mutex<Vec<Row>>);

    impl Connection for FakeConn {
        async fn query(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<Vec<Row>> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn execute(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<crate::driver::ExecResult> {
            Ok(crate::driver::ExecResult::default())
        }
    }

    #[tokio::test]
    async fn find_applies_hard_limit_overflow() {
        let descriptor = descriptor();
        let rows = vec![
            Row::new(vec![("id".into(), DynValue::I64(1)), ("email".into(), DynValue::Text("a".into()))]),
            Row::new(vec![("id".into(), DynValue::I64(2)), ("email".into(), DynValue::Text("b".into()))]),
            Row::new(vec![("id".into(), DynValue::I64(3)), ("email".into(), DynValue::Text("c".into()))]),
        ];
        let conn = FakeConn(std::sync::Mutex::new(rows));
        let dialect = Postgres;
        let query = Query::new(&descriptor, &dialect, &conn, Some(2));

        struct Id(i64);
        impl FromRow for Id {
            fn from_row(row: &crate::row::Row) -> OrmResult<Self> {
                use crate::row::RowExt;
                Ok(Id(row.try_get_column("id")?))
            }
        }

        let result = query.find::<Id>(Condition::new(), FindOptions::default()).await;
        assert!(matches!(result, Err(OrmError::LimitExceeded { limit: 2, actual: 3 })));
    }

    #[test]
    fn with_query_preserves_alias() {
        let base = descriptor();
        let derived = Query::<FakeConn>::with_query(&base, "SELECT * FROM users WHERE active", vec![]);
        assert!(derived.is_query_based());
        assert_eq!(derived.table_name, "users");
    }

    struct FakeMySqlConn {
        rows: std::sync::Mutex<Vec<Row>>,
        exec: crate::driver::ExecResult,
    }

    impl Connection for FakeMySqlConn {
        async fn query(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<Vec<Row>> {
            Ok(self.rows.lock().unwrap().clone())
        }
        async fn execute(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<crate::driver::ExecResult> {
            Ok(self.exec.clone())
        }
    }

    #[tokio::test]
    async fn mysql_create_many_emulates_returning_via_insert_id_range() {
        let descriptor = descriptor();
        let rows = vec![
            Row::new(vec![("id".into(), DynValue::I64(10)), ("email".into(), DynValue::Text("a".into()))]),
            Row::new(vec![("id".into(), DynValue::I64(11)), ("email".into(), DynValue::Text("b".into()))]),
        ];
        let conn = FakeMySqlConn {
            rows: std::sync::Mutex::new(rows),
            exec: crate::driver::ExecResult {
                rows_affected: 2,
                last_insert_id: Some(10),
            },
        };
        let dialect = crate::dialect::mysql::MySql;
        let query = Query::new(&descriptor, &dialect, &conn, None);

        let result = query
            .create_many(
                vec![
                    vec![("email".to_string(), DynValue::Text("a".into()))],
                    vec![("email".to_string(), DynValue::Text("b".into()))],
                ],
                &WriteOptions {
                    returning: true,
                    on_conflict: OnConflict::None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.key, vec!["id".to_string()]);
        assert_eq!(result.values.len(), 2);
    }

    #[tokio::test]
    async fn mysql_create_many_returning_with_no_rows_affected_is_empty() {
        let descriptor = descriptor();
        let conn = FakeMySqlConn {
            rows: std::sync::Mutex::new(Vec::new()),
            exec: crate::driver::ExecResult {
                rows_affected: 0,
                last_insert_id: None,
            },
        };
        let dialect = crate::dialect::mysql::MySql;
        let query = Query::new(&descriptor, &dialect, &conn, None);

        let result = query
            .create_many(
                vec![vec![("email".to_string(), DynValue::Text("a".into()))]],
                &WriteOptions {
                    returning: true,
                    on_conflict: OnConflict::None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(result.values.is_empty());
    }

    #[tokio::test]
    async fn mysql_create_many_composite_pkey_returning_is_rejected() {
        let descriptor = ModelDescriptor::new(
            "user_roles",
            vec![Column::new("user_id", "int4"), Column::new("role_id", "int4")],
            vec!["user_id".to_string(), "role_id".to_string()],
        );
        let conn = FakeMySqlConn {
            rows: std::sync::Mutex::new(Vec::new()),
            exec: crate::driver::ExecResult {
                rows_affected: 1,
                last_insert_id: Some(1),
            },
        };
        let dialect = crate::dialect::mysql::MySql;
        let query = Query::new(&descriptor, &dialect, &conn, None);

        let result = query
            .create_many(
                vec![vec![
                    ("user_id".to_string(), DynValue::I64(1)),
                    ("role_id".to_string(), DynValue::I64(2)),
                ]],
                &WriteOptions {
                    returning: true,
                    on_conflict: OnConflict::None,
                },
            )
            .await;

        assert!(matches!(result, Err(OrmError::Validation(_))));
    }

    #[tokio::test]
    async fn mysql_delete_emulates_returning_via_pre_select() {
        let descriptor = descriptor();
        let rows = vec![Row::new(vec![
            ("id".into(), DynValue::I64(1)),
            ("email".into(), DynValue::Text("a".into())),
        ])];
        let conn = FakeMySqlConn {
            rows: std::sync::Mutex::new(rows),
            exec: crate::driver::ExecResult {
                rows_affected: 1,
                last_insert_id: None,
            },
        };
        let dialect = crate::dialect::mysql::MySql;
        let query = Query::new(&descriptor, &dialect, &conn, None);

        let result = query
            .delete(
                Condition::new(),
                WriteOptions {
                    returning: true,
                    on_conflict: OnConflict::None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.key, vec!["id".to_string()]);
        assert_eq!(result.values, vec![vec![DynValue::I64(1)]]);
    }

    #[tokio::test]
    async fn mysql_update_many_returning_echoes_input_key_tuples() {
        let descriptor = descriptor();
        let rows = vec![Row::new(vec![
            ("id".into(), DynValue::I64(1)),
            ("email".into(), DynValue::Text("a".into())),
        ])];
        let conn = FakeMySqlConn {
            rows: std::sync::Mutex::new(rows),
            exec: crate::driver::ExecResult {
                rows_affected: 1,
                last_insert_id: None,
            },
        };
        let dialect = crate::dialect::mysql::MySql;
        let query = Query::new(&descriptor, &dialect, &conn, None);

        let result = query
            .update_many(
                vec!["id".to_string()],
                vec!["email".to_string()],
                vec![(vec![DynValue::I64(1)], vec![Some(DynValue::Text("b".into()))])],
                &WriteOptions {
                    returning: true,
                    on_conflict: OnConflict::None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.key, vec!["id".to_string()]);
        assert_eq!(result.values, vec![vec![DynValue::I64(1)]]);
    }
}
