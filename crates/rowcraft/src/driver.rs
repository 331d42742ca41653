//! Driver contract (§6): `execute`/`executeWrite`/`query` against a single
//! acquired connection, dialect-neutral in and out. Generalized from the
//! teacher's `GenericClient` (which unified `tokio_postgres::Client` and
//! `Transaction`) to also cover MySQL and SQLite connections.
//!
//! Placeholders in SQL handed to a driver are already in that driver's own
//! style (`$N` or `?`) — the dialect builders in `dialect/` render them
//! correctly up front, so no renumbering happens at this layer.

use crate::dialect::SqlBuilder;
use crate::error::OrmResult;
use crate::param::DynValue;
use crate::row::{FromRow, Row};

/// Outcome of a write statement.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// MySQL's auto-increment id of the first inserted row in a batch,
    /// used to emulate RETURNING (§4.4.3). `None` on dialects with native
    /// RETURNING or for non-INSERT statements.
    pub last_insert_id: Option<i64>,
}

/// A single acquired connection (or a transaction-scoped handle to one).
/// Each dialect's driver module supplies a concrete type implementing this;
/// the router (`router.rs`) is the only place that decides which connection
/// to hand out.
pub trait Connection: Send + Sync {
    fn query(
        &self,
        sql: &str,
        params: &[DynValue],
    ) -> impl std::future::Future<Output = OrmResult<Vec<Row>>> + Send;

    fn execute(
        &self,
        sql: &str,
        params: &[DynValue],
    ) -> impl std::future::Future<Output = OrmResult<ExecResult>> + Send;

    fn query_one(&self, sql: &str, params: &[DynValue]) -> impl std::future::Future<Output = OrmResult<Row>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            rows.into_iter()
                .next()
                .ok_or_else(|| crate::error::OrmError::not_found("expected one row, got none"))
        }
    }

    fn query_opt(
        &self,
        sql: &str,
        params: &[DynValue],
    ) -> impl std::future::Future<Output = OrmResult<Option<Row>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(rows.into_iter().next())
        }
    }

    /// `query` plus row decoding, used by the relation loader and anywhere
    /// else that wants typed rows without repeating the `iter().map(T::from_row)`
    /// boilerplate at every call site.
    fn query_as<R: FromRow>(
        &self,
        sql: &str,
        params: &[DynValue],
    ) -> impl std::future::Future<Output = OrmResult<Vec<R>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            rows.iter().map(R::from_row).collect()
        }
    }
}

/// Binds a concrete dialect's SQL builder to the connection type capable of
/// executing it. `DbBase` (see `db.rs`) is generic over one `Driver` per
/// database base, matching the spec's static-dispatch design note.
pub trait Driver: Send + Sync + 'static {
    type Conn: Connection;

    fn dialect(&self) -> &dyn SqlBuilder;
}

#[cfg(feature = "postgres")]
pub mod postgres {
    use super::*;
    use crate::dialect::postgres::Postgres;
    use crate::codec::postgres as pg_codec;
    use crate::middleware::InstrumentedConn;
    use crate::router::ConnectionPool;
    use tokio_postgres::types::ToSql;

    pub struct PgConn<C>(pub C);

    async fn run_query<C: GenericClient>(conn: &C, sql: &str, params: &[DynValue]) -> OrmResult<Vec<Row>> {
        let boxed: Vec<Box<dyn ToSql + Sync + Send>> = params.iter().map(pg_codec::to_sql).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();
        let rows = conn.query_raw(sql, &refs).await?;
        Ok(rows
            .iter()
            .map(|r| {
                let cols = r
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.name().to_string(), pg_codec::from_row_value(r, i, c.type_())))
                    .collect();
                Row::new(cols)
            })
            .collect())
    }

    /// Minimal surface shared by `tokio_postgres::Client`/`Transaction`/
    /// `deadpool_postgres::Client`, mirroring the teacher's `GenericClient`.
    pub trait GenericClient: Send + Sync {
        fn query_raw(
            &self,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> impl std::future::Future<Output = OrmResult<Vec<tokio_postgres::Row>>> + Send;

        fn execute_raw(
            &self,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> impl std::future::Future<Output = OrmResult<u64>> + Send;
    }

    impl GenericClient for tokio_postgres::Client {
        async fn query_raw(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<tokio_postgres::Row>> {
            Ok(self.query(sql, params).await?)
        }
        async fn execute_raw(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
            Ok(self.execute(sql, params).await?)
        }
    }

    impl GenericClient for tokio_postgres::Transaction<'_> {
        async fn query_raw(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<tokio_postgres::Row>> {
            Ok(self.query(sql, params).await?)
        }
        async fn execute_raw(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
            Ok(self.execute(sql, params).await?)
        }
    }

    impl GenericClient for deadpool_postgres::Client {
        async fn query_raw(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<tokio_postgres::Row>> {
            Ok(self.as_ref().query(sql, params).await?)
        }
        async fn execute_raw(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
            Ok(self.as_ref().execute(sql, params).await?)
        }
    }

    impl<C: GenericClient> Connection for PgConn<C> {
        async fn query(&self, sql: &str, params: &[DynValue]) -> OrmResult<Vec<Row>> {
            run_query(&self.0, sql, params).await
        }

        async fn execute(&self, sql: &str, params: &[DynValue]) -> OrmResult<ExecResult> {
            let boxed: Vec<Box<dyn ToSql + Sync + Send>> = params.iter().map(pg_codec::to_sql).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();
            let rows_affected = self.0.execute_raw(sql, &refs).await?;
            Ok(ExecResult {
                rows_affected,
                last_insert_id: None,
            })
        }
    }

    pub struct PostgresDriver;

    impl Driver for PostgresDriver {
        type Conn = InstrumentedConn<PgConn<deadpool_postgres::Client>>;

        fn dialect(&self) -> &dyn SqlBuilder {
            &Postgres
        }
    }

    /// `deadpool_postgres::Pool::get()` as a `ConnectionPool`, wrapping every
    /// acquired client so execute-level middleware hooks (§4.9) always fire,
    /// including for relation-loader-issued queries that bypass the
    /// method-level pipeline.
    impl ConnectionPool for deadpool_postgres::Pool {
        type Conn = InstrumentedConn<PgConn<deadpool_postgres::Client>>;

        async fn acquire(&self) -> OrmResult<Self::Conn> {
            let client = self.get().await?;
            Ok(InstrumentedConn::new(PgConn(client)))
        }
    }
}

#[cfg(feature = "mysql")]
pub mod mysql {
    use super::*;
    use crate::codec::mysql as my_codec;
    use crate::dialect::mysql::MySql;
    use crate::middleware::InstrumentedConn;
    use crate::router::ConnectionPool;
    use mysql_async::prelude::Queryable;

    pub struct MySqlConn(pub mysql_async::Conn);

    impl Connection for MySqlConn {
        async fn query(&self, sql: &str, params: &[DynValue]) -> OrmResult<Vec<Row>> {
            let values: Vec<mysql_async::Value> = params.iter().map(my_codec::to_value).collect();
            let mut conn = self.0.clone();
            let rows: Vec<mysql_async::Row> = conn.exec(sql, values).await?;
            Ok(rows
                .into_iter()
                .map(|mut r| {
                    let names: Vec<String> = r.columns_ref().iter().map(|c| c.name_str().to_string()).collect();
                    let cols = names
                        .into_iter()
                        .enumerate()
                        .map(|(i, name)| {
                            let v: mysql_async::Value = r.take(i).unwrap_or(mysql_async::Value::NULL);
                            (name, my_codec::from_value(v))
                        })
                        .collect();
                    Row::new(cols)
                })
                .collect())
        }

        async fn execute(&self, sql: &str, params: &[DynValue]) -> OrmResult<ExecResult> {
            let values: Vec<mysql_async::Value> = params.iter().map(my_codec::to_value).collect();
            let mut conn = self.0.clone();
            conn.exec_drop(sql, values).await?;
            Ok(ExecResult {
                rows_affected: conn.affected_rows(),
                last_insert_id: conn.last_insert_id().map(|v| v as i64),
            })
        }
    }

    pub struct MySqlDriver;

    impl Driver for MySqlDriver {
        type Conn = InstrumentedConn<MySqlConn>;

        fn dialect(&self) -> &dyn SqlBuilder {
            &MySql
        }
    }

    /// `mysql_async::Pool::get_conn()` as a `ConnectionPool`, wrapping every
    /// acquired connection so execute-level middleware hooks (§4.9) always
    /// fire, including for relation-loader-issued queries that bypass the
    /// method-level pipeline.
    impl ConnectionPool for mysql_async::Pool {
        type Conn = InstrumentedConn<MySqlConn>;

        async fn acquire(&self) -> OrmResult<Self::Conn> {
            let conn = self.get_conn().await?;
            Ok(InstrumentedConn::new(MySqlConn(conn)))
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    use super::*;
    use crate::codec::sqlite as lite_codec;
    use crate::dialect::sqlite::Sqlite;
    use crate::middleware::InstrumentedConn;
    use crate::router::ConnectionPool;
    use std::sync::Arc;

    /// `rusqlite::Connection` is synchronous; every call is dispatched to a
    /// blocking thread via the held pool handle, mirroring
    /// `dbflux_driver_sqlite`'s use of a blocking connection behind an
    /// async-facing driver.
    pub struct SqliteConn(pub Arc<deadpool_sqlite::Object>);

    impl Connection for SqliteConn {
        async fn query(&self, sql: &str, params: &[DynValue]) -> OrmResult<Vec<Row>> {
            let sql = sql.to_string();
            let params: Vec<DynValue> = params.to_vec();
            self.0
                .interact(move |conn| {
                    let mut stmt = conn.prepare(&sql)?;
                    let col_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
                    let bind: Vec<rusqlite::types::Value> = params.iter().map(lite_codec::to_value).collect();
                    let bind_refs: Vec<&dyn rusqlite::ToSql> =
                        bind.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
                    let mut rows = stmt.query(bind_refs.as_slice())?;
                    let mut out = Vec::new();
                    while let Some(row) = rows.next()? {
                        let cols = col_names
                            .iter()
                            .enumerate()
                            .map(|(i, name)| (name.clone(), lite_codec::from_value_ref(row.get_ref(i)?)))
                            .collect::<Result<Vec<_>, rusqlite::Error>>();
                        let cols = match cols {
                            Ok(c) => c,
                            Err(e) => return Err(e),
                        };
                        out.push(Row::new(cols));
                    }
                    Ok::<_, rusqlite::Error>(out)
                })
                .await??
                .into_iter()
                .map(Ok)
                .collect()
        }

        async fn execute(&self, sql: &str, params: &[DynValue]) -> OrmResult<ExecResult> {
            let sql = sql.to_string();
            let params: Vec<DynValue> = params.to_vec();
            let rows_affected = self
                .0
                .interact(move |conn| {
                    let bind: Vec<rusqlite::types::Value> = params.iter().map(lite_codec::to_value).collect();
                    let bind_refs: Vec<&dyn rusqlite::ToSql> =
                        bind.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
                    conn.execute(&sql, bind_refs.as_slice())
                })
                .await??;
            Ok(ExecResult {
                rows_affected: rows_affected as u64,
                last_insert_id: None,
            })
        }
    }

    pub struct SqliteDriver;

    impl Driver for SqliteDriver {
        type Conn = InstrumentedConn<SqliteConn>;

        fn dialect(&self) -> &dyn SqlBuilder {
            &Sqlite
        }
    }

    /// `deadpool_sqlite::Pool::get()` as a `ConnectionPool`, wrapping every
    /// acquired connection so execute-level middleware hooks (§4.9) always
    /// fire, including for relation-loader-issued queries that bypass the
    /// method-level pipeline.
    impl ConnectionPool for deadpool_sqlite::Pool {
        type Conn = InstrumentedConn<SqliteConn>;

        async fn acquire(&self) -> OrmResult<Self::Conn> {
            let obj = self.get().await?;
            Ok(InstrumentedConn::new(SqliteConn(Arc::new(obj))))
        }
    }
}
