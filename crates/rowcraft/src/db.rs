//! Database Base Assembler (§4.11): binds a reader pool, an optional writer
//! pool, and a dialect together into one opaque handle a model's generated
//! methods call into.
//!
//! Multiple `DbBase`s are mutually isolated for router/middleware scope
//! (each gets its own `router::BaseId`) but share the global model registry
//! — relation resolution across bases is permitted and desirable, exactly
//! as the teacher's own process-wide `inventory` registry already allows.

use std::time::Duration;

use crate::descriptor::ModelDescriptor;
use crate::dialect::SqlBuilder;
use crate::driver::Connection;
use crate::engine::Query;
use crate::error::OrmResult;
use crate::router::{ConnectionPool, ConnectionRouter, RoutedConn, TransactionOptions};

/// Base-level configuration accepted by `DbBase::new` (§6 Configuration
/// shape's base-level fields). Field defaults mirror the spec's stated
/// defaults: `use_writer_after_transaction` true, a 5 second sticky window.
#[derive(Clone)]
pub struct BaseConfig {
    pub use_writer_after_transaction: bool,
    pub writer_sticky_duration: Duration,
    pub find_hard_limit: Option<u64>,
    pub has_many_hard_limit: Option<u64>,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            use_writer_after_transaction: true,
            writer_sticky_duration: Duration::from_millis(5000),
            find_hard_limit: None,
            has_many_hard_limit: None,
        }
    }
}

impl BaseConfig {
    pub fn use_writer_after_transaction(mut self, value: bool) -> Self {
        self.use_writer_after_transaction = value;
        self
    }

    pub fn writer_sticky_duration(mut self, value: Duration) -> Self {
        self.writer_sticky_duration = value;
        self
    }

    pub fn find_hard_limit(mut self, value: u64) -> Self {
        self.find_hard_limit = Some(value);
        self
    }

    pub fn has_many_hard_limit(mut self, value: u64) -> Self {
        self.has_many_hard_limit = Some(value);
        self
    }
}

/// An assembled database base: owns the reader pool, the optional writer
/// pool, the router state, and the dialect every model under it compiles
/// against. Corresponds to the spec's `createDBBase` return handle.
pub struct DbBase<P: ConnectionPool> {
    router: ConnectionRouter<P>,
    dialect: &'static dyn SqlBuilder,
    find_hard_limit: Option<u64>,
    has_many_hard_limit: Option<u64>,
}

impl<P: ConnectionPool> DbBase<P> {
    pub fn new(reader: P, writer: Option<P>, dialect: &'static dyn SqlBuilder, config: BaseConfig) -> Self {
        let router =
            ConnectionRouter::new(reader, writer).with_writer_stickiness(config.use_writer_after_transaction, config.writer_sticky_duration);
        Self {
            router,
            dialect,
            find_hard_limit: config.find_hard_limit,
            has_many_hard_limit: config.has_many_hard_limit,
        }
    }

    pub fn dialect(&self) -> &'static dyn SqlBuilder {
        self.dialect
    }

    /// The hard cap `relation.rs` enforces on `hasMany` batch loads under
    /// this base, independent of `find`'s own `find_hard_limit`.
    pub fn has_many_hard_limit(&self) -> Option<u64> {
        self.has_many_hard_limit
    }

    /// Bind a model's descriptor to this base for reads: acquires a reader
    /// (or the active transaction/writer connection, per router state) and
    /// returns a `BoundQuery` ready to `find`/`count`/`findById`.
    pub async fn reader<'d>(&self, descriptor: &'d ModelDescriptor) -> OrmResult<BoundQuery<'d, P::Conn>> {
        let conn = self.router.read_connection().await?;
        Ok(BoundQuery {
            descriptor,
            dialect: self.dialect,
            conn,
            find_hard_limit: self.find_hard_limit,
        })
    }

    /// Bind a model's descriptor to this base for writes: asserts the
    /// current scope permits a write (§4.8) before returning a connection.
    pub async fn writer<'d>(&self, descriptor: &'d ModelDescriptor) -> OrmResult<BoundQuery<'d, P::Conn>> {
        let conn = self.router.write_connection().await?;
        Ok(BoundQuery {
            descriptor,
            dialect: self.dialect,
            conn,
            find_hard_limit: self.find_hard_limit,
        })
    }

    /// `transaction(fn, opts)` (§4.8): runs `f` with writes permitted,
    /// committing on success and rolling back on error or `rollback_only`.
    pub async fn transaction<F, Fut, T>(&self, opts: TransactionOptions, f: F) -> OrmResult<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = OrmResult<T>> + Send,
        T: Send,
    {
        self.router.transaction(opts, f).await
    }

    /// `withWriter(fn)`: runs `f` with every read routed to the writer pool,
    /// in read-only mode — writes still raise `WriteInReadOnlyContext`.
    pub async fn with_writer<F, Fut, T>(&self, f: F) -> OrmResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        self.router.with_writer(f).await
    }
}

/// One model descriptor bound to an already-routed connection under a
/// `DbBase`. `Deref` from `RoutedConn<C>` to `C` is what lets `.query()`
/// hand `Query::new` a plain `&C` despite the connection possibly being a
/// shared transaction handle.
pub struct BoundQuery<'d, C: Connection> {
    descriptor: &'d ModelDescriptor,
    dialect: &'static dyn SqlBuilder,
    conn: RoutedConn<C>,
    find_hard_limit: Option<u64>,
}

impl<'d, C: Connection> BoundQuery<'d, C> {
    pub fn query(&self) -> Query<'_, C> {
        Query::new(self.descriptor, self.dialect, &self.conn, self.find_hard_limit)
    }

    /// The routed connection itself, for callers that need to issue raw
    /// queries outside `Query` — e.g. the relation loader (`relation.rs`),
    /// which runs its own `SqlBuilder`-generated SQL directly against the
    /// connection a batch's `find` was already routed to.
    pub fn conn(&self) -> &C {
        &self.conn
    }
}

/// Install a fresh router *and* middleware scope for the given future — the
/// combined entry point a request handler or unit-of-work boundary should
/// wrap itself in, so sibling tasks never inherit one another's transaction
/// or middleware state (§5 "logical scope").
pub async fn run_scoped<F: std::future::Future>(f: F) -> F::Output {
    crate::router::run_scoped(crate::middleware::run_scoped(f)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::descriptor::Column;
    use crate::dialect::postgres::Postgres;
    use crate::engine::FindOptions;
    use crate::error::OrmError;
    use crate::param::DynValue;
    use crate::row::{FromRow, Row, RowExt};

    struct NoopConn;

    impl Connection for NoopConn {
        async fn query(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<Vec<Row>> {
            Ok(vec![Row::new(vec![("id".into(), DynValue::I64(1))])])
        }
        async fn execute(&self, _sql: &str, _params: &[DynValue]) -> OrmResult<crate::driver::ExecResult> {
            Ok(crate::driver::ExecResult::default())
        }
    }

    struct NoopPool;

    impl ConnectionPool for NoopPool {
        type Conn = NoopConn;
        async fn acquire(&self) -> OrmResult<NoopConn> {
            Ok(NoopConn)
        }
    }

    struct Id(i64);
    impl FromRow for Id {
        fn from_row(row: &Row) -> OrmResult<Self> {
            Ok(Id(row.try_get_column("id")?))
        }
    }

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("users", vec![Column::new("id", "int4")], vec!["id".to_string()])
    }

    #[tokio::test]
    async fn reader_finds_rows_outside_any_transaction() {
        run_scoped(async {
            let base = DbBase::new(NoopPool, None, &Postgres, BaseConfig::default());
            let descriptor = descriptor();
            let bound = base.reader(&descriptor).await.unwrap();
            let rows: Vec<Id> = bound.query().find(Condition::new(), FindOptions::default()).await.unwrap();
            assert_eq!(rows.len(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn writer_outside_transaction_is_rejected() {
        run_scoped(async {
            let base = DbBase::new(NoopPool, None, &Postgres, BaseConfig::default());
            let descriptor = descriptor();
            let result = base.writer(&descriptor).await;
            assert!(matches!(result, Err(OrmError::WriteOutsideTransaction)));
        })
        .await;
    }

    #[tokio::test]
    async fn writer_inside_transaction_is_permitted() {
        run_scoped(async {
            let base = DbBase::new(NoopPool, None, &Postgres, BaseConfig::default());
            let descriptor = descriptor();
            let ok = base
                .transaction(TransactionOptions::default(), || async {
                    let bound = base.writer(&descriptor).await?;
                    bound
                        .query()
                        .create(vec![("id".to_string(), DynValue::I64(1))], &Default::default())
                        .await?;
                    Ok::<_, OrmError>(())
                })
                .await;
            assert!(ok.is_ok());
        })
        .await;
    }
}
