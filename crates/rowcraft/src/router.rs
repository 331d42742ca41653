//! Connection Router (§4.8): decides which pool (reader/writer) an
//! `execute` routes to, gates writes to transaction scope, and implements
//! the sticky-writer window after a committed transaction.
//!
//! Scoped state (current mode, sticky-until timestamp, the active
//! transaction connection) lives in a `tokio::task_local!` keyed by a
//! per-`DbBase` id, so nested calls within the same task inherit it and
//! sibling tasks each start with a fresh, isolated scope (§5 "logical
//! scope"). This is the ambient-task-local substitute the spec explicitly
//! sanctions in place of a thread-local, since tasks — not threads — are
//! this runtime's unit of concurrency.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::driver::Connection;
use crate::error::{OrmError, OrmResult};

static NEXT_BASE_ID: AtomicUsize = AtomicUsize::new(1);

/// Identifies one `DbBase`'s router state within the scope map. Allocated
/// once per base at assembly time.
pub type BaseId = usize;

pub fn next_base_id() -> BaseId {
    NEXT_BASE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Transaction,
    WriterReadOnly,
}

#[derive(Clone, Default)]
struct BaseScope {
    mode: Option<Mode>,
    sticky_until: Option<Instant>,
    active_transaction_conn: Option<Arc<dyn Any + Send + Sync>>,
}

tokio::task_local! {
    static SCOPE: RefCell<HashMap<BaseId, BaseScope>>;
}

fn with_scope_map<R>(f: impl FnOnce(&mut HashMap<BaseId, BaseScope>) -> R) -> R {
    match SCOPE.try_with(|m| f(&mut m.borrow_mut())) {
        Ok(r) => r,
        Err(_) => {
            // No scope installed for this task yet — equivalent to an empty map.
            let mut empty = HashMap::new();
            f(&mut empty)
        }
    }
}

/// A caller-supplied classifier for "this driver error is retryable"
/// (deadlock/serialization-failure class). The spec explicitly declines to
/// encode a dialect-specific taxonomy in the core (§9 open questions).
pub type RetryClassifier = fn(&OrmError) -> bool;

fn never_retry(_: &OrmError) -> bool {
    false
}

#[derive(Clone)]
pub struct TransactionOptions {
    pub retry_on_error: bool,
    pub retry_limit: u32,
    pub rollback_only: bool,
    pub use_writer_after_transaction: Option<bool>,
    pub classifier: RetryClassifier,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            retry_on_error: false,
            retry_limit: 0,
            rollback_only: false,
            use_writer_after_transaction: None,
            classifier: never_retry,
        }
    }
}

/// Routes `execute`/`query` calls to the reader or writer pool for one
/// database base, and enforces the write-gating rules of §4.8.
pub struct ConnectionRouter<P: ConnectionPool> {
    base_id: BaseId,
    reader: P,
    writer: Option<P>,
    use_writer_after_transaction: bool,
    writer_sticky_duration: Duration,
}

/// A pool capable of acquiring one connection of type `Conn`. Implemented
/// per driver (`deadpool_postgres::Pool`, `mysql_async::Pool`,
/// `deadpool_sqlite::Pool`) in `pool.rs`.
pub trait ConnectionPool: Send + Sync {
    type Conn: Connection + 'static;

    fn acquire(&self) -> impl std::future::Future<Output = OrmResult<Self::Conn>> + Send;
}

impl<P: ConnectionPool> ConnectionRouter<P> {
    pub fn new(reader: P, writer: Option<P>) -> Self {
        Self {
            base_id: next_base_id(),
            reader,
            writer,
            use_writer_after_transaction: true,
            writer_sticky_duration: Duration::from_millis(5000),
        }
    }

    pub fn with_writer_stickiness(mut self, use_writer_after_transaction: bool, duration: Duration) -> Self {
        self.use_writer_after_transaction = use_writer_after_transaction;
        self.writer_sticky_duration = duration;
        self
    }

    fn mode(&self) -> Mode {
        with_scope_map(|m| m.get(&self.base_id).and_then(|s| s.mode).unwrap_or(Mode::Normal))
    }

    fn sticky_active(&self) -> bool {
        with_scope_map(|m| {
            m.get(&self.base_id)
                .and_then(|s| s.sticky_until)
                .map(|t| Instant::now() < t)
                .unwrap_or(false)
        })
    }

    fn transaction_conn(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        with_scope_map(|m| m.get(&self.base_id).and_then(|s| s.active_transaction_conn.clone()))
    }

    /// Acquire a connection for a read operation (`find`/`findOne`/`count`/
    /// relation loading). Routes to the writer when inside a transaction,
    /// inside `with_writer`, or within the post-transaction sticky window;
    /// otherwise routes to the reader.
    pub async fn read_connection(&self) -> OrmResult<RoutedConn<P::Conn>> {
        match self.mode() {
            Mode::Transaction | Mode::WriterReadOnly => {
                if let Some(conn) = self.transaction_conn() {
                    let conn = conn
                        .downcast::<P::Conn>()
                        .map_err(|_| OrmError::Other("transaction connection type mismatch".into()))?;
                    return Ok(RoutedConn::Shared(conn));
                }
                self.acquire_writer().await.map(RoutedConn::Owned)
            }
            Mode::Normal if self.sticky_active() => self.acquire_writer().await.map(RoutedConn::Owned),
            Mode::Normal => self.reader.acquire().await.map(RoutedConn::Owned),
        }
    }

    /// Assert the current scope permits a write (`create`/`update`/
    /// `delete`), per the §4.8 table, then return the connection to execute
    /// it on.
    pub async fn write_connection(&self) -> OrmResult<RoutedConn<P::Conn>> {
        match self.mode() {
            Mode::Transaction => {
                let conn = self
                    .transaction_conn()
                    .ok_or(OrmError::WriteOutsideTransaction)?
                    .downcast::<P::Conn>()
                    .map_err(|_| OrmError::Other("transaction connection type mismatch".into()))?;
                Ok(RoutedConn::Shared(conn))
            }
            Mode::WriterReadOnly => Err(OrmError::WriteInReadOnlyContext),
            Mode::Normal => Err(OrmError::WriteOutsideTransaction),
        }
    }

    async fn acquire_writer(&self) -> OrmResult<P::Conn> {
        match &self.writer {
            Some(w) => w.acquire().await,
            None => self.reader.acquire().await,
        }
    }

    /// Run `f` inside a transaction (§4.8). Nested calls on the same base
    /// within the same task share the outer connection and emit no nested
    /// `BEGIN`; only the outermost call commits.
    pub async fn transaction<F, Fut, T>(&self, opts: TransactionOptions, f: F) -> OrmResult<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = OrmResult<T>> + Send,
        T: Send,
    {
        if matches!(self.mode(), Mode::Transaction) {
            return f().await;
        }

        let conn = Arc::new(self.acquire_writer().await?);
        conn.execute("BEGIN", &[]).await?;

        with_scope_map(|m| {
            let entry = m.entry(self.base_id).or_default();
            entry.mode = Some(Mode::Transaction);
            entry.active_transaction_conn = Some(conn.clone() as Arc<dyn Any + Send + Sync>);
        });

        let mut attempt = 0u32;
        let result = loop {
            let outcome = f().await;
            match &outcome {
                Ok(_) => break outcome,
                Err(e) if opts.retry_on_error && attempt < opts.retry_limit && (opts.classifier)(e) => {
                    conn.execute("ROLLBACK", &[]).await.ok();
                    conn.execute("BEGIN", &[]).await?;
                    attempt += 1;
                    continue;
                }
                Err(_) => break outcome,
            }
        };

        match &result {
            Ok(_) => {
                if opts.rollback_only {
                    conn.execute("ROLLBACK", &[]).await?;
                } else {
                    conn.execute("COMMIT", &[]).await?;
                }
            }
            Err(_) => {
                conn.execute("ROLLBACK", &[]).await.ok();
            }
        }

        let use_sticky = opts
            .use_writer_after_transaction
            .unwrap_or(self.use_writer_after_transaction);
        with_scope_map(|m| {
            let entry = m.entry(self.base_id).or_default();
            entry.mode = None;
            entry.active_transaction_conn = None;
            if result.is_ok() && use_sticky {
                entry.sticky_until = Some(Instant::now() + self.writer_sticky_duration);
            }
        });

        result
    }

    /// Run `f` with every `execute` routed to the writer pool, in read-only
    /// mode: `create`/`update`/`delete` raise `WriteInReadOnlyContext`.
    pub async fn with_writer<F, Fut, T>(&self, f: F) -> OrmResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        with_scope_map(|m| m.entry(self.base_id).or_default().mode = Some(Mode::WriterReadOnly));
        let result = f().await;
        with_scope_map(|m| {
            if let Some(entry) = m.get_mut(&self.base_id) {
                entry.mode = None;
            }
        });
        Ok(result)
    }
}

/// Either a freshly acquired connection or a shared handle to the active
/// transaction connection for this scope.
pub enum RoutedConn<C> {
    Owned(C),
    Shared(Arc<C>),
}

impl<C: Connection> std::ops::Deref for RoutedConn<C> {
    type Target = C;

    fn deref(&self) -> &C {
        match self {
            RoutedConn::Owned(c) => c,
            RoutedConn::Shared(c) => c,
        }
    }
}

/// Install a fresh, empty scope map for the given future — used at a
/// top-level entry point (e.g. a request handler) so sibling tasks never
/// implicitly inherit one another's router/middleware state (§5).
pub async fn run_scoped<F: std::future::Future>(f: F) -> F::Output {
    SCOPE.scope(RefCell::new(HashMap::new()), f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;

    struct NoopConn;

    impl Connection for NoopConn {
        async fn query(&self, _sql: &str, _params: &[crate::param::DynValue]) -> OrmResult<Vec<Row>> {
            Ok(vec![])
        }
        async fn execute(&self, _sql: &str, _params: &[crate::param::DynValue]) -> OrmResult<crate::driver::ExecResult> {
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

    #[tokio::test]
    async fn write_outside_transaction_is_rejected() {
        run_scoped(async {
            let router = ConnectionRouter::new(NoopPool, Some(NoopPool));
            let result = router.write_connection().await;
            assert!(matches!(result, Err(OrmError::WriteOutsideTransaction)));
        })
        .await;
    }

    #[tokio::test]
    async fn write_inside_transaction_is_permitted() {
        run_scoped(async {
            let router = ConnectionRouter::new(NoopPool, Some(NoopPool));
            let ok = router
                .transaction(TransactionOptions::default(), || async {
                    router.write_connection().await?;
                    Ok::<_, OrmError>(())
                })
                .await;
            assert!(ok.is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn writer_readonly_rejects_writes() {
        run_scoped(async {
            let router = ConnectionRouter::new(NoopPool, Some(NoopPool));
            router
                .with_writer(|| async {
                    let result = router.write_connection().await;
                    assert!(matches!(result, Err(OrmError::WriteInReadOnlyContext)));
                })
                .await
                .unwrap();
        })
        .await;
    }

    #[tokio::test]
    async fn sibling_tasks_do_not_share_scope() {
        let router = Arc::new(ConnectionRouter::new(NoopPool, Some(NoopPool)));
        let r1 = router.clone();
        let h1 = tokio::spawn(run_scoped(async move {
            r1.transaction(TransactionOptions::default(), || async { Ok::<_, OrmError>(()) })
                .await
                .unwrap();
        }));
        let r2 = router.clone();
        let h2 = tokio::spawn(run_scoped(async move {
            // Sibling task never saw the other's transaction scope.
            assert!(matches!(r2.write_connection().await, Err(OrmError::WriteOutsideTransaction)));
        }));
        h1.await.unwrap();
        h2.await.unwrap();
    }
}
