//! Convenient imports for typical `rowcraft` usage.
//!
//! ```ignore
//! use rowcraft::prelude::*;
//! ```

// ── Core data model (§3/§4.1-§4.3) ──────────────────────────────────────────
pub use crate::condition::Condition;
pub use crate::descriptor::{Column, Direction, ModelDescriptor, Nulls, OrderSpec};
pub use crate::param::DynValue;
pub use crate::value::{Skip, Skippable, Value};

// ── Row mapping ──────────────────────────────────────────────────────────────
pub use crate::row::{FromRow, Row, RowExt};

// ── Dialects & SQL builders (§4.4) ───────────────────────────────────────────
pub use crate::dialect::{BuiltQuery, Dialect, DialectKind, OnConflict, PkeyResult, SqlBuilder};

// ── Driver contract (§6) ─────────────────────────────────────────────────────
pub use crate::driver::{Connection, Driver, ExecResult};

// ── Query engine (§4.6) ──────────────────────────────────────────────────────
pub use crate::engine::{FindOptions, Query, WriteOptions};

// ── Relation loading (§4.7) ──────────────────────────────────────────────────
pub use crate::relation::{relation_key, BatchContext, HardLimitOverride, RelationKind, RelationSpec};

// ── Connection routing & transactions (§4.8) ────────────────────────────────
pub use crate::router::{ConnectionPool, ConnectionRouter, RoutedConn, TransactionOptions};

// ── Middleware (§4.9) ────────────────────────────────────────────────────────
pub use crate::middleware::{Middleware, MiddlewareInstance, MethodOp, MethodOutcome};

// ── Database base assembler (§4.11) ─────────────────────────────────────────
pub use crate::db::{BaseConfig, BoundQuery, DbBase};

// ── Validation (ambient developer ergonomics) ───────────────────────────────
pub use crate::changeset::{ValidationError, ValidationErrors};

// ── Errors ────────────────────────────────────────────────────────────────
pub use crate::error::{OrmError, OrmResult};

// ── Derive macros (feature: derive) ─────────────────────────────────────────
#[cfg(feature = "derive")]
pub use crate::{FromRow, Model, PgComposite, PgEnum, ViewModel};
